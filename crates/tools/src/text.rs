//! Shared text helpers for tools that scrape campus HTML pages.

/// Strip tags from an HTML fragment and collapse whitespace.
///
/// Good enough for pulling titles and summaries out of known markup; not
/// a general HTML renderer.
pub fn strip_tags(fragment: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ => out.push(ch),
        }
    }
    decode_entities(&out)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode the handful of HTML entities that show up in portal markup.
pub fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// HTML-to-text extraction: strips tags, skips script/style content,
/// turns block-level closers into newlines, caps output length.
pub fn html_to_text(html: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_buf = String::new();

    for ch in html.chars() {
        if out.chars().count() >= max_chars {
            break;
        }

        match ch {
            '<' => {
                in_tag = true;
                tag_buf.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let tag_lower = tag_buf.to_lowercase();

                if tag_lower.starts_with("script") {
                    in_script = true;
                } else if tag_lower.starts_with("/script") {
                    in_script = false;
                } else if tag_lower.starts_with("style") {
                    in_style = true;
                } else if tag_lower.starts_with("/style") {
                    in_style = false;
                }

                if tag_lower.starts_with('/')
                    && matches!(
                        tag_lower.trim_start_matches('/'),
                        "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                            | "li" | "tr" | "br" | "article" | "section"
                            | "header" | "footer" | "blockquote"
                    )
                {
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                } else if tag_lower == "br" || tag_lower == "br/" {
                    out.push('\n');
                }

                tag_buf.clear();
            }
            _ if in_tag => {
                tag_buf.push(ch);
            }
            _ if in_script || in_style => {}
            _ => {
                out.push(ch);
            }
        }
    }

    let out = decode_entities(&out);

    // Collapse runs of whitespace but keep line structure.
    let mut result = String::new();
    let mut prev_newline = false;
    for line in out.lines() {
        let trimmed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            if !prev_newline {
                result.push('\n');
                prev_newline = true;
            }
        } else {
            result.push_str(&trimmed);
            result.push('\n');
            prev_newline = false;
        }
    }

    result.trim().to_string()
}

/// Resolve a possibly relative link against the page it was found on.
pub fn resolve_link(page_url: &str, href: &str) -> Option<String> {
    let base = reqwest::Url::parse(page_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_flattens_markup() {
        assert_eq!(strip_tags("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn strip_tags_decodes_entities() {
        assert_eq!(strip_tags("<span>A &amp; B</span>"), "A & B");
    }

    #[test]
    fn html_to_text_skips_script_blocks() {
        let html = "<h1>Title</h1><script>var x = 1;</script><p>Body</p>";
        let text = html_to_text(html, 10_000);
        assert!(text.contains("Title"));
        assert!(text.contains("Body"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn html_to_text_caps_output() {
        let html = "<p>aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa</p>";
        assert!(html_to_text(html, 10).chars().count() <= 12);
    }

    #[test]
    fn resolve_link_handles_relative_and_absolute() {
        assert_eq!(
            resolve_link("https://news.sjtu.edu.cn/jdyw/index.html", "../info/1.html").as_deref(),
            Some("https://news.sjtu.edu.cn/info/1.html")
        );
        assert_eq!(
            resolve_link("https://news.sjtu.edu.cn/", "https://other.example/x").as_deref(),
            Some("https://other.example/x")
        );
    }
}
