//! `jwc_notices` — student-facing announcements from the academic affairs
//! office.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::text::strip_tags;
use crate::{Tool, ToolContext, ToolSpec};

const JWC_URL: &str = "https://jwc.sjtu.edu.cn/xwtg/tztg.htm";
const JWC_BASE: &str = "https://jwc.sjtu.edu.cn";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub date: String,
    pub title: String,
    pub link: String,
    pub summary: String,
}

/// Pull the notice list out of the announcements page.
///
/// Items that do not match the expected layout are skipped, not fatal —
/// the page mixes pinned and regular entries with slightly different
/// markup.
pub fn parse_notices(html: &str) -> Vec<Notice> {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    static DAY: OnceLock<Regex> = OnceLock::new();
    static YEAR_MONTH: OnceLock<Regex> = OnceLock::new();
    static TITLE: OnceLock<Regex> = OnceLock::new();
    static LINK: OnceLock<Regex> = OnceLock::new();
    static SUMMARY: OnceLock<Regex> = OnceLock::new();

    let item_re = ITEM.get_or_init(|| {
        Regex::new(r#"(?s)<li[^>]*class="clearfix"[^>]*>(.*?)</li>"#).expect("static pattern")
    });
    let day_re = DAY.get_or_init(|| {
        Regex::new(r#"(?s)<div[^>]*class="sj"[^>]*>.*?<h2[^>]*>(.*?)</h2>"#).expect("static pattern")
    });
    let ym_re = YEAR_MONTH.get_or_init(|| {
        Regex::new(r#"(?s)<div[^>]*class="sj"[^>]*>.*?<p[^>]*>(.*?)</p>"#).expect("static pattern")
    });
    let title_re = TITLE.get_or_init(|| {
        Regex::new(r#"(?s)<div[^>]*class="wz"[^>]*>.*?<h2[^>]*>(.*?)</h2>"#).expect("static pattern")
    });
    let link_re = LINK.get_or_init(|| {
        Regex::new(r#"(?s)<div[^>]*class="wz"[^>]*>.*?<a[^>]*href="([^"]*)""#).expect("static pattern")
    });
    let summary_re = SUMMARY.get_or_init(|| {
        Regex::new(r#"(?s)<div[^>]*class="wz"[^>]*>.*?<p[^>]*>(.*?)</p>"#).expect("static pattern")
    });

    item_re
        .captures_iter(html)
        .filter_map(|item| {
            let body = item.get(1)?.as_str();

            let day = strip_tags(day_re.captures(body)?.get(1)?.as_str());
            let year_month = strip_tags(ym_re.captures(body)?.get(1)?.as_str());
            let (year, month) = year_month.split_once('.')?;
            let date = format!(
                "{}-{:02}-{:02}",
                year.trim(),
                month.trim().parse::<u32>().ok()?,
                day.trim().parse::<u32>().ok()?
            );

            let title = strip_tags(title_re.captures(body)?.get(1)?.as_str());
            let raw_link = link_re.captures(body)?.get(1)?.as_str();
            // Relative links come back as "../info/...".
            let link = match raw_link.strip_prefix("..") {
                Some(rest) => format!("{JWC_BASE}{rest}"),
                None => raw_link.to_owned(),
            };
            let summary = strip_tags(summary_re.captures(body)?.get(1)?.as_str());

            Some(Notice {
                date,
                title,
                link,
                summary,
            })
        })
        .collect()
}

pub fn render_notices(notices: &[Notice]) -> String {
    notices
        .iter()
        .map(|n| format!("- [{}]({})\n{}\n{}", n.title, n.link, n.summary, n.date))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct JwcNoticesTool;

#[async_trait::async_trait]
impl Tool for JwcNoticesTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "jwc_notices".into(),
            description: "Student-facing notices from the academic affairs office.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
            requires_auth: false,
        }
    }

    async fn call(&self, ctx: &ToolContext, _args: Value) -> anyhow::Result<Value> {
        let resp = ctx
            .client()
            .get(JWC_URL)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("fetching notices page: {e}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("notices page returned HTTP {}", resp.status().as_u16());
        }
        let html = resp.text().await?;

        let notices = parse_notices(&html);
        tracing::debug!(notices = notices.len(), "notices page parsed");
        if notices.is_empty() {
            anyhow::bail!("no notices found (page layout may have changed)");
        }
        Ok(Value::String(render_notices(&notices)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<ul>
  <li class="clearfix">
    <div class="sj"><h2>15</h2><p>2024.06</p></div>
    <div class="wz">
      <h2><a href="../info/2001.htm">Final exam schedule released</a></h2>
      <p>The schedule for spring finals is now available.</p>
      <a href="../info/2001.htm">more</a>
    </div>
  </li>
  <li class="clearfix">
    <div class="sj"><h2>3</h2><p>2024.06</p></div>
    <div class="wz">
      <h2><a href="https://jwc.sjtu.edu.cn/info/2002.htm">Course withdrawal window</a></h2>
      <p>Withdrawal opens next Monday.</p>
    </div>
  </li>
  <li class="clearfix">
    <div class="sj"><h2>bad</h2><p>2024.06</p></div>
    <div class="wz"><h2>Broken item</h2></div>
  </li>
</ul>
"#;

    #[test]
    fn parses_notices_and_fixes_relative_links() {
        let notices = parse_notices(PAGE);
        assert_eq!(notices.len(), 2, "malformed items are skipped");
        assert_eq!(notices[0].date, "2024-06-15");
        assert_eq!(notices[0].title, "Final exam schedule released");
        assert_eq!(notices[0].link, "https://jwc.sjtu.edu.cn/info/2001.htm");
        assert_eq!(notices[1].date, "2024-06-03");
        assert_eq!(notices[1].link, "https://jwc.sjtu.edu.cn/info/2002.htm");
    }

    #[test]
    fn render_includes_date_and_summary() {
        let md = render_notices(&parse_notices(PAGE));
        assert!(md.contains("- [Final exam schedule released](https://jwc.sjtu.edu.cn/info/2001.htm)"));
        assert!(md.contains("The schedule for spring finals is now available."));
        assert!(md.contains("2024-06-15"));
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(parse_notices("<html></html>").is_empty());
    }
}
