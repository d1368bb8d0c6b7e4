//! `campus_news` — headlines from the university news portal.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::text::{resolve_link, strip_tags};
use crate::{Tool, ToolContext, ToolSpec};

const NEWS_URL: &str = "https://news.sjtu.edu.cn/jdyw/index.html";

#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub link: Option<String>,
    pub summary: String,
    pub time: String,
    pub source: String,
}

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<li[^>]*class="item"[^>]*>(.*?)</li>"#).expect("static pattern")
    })
}

fn capture(pattern: &'static str, cell: &OnceLock<Regex>, hay: &str) -> Option<String> {
    let re = cell.get_or_init(|| Regex::new(pattern).expect("static pattern"));
    re.captures(hay)
        .and_then(|c| c.get(1))
        .map(|m| strip_tags(m.as_str()))
        .filter(|s| !s.is_empty())
}

/// Pull the headline cards out of the news index page.
pub fn parse_news(html: &str, page_url: &str) -> Vec<NewsItem> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    static TITLE: OnceLock<Regex> = OnceLock::new();
    static SUMMARY: OnceLock<Regex> = OnceLock::new();
    static TIME: OnceLock<Regex> = OnceLock::new();
    static SOURCE: OnceLock<Regex> = OnceLock::new();

    let card_section = match html.find("list-card-h") {
        Some(pos) => &html[pos..],
        None => return Vec::new(),
    };

    item_re()
        .captures_iter(card_section)
        .filter_map(|item| {
            let body = item.get(1)?.as_str();

            let href = HREF
                .get_or_init(|| {
                    Regex::new(r#"<a[^>]*class="card"[^>]*href="([^"]*)""#).expect("static pattern")
                })
                .captures(body)
                .and_then(|c| c.get(1))
                .and_then(|m| resolve_link(page_url, m.as_str()));

            let title = capture(r#"(?s)<p[^>]*class="dot"[^>]*>(.*?)</p>"#, &TITLE, body)?;
            let summary =
                capture(r#"(?s)<div[^>]*class="des dot"[^>]*>(.*?)</div>"#, &SUMMARY, body)
                    .unwrap_or_default();
            let time = capture(r#"(?s)<div[^>]*class="time"[^>]*>.*?<span>(.*?)</span>"#, &TIME, body)
                .unwrap_or_default();
            let source = capture(
                r#"(?s)<div[^>]*class="source"[^>]*>.*?<p[^>]*>(.*?)</p>"#,
                &SOURCE,
                body,
            )
            .unwrap_or_default();

            Some(NewsItem {
                title,
                link: href,
                summary,
                time,
                source,
            })
        })
        .collect()
}

/// Render the headlines as a markdown list.
pub fn render_news(items: &[NewsItem]) -> String {
    items
        .iter()
        .map(|item| {
            let head = match &item.link {
                Some(link) => format!("- [{}]({})", item.title, link),
                None => format!("- {}", item.title),
            };
            format!("{head}\n{}\n{} — {}", item.summary, item.time, item.source)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct CampusNewsTool;

#[async_trait::async_trait]
impl Tool for CampusNewsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "campus_news".into(),
            description: "Latest headlines from the SJTU news portal.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
            requires_auth: false,
        }
    }

    async fn call(&self, ctx: &ToolContext, _args: Value) -> anyhow::Result<Value> {
        let resp = ctx
            .client()
            .get(NEWS_URL)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("fetching news page: {e}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("news page returned HTTP {}", resp.status().as_u16());
        }
        let html = resp.text().await?;

        let items = parse_news(&html, NEWS_URL);
        tracing::debug!(items = items.len(), "news page parsed");
        if items.is_empty() {
            anyhow::bail!("no news items found (page layout may have changed)");
        }
        Ok(Value::String(render_news(&items)))
    }
}
