//! `mail_inbox` — the campus webmail landing page.

use serde_json::{json, Value};

use crate::text::html_to_text;
use crate::{Tool, ToolContext, ToolSpec};

const MAIL_BASE: &str = "https://mail.sjtu.edu.cn";

/// Cap on extracted text so a heavy inbox page cannot blow up the
/// response envelope.
const MAX_TEXT_CHARS: usize = 20_000;

pub struct MailInboxTool;

#[async_trait::async_trait]
impl Tool for MailInboxTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "mail_inbox".into(),
            description: "Overview of the campus webmail landing page.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
            requires_auth: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, _args: Value) -> anyhow::Result<Value> {
        let resp = ctx
            .client()
            .get(MAIL_BASE)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("fetching mail page: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("mail system returned HTTP {}", status.as_u16());
        }

        let html = resp.text().await?;
        Ok(Value::String(html_to_text(&html, MAX_TEXT_CHARS)))
    }
}
