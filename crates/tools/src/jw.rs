//! `jw_request` — generic GET against the academic affairs system.
//!
//! The JW system exposes many small JSON endpoints behind the same
//! authenticated session; rather than one tool per endpoint, a single
//! path-parameterized tool covers them.

use serde_json::{json, Value};

use crate::{Tool, ToolContext, ToolSpec};

const JW_BASE: &str = "https://jw.sjtu.edu.cn";

/// Join the base with a caller-supplied relative path.
pub fn jw_url(path: &str) -> String {
    format!("{}/{}", JW_BASE.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub struct JwRequestTool;

#[async_trait::async_trait]
impl Tool for JwRequestTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "jw_request".into(),
            description: "GET a path on the academic affairs system (e.g. \
                          '/api/student/lesson') and return the JSON or text body."
                .into(),
            input_schema: json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative path on the JW system"
                    }
                }
            }),
            requires_auth: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing args.path"))?;

        let url = jw_url(path);
        let resp = ctx
            .client()
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("fetching {url}: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("JW system returned HTTP {} for {url}", status.as_u16());
        }

        let body = resp.text().await?;
        // JSON endpoints dominate, but a few return HTML fragments.
        match serde_json::from_str::<Value>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) => Ok(Value::String(body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_normalizes_slashes() {
        assert_eq!(jw_url("/api/student/lesson"), "https://jw.sjtu.edu.cn/api/student/lesson");
        assert_eq!(jw_url("api/student/lesson"), "https://jw.sjtu.edu.cn/api/student/lesson");
    }
}
