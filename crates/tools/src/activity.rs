//! `campus_activity` — the "second classroom" activity feed.
//!
//! The activity site authenticates through a jAccount OIDC hop: the
//! authorize endpoint redirects back to the site with a one-time code,
//! which the site's own API exchanges for a bearer token.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{Tool, ToolContext, ToolSpec};

const AUTHORIZE_URL: &str = "https://jaccount.sjtu.edu.cn/oauth2/authorize";
const TOKEN_URL: &str = "https://activity.sjtu.edu.cn/api/v1/login/token";
const LIST_URL: &str = "https://activity.sjtu.edu.cn/api/v1/activity/list/home";
const DETAIL_BASE: &str = "https://activity.sjtu.edu.cn/activity/detail/";
const SITE_BASE: &str = "https://activity.sjtu.edu.cn";

const OIDC_CLIENT_ID: &str = "NMCTdJI6Tluw2SSTe6tW";
const OIDC_REDIRECT_URI: &str = "https://activity.sjtu.edu.cn/auth";

/// "Second classroom" activities live under this type id.
const ACTIVITY_TYPE_ID: i64 = 2;
const PAGE_SIZE: i64 = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OIDC token exchange
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    data: String,
}

/// Ride the authenticated jAccount session through the authorize redirect
/// and exchange the resulting code for the activity site's bearer token.
pub async fn fetch_bearer_token(ctx: &ToolContext) -> anyhow::Result<String> {
    let resp = ctx
        .client()
        .get(AUTHORIZE_URL)
        .query(&[
            ("client_id", OIDC_CLIENT_ID),
            ("redirect_uri", OIDC_REDIRECT_URI),
            ("response_type", "code"),
            ("scope", "profile"),
        ])
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("OIDC authorize request failed: {e}"))?;

    let code = resp
        .url()
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow::anyhow!("authorize redirect carried no code (session expired?)"))?;

    let token: TokenEnvelope = ctx
        .client()
        .get(TOKEN_URL)
        .query(&[("code", code.as_str())])
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("token exchange failed: {e}"))?
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("decoding token response: {e}"))?;

    Ok(token.data)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Activity list
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub img: String,
    #[serde(default)]
    pub sponsor: String,
    #[serde(default)]
    pub person_num: Option<i64>,
    #[serde(default)]
    pub signed_up_num: Option<i64>,
    #[serde(default)]
    pub method: i64,
    #[serde(default)]
    pub registration_time: Vec<Option<String>>,
    #[serde(default)]
    pub activity_time: Vec<Option<String>>,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    data: Vec<Activity>,
}

async fn fetch_activities(ctx: &ToolContext, token: &str, page: i64) -> anyhow::Result<Vec<Activity>> {
    let envelope: ListEnvelope = ctx
        .client()
        .get(LIST_URL)
        .query(&[
            ("page", page.to_string()),
            ("per_page", PAGE_SIZE.to_string()),
            ("activity_type_id", ACTIVITY_TYPE_ID.to_string()),
            ("time_sort", "desc".to_string()),
            ("can_apply", "false".to_string()),
        ])
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("fetching activity list: {e}"))?
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("decoding activity list: {e}"))?;

    let mut activities = envelope.data;
    activities.sort_by(|a, b| {
        let start = |act: &Activity| act.activity_time.first().cloned().flatten();
        start(b).cmp(&start(a))
    });
    Ok(activities)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The site's detail URLs encode the activity id base64'd after padding
/// with spaces to a multiple of three bytes (no `=` padding on the wire).
pub fn detail_url_param(id: i64) -> String {
    let mut raw = id.to_string();
    while raw.len() % 3 != 0 {
        raw.push(' ');
    }
    base64(raw.as_bytes())
}

fn base64(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 64] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        out.push(ALPHABET[(n >> 18) as usize & 0x3f] as char);
        out.push(ALPHABET[(n >> 12) as usize & 0x3f] as char);
        if chunk.len() > 1 {
            out.push(ALPHABET[(n >> 6) as usize & 0x3f] as char);
        } else {
            out.push('=');
        }
        if chunk.len() > 2 {
            out.push(ALPHABET[n as usize & 0x3f] as char);
        } else {
            out.push('=');
        }
    }
    out
}

pub fn sign_up_method_desc(method: i64) -> String {
    match method {
        1 => "online (vetted admission)".into(),
        2 => "offline".into(),
        3 => "online (first come, first served)".into(),
        4 => "no registration required".into(),
        5 => "online (random draw)".into(),
        6 => "external registration".into(),
        other => format!("unknown ({other})"),
    }
}

fn time_span(times: &[Option<String>]) -> Option<String> {
    let start = times.first()?.as_deref()?;
    let end = times.get(1).and_then(|t| t.as_deref()).unwrap_or("");
    Some(if end.is_empty() {
        start.to_owned()
    } else {
        format!("{start} ~ {end}")
    })
}

pub fn render_activity(activity: &Activity) -> String {
    let mut lines = vec![
        format!(
            "- [{}]({}{})",
            activity.name,
            DETAIL_BASE,
            detail_url_param(activity.id)
        ),
        format!("  ![]({SITE_BASE}{})", activity.img),
        format!("  id: {}", activity.id),
        format!("  sponsor: {}", activity.sponsor),
    ];
    if let Some(capacity) = activity.person_num.filter(|n| *n > 0) {
        lines.push(format!(
            "  sign-ups: {} / {}",
            activity.signed_up_num.unwrap_or(0),
            capacity
        ));
    }
    lines.push(format!(
        "  sign-up method: {}",
        sign_up_method_desc(activity.method)
    ));
    if let Some(span) = time_span(&activity.registration_time) {
        lines.push(format!("  registration: {span}"));
    }
    lines.push(format!("  location: {}", activity.address));
    if let Some(span) = time_span(&activity.activity_time) {
        lines.push(format!("  time: {span}"));
    }
    lines.join("\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CampusActivityTool;

#[async_trait::async_trait]
impl Tool for CampusActivityTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "campus_activity".into(),
            description: "Latest 'second classroom' campus activities; \
                          `page` selects the result page (default 1)."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "page": { "type": "integer", "default": 1, "minimum": 1 }
                }
            }),
            requires_auth: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
        let page = args.get("page").and_then(Value::as_i64).unwrap_or(1).max(1);

        let token = fetch_bearer_token(ctx).await?;
        let activities = fetch_activities(ctx, &token, page).await?;
        tracing::debug!(page, activities = activities.len(), "activity list fetched");

        let rendered: Vec<String> = activities.iter().map(render_activity).collect();
        Ok(json!(rendered))
    }
}
