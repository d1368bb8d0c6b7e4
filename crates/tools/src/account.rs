//! `account_info` — the caller's jAccount profile from the campus portal
//! API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{Tool, ToolContext, ToolSpec};

const ACCOUNT_API: &str = "https://my.sjtu.edu.cn/api/account";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Envelope every portal API response is wrapped in.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountEnvelope {
    pub errno: i64,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub entities: Vec<AccountProfile>,
}

/// The profile subset consumed by rendering and by other tools.  Unknown
/// fields in the upstream payload are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub class_no: Option<String>,
    #[serde(default)]
    pub birthday: Option<Birthday>,
    #[serde(default)]
    pub organize: Option<Organize>,
    #[serde(default)]
    pub top_organize: Option<Organize>,
    #[serde(default)]
    pub identities: Vec<Identity>,
    #[serde(default)]
    pub account_expire_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Birthday {
    #[serde(default)]
    pub birth_year: String,
    #[serde(default)]
    pub birth_month: String,
    #[serde(default)]
    pub birth_day: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organize {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub user_type: String,
    #[serde(default)]
    pub user_type_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub organize: Option<Organize>,
    #[serde(default)]
    pub top_organize: Option<Organize>,
    #[serde(default)]
    pub major: Option<Organize>,
    #[serde(default)]
    pub expire_date: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fetch and decode the caller's account profile.  Shared with
/// `campus_activity`, which needs the default identity for rendering.
pub async fn fetch_profile(ctx: &ToolContext) -> anyhow::Result<AccountProfile> {
    let resp = ctx
        .client()
        .get(ACCOUNT_API)
        .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("fetching account profile: {e}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("account API returned HTTP {}", resp.status().as_u16());
    }

    let envelope: AccountEnvelope = resp
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("decoding account response: {e}"))?;

    if envelope.errno != 0 {
        anyhow::bail!("account API error {}: {}", envelope.errno, envelope.error);
    }
    envelope
        .entities
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("account API returned no profile"))
}

pub struct AccountInfoTool;

#[async_trait::async_trait]
impl Tool for AccountInfoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "account_info".into(),
            description: "The caller's jAccount profile: identity, organization, contact details."
                .into(),
            input_schema: json!({ "type": "object", "properties": {} }),
            requires_auth: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, _args: Value) -> anyhow::Result<Value> {
        let profile = fetch_profile(ctx).await?;
        Ok(serde_json::to_value(profile)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "errno": 0,
        "error": "success",
        "total": 1,
        "entities": [{
            "id": "u-1",
            "account": "student001",
            "name": "Wei Chen",
            "kind": "canvas.profile",
            "userType": "student",
            "gender": "male",
            "email": "student001@sjtu.edu.cn",
            "mobile": "13800000000",
            "classNo": "F240301",
            "birthday": { "birthYear": "2005", "birthMonth": "4", "birthDay": "12" },
            "organize": { "id": "03000", "name": "School of Electronics" },
            "topOrganize": { "id": "03000", "name": "School of Electronics" },
            "identities": [{
                "kind": "student",
                "isDefault": true,
                "code": "524030910001",
                "userType": "bks",
                "userTypeName": "undergraduate",
                "status": "active",
                "organize": { "id": "03000", "name": "School of Electronics" },
                "major": { "id": "0812", "name": "Computer Science" },
                "expireDate": "2028-06-30",
                "unknownField": 42
            }],
            "accountExpireDate": null,
            "avatars": { "default": "/avatar.png" }
        }]
    }"#;

    #[test]
    fn decodes_profile_subset_and_ignores_unknown_fields() {
        let envelope: AccountEnvelope = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(envelope.errno, 0);
        let profile = &envelope.entities[0];
        assert_eq!(profile.account, "student001");
        assert_eq!(profile.name, "Wei Chen");
        assert_eq!(profile.class_no.as_deref(), Some("F240301"));
        assert_eq!(
            profile.organize.as_ref().map(|o| o.name.as_str()),
            Some("School of Electronics")
        );
        let identity = &profile.identities[0];
        assert!(identity.is_default);
        assert_eq!(identity.user_type_name, "undergraduate");
        assert_eq!(identity.major.as_ref().map(|m| m.name.as_str()), Some("Computer Science"));
    }

    #[test]
    fn error_envelope_decodes_without_entities() {
        let envelope: AccountEnvelope =
            serde_json::from_str(r#"{"errno": 503, "error": "not logged in"}"#).unwrap();
        assert_eq!(envelope.errno, 503);
        assert!(envelope.entities.is_empty());
    }
}
