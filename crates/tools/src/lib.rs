//! Campus-service tools — the operations exposed through `tools/call`.
//!
//! Each tool is an independent fetch-and-format routine.  The registry is
//! built once at startup from an explicit manifest; the dispatcher is the
//! sole consumer and performs the auth gate itself, so tools never
//! re-check login state.

pub mod account;
pub mod activity;
pub mod jw;
pub mod jwc;
pub mod mail;
pub mod news;
pub mod text;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cg_auth::SessionManager;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Context passed to every tool invocation: the protocol session that
/// asked for it (if any) plus the shared authenticated session.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: Option<String>,
    auth: Arc<SessionManager>,
}

impl ToolContext {
    pub fn new(auth: Arc<SessionManager>, session_id: Option<String>) -> Self {
        Self { session_id, auth }
    }

    /// Liveness of the underlying jAccount session.
    pub async fn is_logged_in(&self) -> bool {
        self.auth.is_logged_in().await
    }

    /// The shared authenticated HTTP client (cookie jar included).
    pub fn client(&self) -> &reqwest::Client {
        self.auth.client()
    }
}

/// Metadata describing a registered tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// When set, the dispatcher refuses the call unless the jAccount
    /// session is live.
    pub requires_auth: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn call(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable registry of tools, keyed by name, built once at startup.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.  Returns self for chaining.
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        let name = tool.spec().name.clone();
        self.tools.insert(name, tool);
        self
    }

    /// All registered specs, sorted by name.
    pub fn list(&self) -> Vec<ToolSpec> {
        let mut v: Vec<_> = self.tools.values().map(|t| t.spec()).collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Build the registry with every built-in campus tool.
pub fn build_default_registry() -> ToolRegistry {
    ToolRegistry::new()
        .register(Arc::new(news::CampusNewsTool))
        .register(Arc::new(jwc::JwcNoticesTool))
        .register(Arc::new(account::AccountInfoTool))
        .register(Arc::new(activity::CampusActivityTool))
        .register(Arc::new(mail::MailInboxTool))
        .register(Arc::new(jw::JwRequestTool))
}
