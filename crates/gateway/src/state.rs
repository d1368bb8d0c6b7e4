use std::sync::Arc;

use cg_auth::SessionManager;
use cg_domain::config::Config;
use cg_mcp::{Dispatcher, SessionRegistry};
use cg_tools::ToolRegistry;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The single authenticated jAccount session, shared with every tool
    /// context and mutated by the background monitor.
    pub auth: Arc<SessionManager>,
    /// Startup-time tool manifest (immutable).
    pub tools: Arc<ToolRegistry>,
    /// Protocol sessions created by `initialize`.
    pub sessions: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
}
