pub mod mcp;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Build the API router.  Both the bare and trailing-slash forms of the
/// endpoint are served — clients disagree on which one to call.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mcp", get(mcp::mcp_get).post(mcp::mcp_post))
        .route("/mcp/", get(mcp::mcp_get).post(mcp::mcp_post))
}
