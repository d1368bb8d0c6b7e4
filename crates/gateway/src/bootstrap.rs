//! AppState construction and background-task spawning extracted from
//! `main.rs` so CLI one-shot commands can boot the runtime without an
//! HTTP listener.

use std::sync::Arc;

use anyhow::Context;

use cg_auth::{ExpiryCallback, SessionManager};
use cg_domain::config::{Config, ConfigSeverity};
use cg_mcp::{Dispatcher, SessionRegistry};

use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Session manager ──────────────────────────────────────────────
    let auth = Arc::new(
        SessionManager::new(&config.auth).context("initializing session manager")?,
    );
    tracing::info!(
        state_path = %config.auth.state_path.display(),
        has_credentials = auth.has_credentials(),
        "session manager ready"
    );

    // ── Tool registry (startup-time manifest) ────────────────────────
    let tools = Arc::new(cg_tools::build_default_registry());
    tracing::info!(tools = tools.len(), "tool registry ready");

    // ── Protocol sessions + dispatcher ───────────────────────────────
    let sessions = Arc::new(SessionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(
        "CampusGate",
        env!("CARGO_PKG_VERSION"),
        sessions.clone(),
        tools.clone(),
        auth.clone(),
    ));
    tracing::info!("dispatcher ready");

    Ok(AppState {
        config,
        auth,
        tools,
        sessions,
        dispatcher,
    })
}

/// Start the background session monitor.
///
/// The server holds no password, so the expiry callback cannot re-enter
/// the login state machine on its own — it surfaces the condition for an
/// operator to resolve out-of-band.
pub fn spawn_session_monitor(state: &AppState) {
    let callback: ExpiryCallback = Arc::new(|| {
        Box::pin(async {
            tracing::warn!(
                "jAccount session expired; run `campusgate login` to re-authenticate"
            );
            Ok(())
        })
    });
    state.auth.start_monitor(callback);
}
