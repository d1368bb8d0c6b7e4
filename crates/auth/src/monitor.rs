//! Background session monitor.
//!
//! Two-tier timing: the loop wakes on a short interval so shutdown stays
//! prompt, but only runs the remote liveness check once the longer check
//! interval has elapsed.  On a detected logout the registered callback is
//! invoked (and any failure swallowed); on a live session one lightweight
//! authenticated request keeps the remote session warm.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::login::ACCOUNT_URL;
use crate::manager::SessionManager;

/// How often the loop wakes to look at the clock.
pub const WAKE_INTERVAL: Duration = Duration::from_secs(10);
/// Minimum gap between two actual liveness checks.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(300);
/// Bound on waiting for the loop to exit after a stop request.
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Invoked when the monitor detects an expired session.  Typically
/// re-enters the login state machine; failures are logged and swallowed.
pub type ExpiryCallback = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub(crate) struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SessionManager {
    /// Start the background monitor.  Returns `false` (and does nothing)
    /// when a monitor is already running — there is never more than one.
    pub fn start_monitor(self: &Arc<Self>, on_expired: ExpiryCallback) -> bool {
        self.spawn_monitor(on_expired, WAKE_INTERVAL, CHECK_INTERVAL)
    }

    pub(crate) fn spawn_monitor(
        self: &Arc<Self>,
        on_expired: ExpiryCallback,
        wake_interval: Duration,
        check_interval: Duration,
    ) -> bool {
        let mut slot = self.monitor.lock();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                tracing::debug!("session monitor already running");
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mgr = Arc::clone(self);
        let handle = tokio::spawn(async move {
            monitor_loop(mgr, on_expired, token, wake_interval, check_interval).await;
        });
        *slot = Some(MonitorTask { cancel, handle });
        tracing::info!("session monitor started");
        true
    }

    /// True while a monitor task is alive.
    pub fn monitor_running(&self) -> bool {
        self.monitor
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Signal the monitor to stop and wait for it, bounded by
    /// [`STOP_JOIN_TIMEOUT`].  The task is never aborted.
    pub async fn stop_monitor(&self) {
        let task = self.monitor.lock().take();
        let Some(task) = task else { return };

        task.cancel.cancel();
        match tokio::time::timeout(STOP_JOIN_TIMEOUT, task.handle).await {
            Ok(_) => tracing::info!("session monitor stopped"),
            Err(_) => tracing::warn!(
                timeout_secs = STOP_JOIN_TIMEOUT.as_secs(),
                "session monitor did not stop in time"
            ),
        }
    }
}

async fn monitor_loop(
    mgr: Arc<SessionManager>,
    on_expired: ExpiryCallback,
    cancel: CancellationToken,
    wake_interval: Duration,
    check_interval: Duration,
) {
    let mut wake = tokio::time::interval(wake_interval);
    // The first tick fires immediately; skip it so the initial check lands
    // one wake interval after startup.
    wake.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = wake.tick() => {}
        }

        let due = {
            let mut last = mgr.last_check.lock();
            match *last {
                Some(t) if t.elapsed() < check_interval => false,
                _ => {
                    *last = Some(Instant::now());
                    true
                }
            }
        };
        if !due {
            continue;
        }

        if mgr.is_logged_in().await {
            // Keep-alive: one lightweight authenticated request.
            if let Err(e) = mgr.client().get(ACCOUNT_URL).send().await {
                tracing::warn!(error = %e, "keep-alive refresh failed");
            } else {
                tracing::debug!("session refreshed");
            }
        } else {
            tracing::warn!("session expired");
            if let Err(e) = on_expired().await {
                tracing::warn!(error = %e, "expiry callback failed");
            }
        }
    }

    tracing::debug!("session monitor loop exited");
}
