use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth (jAccount session manager)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Directory holding persisted auth state: the cookie file
    /// (`jaccount-cookies.json`) and the challenge-image cache (`cache/`).
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// Domain suffix the cookie jar is scoped to.  Cookies are only sent
    /// to hosts under this suffix.
    #[serde(default = "d_cookie_domain")]
    pub cookie_domain: String,
    /// Bounded timeout applied to every outbound HTTP call.
    #[serde(default = "d_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            cookie_domain: d_cookie_domain(),
            request_timeout_secs: d_request_timeout(),
        }
    }
}

impl AuthConfig {
    /// Path of the persisted cookie file.
    pub fn cookie_file(&self) -> PathBuf {
        self.state_path.join("jaccount-cookies.json")
    }

    /// Directory for transient challenge images (not required to survive
    /// restarts).
    pub fn cache_dir(&self) -> PathBuf {
        self.state_path.join("cache")
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".campusgate")
}
fn d_cookie_domain() -> String {
    "sjtu.edu.cn".into()
}
fn d_request_timeout() -> u64 {
    15
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
