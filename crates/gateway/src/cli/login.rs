//! `campusgate login` / `logout` / `status` — the out-of-band interactive
//! channel for the session manager.
//!
//! The login state machine blocks on the challenge solution, so it runs
//! here, never on the HTTP request path.  The server picks up the
//! persisted cookies on its next liveness check.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use cg_auth::{ChallengeSolver, SessionManager};
use cg_domain::config::Config;

/// Prompts on the terminal: points the user at the saved challenge image
/// and reads the solution from stdin.
struct StdinChallengeSolver;

impl ChallengeSolver for StdinChallengeSolver {
    fn solve(&self, _image: &[u8], cached_at: &Path) -> anyhow::Result<String> {
        eprintln!();
        eprintln!("A challenge image was saved to:");
        eprintln!("  {}", cached_at.display());
        eprint!("Enter the characters shown: ");
        std::io::stderr().flush().ok();

        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("reading challenge solution")?;
        let solution = line.trim().to_owned();
        if solution.is_empty() {
            anyhow::bail!("empty challenge solution");
        }
        Ok(solution)
    }
}

fn prompt_line(label: &str) -> anyhow::Result<String> {
    eprint!("{label}");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).context("reading input")?;
    Ok(line.trim().to_owned())
}

/// Run the interactive login flow.
pub async fn login(config: &Config, username: Option<String>) -> anyhow::Result<()> {
    let manager = SessionManager::new(&config.auth).context("initializing session manager")?;

    if manager.is_logged_in().await {
        eprintln!("Already logged in.");
        return Ok(());
    }

    let username = match username {
        Some(u) => u,
        None => prompt_line("jAccount username: ")?,
    };
    if username.is_empty() {
        anyhow::bail!("username must not be empty");
    }
    let password = rpassword::prompt_password_stderr("jAccount password: ")
        .context("reading password")?;

    let solver: Arc<dyn ChallengeSolver> = Arc::new(StdinChallengeSolver);
    if manager.login_with_password(&username, &password, &solver).await {
        eprintln!("Login successful. Cookies saved to {}.", manager.credential_path().display());
        Ok(())
    } else {
        anyhow::bail!("login failed — check username, password and challenge solution")
    }
}

/// Clear local session state (and fire a best-effort remote logout).
pub async fn logout(config: &Config) -> anyhow::Result<()> {
    let manager = SessionManager::new(&config.auth).context("initializing session manager")?;
    manager.logout().await;
    eprintln!("Logged out.");
    Ok(())
}

/// Report stored-credential and liveness state.
pub async fn status(config: &Config) -> anyhow::Result<()> {
    let manager = SessionManager::new(&config.auth).context("initializing session manager")?;

    if !manager.has_credentials() {
        println!("No stored session ({}).", manager.credential_path().display());
        return Ok(());
    }

    if manager.is_logged_in().await {
        println!("Session is live.");
    } else {
        println!("Stored session has expired — run `campusgate login`.");
    }
    Ok(())
}
