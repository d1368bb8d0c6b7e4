pub mod login;

use clap::{Parser, Subcommand};

/// CampusGate — an MCP gateway for SJTU campus services.
#[derive(Debug, Parser)]
#[command(name = "campusgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the MCP server (default when no subcommand is given).
    Serve,
    /// Log in to jAccount interactively (username, password, challenge).
    Login {
        /// jAccount username; prompted for when omitted.
        #[arg(long)]
        username: Option<String>,
    },
    /// Log out: clear the cookie jar and delete the persisted record.
    Logout,
    /// Report whether the stored session is still live.
    Status,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `CG_CONFIG` (or
/// `config.toml` by default).  Returns the parsed config and the path
/// that was used.
pub fn load_config() -> anyhow::Result<(cg_domain::config::Config, String)> {
    let config_path = std::env::var("CG_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        cg_domain::config::Config::default()
    };

    Ok((config, config_path))
}

// ── Config subcommands ────────────────────────────────────────────────

pub fn validate(config: &cg_domain::config::Config, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{config_path}: OK");
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    !issues
        .iter()
        .any(|i| i.severity == cg_domain::config::ConfigSeverity::Error)
}

pub fn show(config: &cg_domain::config::Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}
