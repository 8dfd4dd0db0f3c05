pub mod agent;
mod cli;
pub mod config;
pub mod coordinator;
pub mod detect;
pub mod error;
pub mod extension;
pub mod gerrit;
pub mod models;
pub mod overlay;
pub mod protocol;
pub mod router;
pub mod session;
pub mod settings_db;
#[cfg(test)]
mod test_support;

use tracing_subscriber::EnvFilter;

pub use agent::{ClickTarget, OverlaySurface, PageAgentHandle, PageLocation, SharedLocation};
pub use coordinator::{BadgeSurface, LogBadgeSurface};
pub use extension::Extension;
pub use gerrit::{ChangeSource, GerritClient};
pub use models::{Change, Credentials, OverlayState, TabId};
pub use settings_db::SettingsDb;

/// Entry point of the `jirrit` binary.
pub fn run() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::from_env()?;
    let command = cli::Command::parse(std::env::args().skip(1))?;
    log::debug!("running {command:?} with {config:?}");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;
    runtime.block_on(cli::execute(command, config))
}
