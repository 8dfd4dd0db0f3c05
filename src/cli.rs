use std::sync::Arc;

use crate::agent::{OverlaySurface, SharedLocation};
use crate::config::Config;
use crate::coordinator::LogBadgeSurface;
use crate::extension::Extension;
use crate::gerrit::GerritClient;
use crate::models::{Credentials, TabId};
use crate::overlay::OverlayView;
use crate::settings_db::SettingsDb;

const USAGE: &str = "usage:
  jirrit configure <host> [user] [pass]   save Gerrit settings
  jirrit clear                            forget Gerrit settings
  jirrit show <url>                       print the overlay for a JIRA page";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Configure(Credentials),
    Clear,
    Show { url: String },
    Help,
}

impl Command {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut args = args.into_iter();
        let Some(verb) = args.next() else {
            return Ok(Self::Help);
        };
        let rest: Vec<String> = args.collect();
        match (verb.as_str(), rest.as_slice()) {
            ("configure", [host, tail @ ..]) if tail.len() <= 2 => Ok(Self::Configure(
                Credentials::new(
                    host.as_str(),
                    tail.first().cloned().unwrap_or_default(),
                    tail.get(1).cloned().unwrap_or_default(),
                ),
            )),
            ("clear", []) => Ok(Self::Clear),
            ("show", [url]) => Ok(Self::Show { url: url.clone() }),
            ("help" | "-h" | "--help", _) => Ok(Self::Help),
            _ => Err(format!("unrecognized arguments\n{USAGE}")),
        }
    }
}

/// Prints whatever gets mounted.
struct TerminalOverlay;

impl OverlaySurface for TerminalOverlay {
    fn mount(&self, view: &OverlayView) {
        print!("{view}");
    }

    fn unmount(&self) {}
}

pub async fn execute(command: Command, config: Config) -> Result<(), String> {
    match command {
        Command::Help => {
            println!("{USAGE}");
            Ok(())
        }
        Command::Configure(creds) => {
            let settings = SettingsDb::init(&config.data_dir)?;
            settings.save_credentials_async(creds).await?;
            println!("saved settings to {}", config.data_dir.display());
            Ok(())
        }
        Command::Clear => {
            let settings = SettingsDb::init(&config.data_dir)?;
            settings
                .save_credentials_async(Credentials::default())
                .await?;
            println!("cleared settings");
            Ok(())
        }
        Command::Show { url } => show(url, config).await,
    }
}

async fn show(url: String, config: Config) -> Result<(), String> {
    let settings = SettingsDb::init(&config.data_dir)?;
    let client = GerritClient::new(config.http_timeout)?;
    let mut extension = Extension::start(
        settings,
        Arc::new(client),
        Arc::new(LogBadgeSurface),
        config.poll_interval,
    );
    let tab = TabId(1);
    let settle_timeout = config.http_timeout + config.poll_interval * 4;

    let agent = extension.open_tab(
        tab,
        Arc::new(SharedLocation::new(url.as_str())),
        Arc::new(TerminalOverlay),
    )?;
    let has_key = crate::detect::tracker_key(&url).is_some();
    let wait = agent.wait_for(|s| s.url == url && (!has_key || s.settled >= 1));
    tokio::time::timeout(settle_timeout, wait)
        .await
        .map_err(|_| "timed out waiting for Gerrit".to_string())??;

    extension.click_icon(tab)?;
    let Some(agent) = extension.tab(tab) else {
        return Err(format!("{tab} disappeared"));
    };
    tokio::time::timeout(settle_timeout, agent.wait_for(|s| s.overlay.is_open()))
        .await
        .map_err(|_| "timed out waiting for the overlay".to_string())??;

    extension.shutdown().await
}
