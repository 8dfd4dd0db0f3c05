use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding `jirrit.db`.
    pub data_dir: PathBuf,
    /// How often each page agent re-reads its URL.
    pub poll_interval: Duration,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jirrit")
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(dir) = lookup("JIRRIT_DATA_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Some(raw) = lookup("JIRRIT_POLL_INTERVAL_MS") {
            config.poll_interval =
                Duration::from_millis(parse_positive("JIRRIT_POLL_INTERVAL_MS", &raw)?);
        }
        if let Some(raw) = lookup("JIRRIT_HTTP_TIMEOUT_SECS") {
            config.http_timeout =
                Duration::from_secs(parse_positive("JIRRIT_HTTP_TIMEOUT_SECS", &raw)?);
        }
        Ok(config)
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u64, String> {
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("{name} must be an unsigned integer, got {raw:?}"))?;
    if value == 0 {
        return Err(format!("{name} must be greater than zero"));
    }
    Ok(value)
}
