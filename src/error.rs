use thiserror::Error;

/// Status reported to a tab when a request never produced an HTTP status.
pub const STATUS_UNREACHABLE: u16 = 0;

pub const STATUS_OK: u16 = 200;

/// Everything that can go wrong between asking for changes and getting them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no Gerrit host configured")]
    Unconfigured,
    #[error("request to Gerrit failed: {0}")]
    Network(String),
    #[error("Gerrit answered with HTTP {0}")]
    Http(u16),
    #[error("could not parse Gerrit response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Status code surfaced to the page. Parse failures collapse into the
    /// unreachable sentinel, same as transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unconfigured => None,
            Self::Network(_) | Self::Parse(_) => Some(STATUS_UNREACHABLE),
            Self::Http(code) => Some(*code),
        }
    }
}
