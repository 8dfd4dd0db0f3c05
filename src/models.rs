use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a browser tab, as handed out by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab#{}", self.0)
    }
}

/// Gerrit connection settings. An empty `host` means "not configured".
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub host: String,
    pub user: String,
    pub pass: String,
}

impl Credentials {
    pub fn new(host: impl Into<String>, user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            pass: pass.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    New,
    Merged,
    Abandoned,
    Draft,
    #[serde(other)]
    Other,
}

impl ChangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Merged => "MERGED",
            Self::Abandoned => "ABANDONED",
            Self::Draft => "DRAFT",
            Self::Other => "UNKNOWN",
        }
    }
}

/// A Gerrit change whose commit message mentions the tracked issue key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub number: u64,
    pub subject: String,
    pub project: String,
    pub status: ChangeStatus,
    pub insertions: u64,
    pub deletions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeColor {
    #[default]
    Neutral,
    ConfigNeeded,
    List,
}

impl BadgeColor {
    /// CSS color handed to the platform badge primitive.
    pub fn css(self) -> &'static str {
        match self {
            Self::ConfigNeeded => "rgb(254, 80, 0)",
            Self::Neutral | Self::List => "rgb(0, 82, 204)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabBadge {
    pub text: String,
    pub color: BadgeColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayState {
    #[default]
    Closed,
    List,
    Settings,
    Debug,
    Ticketless,
}

impl OverlayState {
    pub fn is_open(self) -> bool {
        self != Self::Closed
    }
}
