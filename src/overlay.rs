use std::fmt;

use crate::error::{STATUS_OK, STATUS_UNREACHABLE};
use crate::models::{Change, OverlayState};

/// One row of the change list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRow {
    pub url: String,
    pub subject: String,
    pub project: String,
    pub status: String,
    pub insertions: u64,
    pub deletions: u64,
}

impl ChangeRow {
    pub fn from_change(host: &str, change: &Change) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            url: format!("{host}/#/c/{}/", change.number),
            subject: change.subject.clone(),
            project: change.project.clone(),
            status: change.status.as_str().to_string(),
            insertions: change.insertions,
            deletions: change.deletions,
        }
    }
}

/// What an open overlay shows. Produced from the session when the overlay is
/// mounted; the surface only renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayView {
    List {
        tracker_key: String,
        rows: Vec<ChangeRow>,
    },
    Settings {
        host: String,
        user: String,
        pass: String,
    },
    Debug {
        host: String,
        status: u16,
        ok: bool,
        headline: String,
        hint: &'static str,
    },
    Ticketless,
}

impl OverlayView {
    pub fn state(&self) -> OverlayState {
        match self {
            Self::List { .. } => OverlayState::List,
            Self::Settings { .. } => OverlayState::Settings,
            Self::Debug { .. } => OverlayState::Debug,
            Self::Ticketless => OverlayState::Ticketless,
        }
    }

    pub fn debug(host: &str, status: u16) -> Self {
        Self::Debug {
            host: if host.is_empty() {
                "Gerrit".to_string()
            } else {
                host.to_string()
            },
            status,
            ok: status == STATUS_OK,
            headline: status_headline(status),
            hint: status_hint(status),
        }
    }
}

pub fn status_message(status: u16) -> Option<&'static str> {
    match status {
        200 => Some("OK"),
        401 => Some("Unauthorized"),
        403 => Some("Forbidden"),
        500 => Some("Internal Server Error"),
        _ => None,
    }
}

pub fn status_hint(status: u16) -> &'static str {
    match status {
        200 => "No Results Found.",
        401 | 403 => "You may need to log in to Gerrit.",
        STATUS_UNREACHABLE => "Gerrit was not reachable at the specified host.",
        _ => "",
    }
}

pub fn status_headline(status: u16) -> String {
    if status == STATUS_UNREACHABLE {
        return "Connection Failed".to_string();
    }
    match status_message(status) {
        Some(message) => format!("{status}: {message}"),
        None => status.to_string(),
    }
}

/// Plain-text rendering, used by the terminal surface.
impl fmt::Display for OverlayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List { tracker_key, rows } => {
                writeln!(f, "Gerrit Changes Linked to {tracker_key}")?;
                for row in rows {
                    writeln!(
                        f,
                        "  {} ({}) {} +{} -{}\n    {}",
                        row.subject,
                        row.project,
                        row.status,
                        row.insertions,
                        row.deletions,
                        row.url
                    )?;
                }
                Ok(())
            }
            Self::Settings { host, user, .. } => {
                writeln!(f, "Settings")?;
                writeln!(f, "  Gerrit Host: {host}")?;
                writeln!(f, "  Gerrit user: {user}")?;
                writeln!(f, "  Gerrit pass: ********")
            }
            Self::Debug {
                host,
                ok,
                headline,
                hint,
                ..
            } => {
                writeln!(f, "Last Response from {host}:")?;
                let mark = if *ok { "[ok]" } else { "[!!]" };
                write!(f, "  {mark} {headline}")?;
                if !hint.is_empty() {
                    write!(f, " {hint}")?;
                }
                writeln!(f)
            }
            Self::Ticketless => writeln!(f, "No JIRA Ticket detected in URL."),
        }
    }
}
