use serde::Serialize;

use crate::error::STATUS_OK;
use crate::models::{Change, Credentials, OverlayState};
use crate::overlay::{ChangeRow, OverlayView};

/// Decide which overlay to open. Strict priority: settings, list, debug,
/// ticketless.
pub fn cascade(configured: bool, change_count: usize, last_status: Option<u16>) -> OverlayState {
    if !configured {
        OverlayState::Settings
    } else if change_count > 0 {
        OverlayState::List
    } else if last_status.is_some() {
        OverlayState::Debug
    } else {
        OverlayState::Ticketless
    }
}

/// Everything a page agent knows about its tab.
#[derive(Debug, Clone, Default)]
pub struct PerTabSession {
    current_url: String,
    tracker_key: Option<String>,
    fetched_changes: Vec<Change>,
    last_response_status: Option<u16>,
    overlay: OverlayState,
    credentials: Credentials,
    generation: u64,
}

/// Read-only copy of a session, published after every agent event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub url: String,
    pub tracker_key: Option<String>,
    pub change_count: usize,
    pub last_response_status: Option<u16>,
    pub overlay: OverlayState,
    pub generation: u64,
    /// Number of lookups whose reply has been applied or discarded.
    pub settled: u64,
}

impl PerTabSession {
    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    pub fn tracker_key(&self) -> Option<&str> {
        self.tracker_key.as_deref()
    }

    pub fn fetched_changes(&self) -> &[Change] {
        &self.fetched_changes
    }

    pub fn last_response_status(&self) -> Option<u16> {
        self.last_response_status
    }

    pub fn overlay(&self) -> OverlayState {
        self.overlay
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record a newly observed URL. Returns false when it is unchanged.
    pub fn observe_url(&mut self, url: &str) -> bool {
        if self.current_url == url {
            return false;
        }
        self.current_url = url.to_string();
        true
    }

    /// Drop fetched data after navigation. Bumping the generation makes
    /// every lookup still in flight stale.
    pub fn clear(&mut self) {
        self.tracker_key = None;
        self.fetched_changes.clear();
        self.last_response_status = None;
        self.generation += 1;
    }

    pub fn purge_changes(&mut self) {
        self.fetched_changes.clear();
    }

    pub fn set_credentials(&mut self, creds: Credentials) {
        self.credentials = creds;
    }

    /// Start a lookup for `key`. The returned generation tags the request so
    /// a late reply can be recognised.
    pub fn begin_lookup(&mut self, key: String) -> u64 {
        self.tracker_key = Some(key);
        self.generation += 1;
        self.generation
    }

    fn is_current(&self, key: &str, generation: u64) -> bool {
        self.generation == generation && self.tracker_key.as_deref() == Some(key)
    }

    /// Apply a status report. Reports tagged with another key or an older
    /// generation are ignored.
    pub fn store_last_response(
        &mut self,
        status: u16,
        key: Option<&str>,
        generation: Option<u64>,
    ) -> bool {
        if key.is_some_and(|k| self.tracker_key.as_deref() != Some(k))
            || generation.is_some_and(|g| g != self.generation)
        {
            return false;
        }
        self.last_response_status = Some(status);
        if status != STATUS_OK {
            self.fetched_changes.clear();
        }
        true
    }

    /// Apply a lookup reply. Returns false when the reply is stale.
    pub fn store_changes(&mut self, key: &str, generation: u64, changes: Vec<Change>) -> bool {
        if !self.is_current(key, generation) {
            return false;
        }
        self.fetched_changes = if self.last_response_status == Some(STATUS_OK) {
            changes
        } else {
            Vec::new()
        };
        true
    }

    pub fn next_overlay(&self) -> OverlayState {
        cascade(
            self.credentials.is_configured(),
            self.fetched_changes.len(),
            self.last_response_status,
        )
    }

    /// Build the view for `state` from the current data.
    pub fn view_for(&self, state: OverlayState) -> Option<OverlayView> {
        let host = &self.credentials.host;
        match state {
            OverlayState::Closed => None,
            OverlayState::List => Some(OverlayView::List {
                tracker_key: self.tracker_key.clone().unwrap_or_default(),
                rows: self
                    .fetched_changes
                    .iter()
                    .map(|change| ChangeRow::from_change(host, change))
                    .collect(),
            }),
            OverlayState::Settings => Some(OverlayView::Settings {
                host: self.credentials.host.clone(),
                user: self.credentials.user.clone(),
                pass: self.credentials.pass.clone(),
            }),
            OverlayState::Debug => Some(OverlayView::debug(
                host,
                self.last_response_status.unwrap_or_default(),
            )),
            OverlayState::Ticketless => Some(OverlayView::Ticketless),
        }
    }

    pub fn set_overlay(&mut self, state: OverlayState) {
        self.overlay = state;
    }

    pub fn snapshot(&self, settled: u64) -> SessionSnapshot {
        SessionSnapshot {
            url: self.current_url.clone(),
            tracker_key: self.tracker_key.clone(),
            change_count: self.fetched_changes.len(),
            last_response_status: self.last_response_status,
            overlay: self.overlay,
            generation: self.generation,
            settled,
        }
    }
}
