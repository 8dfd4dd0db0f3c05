//! Stand-ins for the host platform and Gerrit, shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::agent::{OverlaySurface, SharedLocation};
use crate::coordinator::BadgeSurface;
use crate::error::FetchError;
use crate::gerrit::{ChangeSource, FetchOutcome};
use crate::models::{Change, ChangeStatus, Credentials, TabBadge, TabId};
use crate::overlay::OverlayView;

pub fn change(number: u64) -> Change {
    Change {
        number,
        subject: format!("change {number}"),
        project: "web".to_string(),
        status: ChangeStatus::New,
        insertions: number,
        deletions: 0,
    }
}

pub fn ok(changes: Vec<Change>) -> Result<FetchOutcome, FetchError> {
    Ok(FetchOutcome {
        status: 200,
        changes,
    })
}

/// Canned Gerrit: answers per key, optionally after a delay. Unknown keys get
/// an empty 200.
#[derive(Default)]
pub struct StubSource {
    responses: Mutex<HashMap<String, Result<FetchOutcome, FetchError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(Credentials, String)>>,
}

impl StubSource {
    pub fn respond(&self, key: &str, response: Result<FetchOutcome, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), response);
    }

    pub fn delay(&self, key: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<(Credentials, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeSource for StubSource {
    async fn changes_for_key(
        &self,
        creds: &Credentials,
        jira_key: &str,
    ) -> Result<FetchOutcome, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((creds.clone(), jira_key.to_string()));
        let delay = self.delays.lock().unwrap().get(jira_key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let response = self.responses.lock().unwrap().get(jira_key).cloned();
        response.unwrap_or_else(|| ok(Vec::new()))
    }
}

#[derive(Default)]
pub struct RecordingBadges {
    badges: Mutex<Vec<(TabId, TabBadge)>>,
}

impl RecordingBadges {
    pub fn last(&self, tab: TabId) -> Option<TabBadge> {
        self.badges
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _)| *t == tab)
            .map(|(_, badge)| badge.clone())
    }
}

impl BadgeSurface for RecordingBadges {
    fn set_badge(&self, tab: TabId, badge: &TabBadge) {
        self.badges.lock().unwrap().push((tab, badge.clone()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Mounted(OverlayView),
    Unmounted,
}

/// Overlay surface that remembers every mount and unmount.
#[derive(Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
}

impl RecordingSurface {
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    /// The view currently on the page, if any.
    pub fn mounted(&self) -> Option<OverlayView> {
        match self.events.lock().unwrap().last() {
            Some(SurfaceEvent::Mounted(view)) => Some(view.clone()),
            _ => None,
        }
    }
}

impl OverlaySurface for RecordingSurface {
    fn mount(&self, view: &OverlayView) {
        let mut events = self.events.lock().unwrap();
        assert!(
            !matches!(events.last(), Some(SurfaceEvent::Mounted(_))),
            "overlay mounted twice"
        );
        events.push(SurfaceEvent::Mounted(view.clone()));
    }

    fn unmount(&self) {
        self.events.lock().unwrap().push(SurfaceEvent::Unmounted);
    }
}

pub fn location(url: &str) -> Arc<SharedLocation> {
    Arc::new(SharedLocation::new(url))
}
