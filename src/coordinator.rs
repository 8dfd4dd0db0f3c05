//! Background side of the extension: owns credentials and badges, performs
//! every Gerrit request and relays lifecycle events to the page agents.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use crate::error::STATUS_UNREACHABLE;
use crate::gerrit::ChangeSource;
use crate::models::{BadgeColor, Change, Credentials, TabBadge, TabId};
use crate::protocol::{self, AgentMessage, CoordinatorRequest, Reply};
use crate::router::TabRouter;
use crate::settings_db::SettingsDb;

/// The platform's per-tab badge primitive.
pub trait BadgeSurface: Send + Sync {
    fn set_badge(&self, tab: TabId, badge: &TabBadge);
}

/// Badge surface for headless runs: badges only show up in the log.
pub struct LogBadgeSurface;

impl BadgeSurface for LogBadgeSurface {
    fn set_badge(&self, tab: TabId, badge: &TabBadge) {
        log::info!(
            "badge {tab}: text={:?} color={}",
            badge.text,
            badge.color.css()
        );
    }
}

pub enum CoordinatorEvent {
    Request {
        tab: TabId,
        payload: Value,
        reply: oneshot::Sender<Reply>,
    },
    IconActivated {
        tab: TabId,
    },
    TabActivated {
        tab: TabId,
    },
    TabRemoved {
        tab: TabId,
    },
    Shutdown,
}

/// Sending half of the coordinator's inbox, given to every page agent.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    fn post(&self, event: CoordinatorEvent) -> Result<(), String> {
        self.tx
            .send(event)
            .map_err(|_| "Coordinator is not running".to_string())
    }

    /// Send a request and wait for its reply.
    pub async fn request(&self, tab: TabId, request: &CoordinatorRequest) -> Result<Reply, String> {
        let (reply, response) = oneshot::channel();
        self.post(CoordinatorEvent::Request {
            tab,
            payload: protocol::encode(request),
            reply,
        })?;
        response
            .await
            .map_err(|_| "Coordinator dropped the request".to_string())
    }

    /// Send a request without waiting for the reply.
    pub fn notify(&self, tab: TabId, request: &CoordinatorRequest) -> Result<(), String> {
        let (reply, _) = oneshot::channel();
        self.post(CoordinatorEvent::Request {
            tab,
            payload: protocol::encode(request),
            reply,
        })
    }

    pub fn icon_activated(&self, tab: TabId) -> Result<(), String> {
        self.post(CoordinatorEvent::IconActivated { tab })
    }

    pub fn tab_activated(&self, tab: TabId) -> Result<(), String> {
        self.post(CoordinatorEvent::TabActivated { tab })
    }

    pub fn tab_removed(&self, tab: TabId) -> Result<(), String> {
        self.post(CoordinatorEvent::TabRemoved { tab })
    }

    pub fn shutdown(&self) -> Result<(), String> {
        self.post(CoordinatorEvent::Shutdown)
    }
}

#[derive(Clone)]
pub struct Coordinator {
    settings: SettingsDb,
    source: Arc<dyn ChangeSource>,
    tabs: TabRouter,
    badge_surface: Arc<dyn BadgeSurface>,
    badges: Arc<Mutex<HashMap<TabId, TabBadge>>>,
    previous_active_tab: Arc<Mutex<Option<TabId>>>,
}

impl Coordinator {
    pub fn new(
        settings: SettingsDb,
        source: Arc<dyn ChangeSource>,
        tabs: TabRouter,
        badge_surface: Arc<dyn BadgeSurface>,
    ) -> Self {
        Self {
            settings,
            source,
            tabs,
            badge_surface,
            badges: Arc::new(Mutex::new(HashMap::new())),
            previous_active_tab: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the event loop and return the handle agents talk to.
    pub fn spawn(self) -> (CoordinatorHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (CoordinatorHandle { tx }, task)
    }

    async fn run(self, mut inbox: mpsc::UnboundedReceiver<CoordinatorEvent>) {
        log::info!("coordinator started");
        while let Some(event) = inbox.recv().await {
            match event {
                CoordinatorEvent::IconActivated { tab } => self.on_icon_activated(tab).await,
                CoordinatorEvent::TabActivated { tab } => self.on_tab_activated(tab),
                CoordinatorEvent::TabRemoved { tab } => self.on_tab_removed(tab),
                CoordinatorEvent::Request {
                    tab,
                    payload,
                    reply,
                } => self.dispatch(tab, payload, reply).await,
                CoordinatorEvent::Shutdown => break,
            }
        }
        log::info!("coordinator stopped");
    }

    async fn dispatch(&self, tab: TabId, payload: Value, reply: oneshot::Sender<Reply>) {
        let request = match CoordinatorRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("rejecting request from {tab}: {e}");
                let _ = reply.send(Reply::Rejected(e.to_string()));
                return;
            }
        };

        let answer = match request {
            CoordinatorRequest::TryGetChangesByJiraKey {
                jira_key,
                request_id,
            } => {
                // Lookups wait on the network; keep the loop free for other tabs.
                let coordinator = self.clone();
                tokio::spawn(async move {
                    let changes = coordinator
                        .lookup_changes_by_tracker_key(&jira_key, tab, request_id)
                        .await;
                    if reply.send(Reply::Changes(changes)).is_err() {
                        log::debug!("{tab} stopped waiting for {jira_key}");
                    }
                });
                return;
            }
            CoordinatorRequest::SetListBadge { value } => {
                self.set_list_badge(value, tab);
                Reply::Done
            }
            CoordinatorRequest::SetGerritHost { host, user, pass } => {
                match self
                    .save_credentials(Credentials::new(host, user, pass), tab)
                    .await
                {
                    Ok(()) => Reply::Done,
                    Err(e) => Reply::Rejected(e),
                }
            }
        };
        let _ = reply.send(answer);
    }

    async fn credentials(&self) -> Credentials {
        self.settings
            .load_credentials_async()
            .await
            .unwrap_or_else(|e| {
                log::error!("Failed to read Gerrit credentials: {e}");
                Credentials::default()
            })
    }

    pub async fn on_icon_activated(&self, tab: TabId) {
        let creds = self.credentials().await;
        log::debug!("icon clicked in {tab}, configured={}", creds.is_configured());
        self.tabs.send(
            tab,
            &AgentMessage::ToggleNativePopup {
                configured: creds.is_configured(),
                host: creds.host,
                user: creds.user,
                pass: creds.pass,
            },
        );
    }

    /// Switching tabs does not reload either page, so both the tab being left
    /// and the tab being shown are told to close overlays and re-check.
    pub fn on_tab_activated(&self, tab: TabId) {
        let previous = match self.previous_active_tab.lock() {
            Ok(mut previous) => previous.replace(tab),
            Err(e) => {
                log::error!("Lock error: {e}");
                None
            }
        };
        if let Some(previous) = previous.filter(|previous| *previous != tab) {
            self.tabs.send(previous, &AgentMessage::ActiveTabChange);
        }
        self.tabs.send(tab, &AgentMessage::ActiveTabChange);
    }

    pub fn on_tab_removed(&self, tab: TabId) {
        if let Ok(mut badges) = self.badges.lock() {
            badges.remove(&tab);
        }
        if let Ok(mut previous) = self.previous_active_tab.lock() {
            if *previous == Some(tab) {
                *previous = None;
            }
        }
    }

    /// Fetch the changes mentioning `key`. Never fails: problems are
    /// reported to the tab as a status and the result is empty. The status
    /// report carries `request_id` back so the tab can match it to its lookup.
    pub async fn lookup_changes_by_tracker_key(
        &self,
        key: &str,
        tab: TabId,
        request_id: Option<u64>,
    ) -> Vec<Change> {
        let creds = self.credentials().await;
        if !creds.is_configured() {
            log::info!("{key}: no Gerrit host configured");
            self.set_config_needed_badge(tab);
            self.tabs.send(tab, &AgentMessage::PurgeLocalChanges);
            return Vec::new();
        }

        let (status, changes) = match self.source.changes_for_key(&creds, key).await {
            Ok(outcome) => (outcome.status, outcome.changes),
            Err(e) => {
                log::warn!("{key}: {e}");
                (e.status().unwrap_or(STATUS_UNREACHABLE), Vec::new())
            }
        };
        // The status goes out before the reply so the agent sees it first.
        self.tabs.send(
            tab,
            &AgentMessage::SetLastGerritResponse {
                status,
                jira_key: Some(key.to_string()),
                request_id,
            },
        );
        changes
    }

    fn set_badge(&self, tab: TabId, badge: TabBadge) {
        self.badge_surface.set_badge(tab, &badge);
        match self.badges.lock() {
            Ok(mut badges) => {
                badges.insert(tab, badge);
            }
            Err(e) => log::error!("Lock error: {e}"),
        }
    }

    pub fn set_list_badge(&self, length: usize, tab: TabId) {
        let text = if length == 0 {
            String::new()
        } else {
            length.to_string()
        };
        self.set_badge(
            tab,
            TabBadge {
                text,
                color: BadgeColor::List,
            },
        );
    }

    pub fn set_config_needed_badge(&self, tab: TabId) {
        self.set_badge(
            tab,
            TabBadge {
                text: "?".to_string(),
                color: BadgeColor::ConfigNeeded,
            },
        );
    }

    /// Persist credentials, then reset the tab's badge. Returns only after the
    /// write has committed.
    pub async fn save_credentials(&self, creds: Credentials, tab: TabId) -> Result<(), String> {
        self.settings.save_credentials_async(creds).await.map_err(|e| {
            log::error!("{e}");
            e
        })?;
        self.set_badge(tab, TabBadge::default());
        Ok(())
    }

    pub fn badge(&self, tab: TabId) -> Option<TabBadge> {
        self.badges
            .lock()
            .ok()
            .and_then(|badges| badges.get(&tab).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentEvent;
    use crate::error::FetchError;
    use crate::gerrit::FetchOutcome;
    use crate::test_support::{change, RecordingBadges, StubSource};
    use serde_json::json;

    struct Fixture {
        coordinator: Coordinator,
        source: Arc<StubSource>,
        badges: Arc<RecordingBadges>,
        inbox: mpsc::UnboundedReceiver<AgentEvent>,
        _dir: tempfile::TempDir,
    }

    fn fixture(creds: Option<Credentials>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsDb::init(dir.path()).unwrap();
        if let Some(creds) = creds {
            settings.save_credentials(&creds).unwrap();
        }
        let source = Arc::new(StubSource::default());
        let badges = Arc::new(RecordingBadges::default());
        let router = TabRouter::default();
        let (tx, inbox) = mpsc::unbounded_channel();
        router.register(TabId(1), tx).unwrap();
        Fixture {
            coordinator: Coordinator::new(settings, source.clone(), router, badges.clone()),
            source,
            badges,
            inbox,
            _dir: dir,
        }
    }

    fn drain(inbox: &mut mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentMessage> {
        let mut messages = Vec::new();
        while let Ok(event) = inbox.try_recv() {
            if let AgentEvent::Message(value) = event {
                messages.push(AgentMessage::decode(value).unwrap());
            }
        }
        messages
    }

    fn configured() -> Option<Credentials> {
        Some(Credentials::new("https://g.example", "alice", "pw"))
    }

    #[tokio::test]
    async fn test_unconfigured_lookup_skips_network() {
        let mut fx = fixture(None);
        let changes = fx
            .coordinator
            .lookup_changes_by_tracker_key("ABC-123", TabId(1), Some(1))
            .await;

        assert!(changes.is_empty());
        assert!(fx.source.calls().is_empty());
        assert_eq!(
            fx.coordinator.badge(TabId(1)),
            Some(TabBadge {
                text: "?".into(),
                color: BadgeColor::ConfigNeeded
            })
        );
        assert_eq!(drain(&mut fx.inbox), vec![AgentMessage::PurgeLocalChanges]);
    }

    #[tokio::test]
    async fn test_successful_lookup_reports_status() {
        let mut fx = fixture(configured());
        fx.source.respond(
            "ABC-123",
            Ok(FetchOutcome {
                status: 200,
                changes: vec![change(1), change(2)],
            }),
        );

        let changes = fx
            .coordinator
            .lookup_changes_by_tracker_key("ABC-123", TabId(1), Some(1))
            .await;
        assert_eq!(changes.len(), 2);
        assert_eq!(
            fx.source.calls(),
            vec![(
                Credentials::new("https://g.example", "alice", "pw"),
                "ABC-123".to_string()
            )]
        );
        assert_eq!(
            drain(&mut fx.inbox),
            vec![AgentMessage::SetLastGerritResponse {
                status: 200,
                jira_key: Some("ABC-123".into()),
                request_id: Some(1),
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_lookups_report_status_and_return_empty() {
        let cases = [
            (FetchError::Http(401), 401),
            (FetchError::Network("refused".into()), 0),
            (FetchError::Parse("bad json".into()), 0),
        ];
        for (error, expected) in cases {
            let mut fx = fixture(configured());
            fx.source.respond("ABC-1", Err(error));
            let changes = fx
                .coordinator
                .lookup_changes_by_tracker_key("ABC-1", TabId(1), None)
                .await;
            assert!(changes.is_empty());
            assert_eq!(
                drain(&mut fx.inbox),
                vec![AgentMessage::SetLastGerritResponse {
                    status: expected,
                    jira_key: Some("ABC-1".into()),
                    request_id: None,
                }]
            );
        }
    }

    #[tokio::test]
    async fn test_icon_click_sends_credentials() {
        let mut fx = fixture(None);
        fx.coordinator.on_icon_activated(TabId(1)).await;
        assert_eq!(
            drain(&mut fx.inbox),
            vec![AgentMessage::ToggleNativePopup {
                configured: false,
                host: String::new(),
                user: String::new(),
                pass: String::new(),
            }]
        );

        fx.coordinator
            .save_credentials(Credentials::new("https://g.example", "bob", "x"), TabId(1))
            .await
            .unwrap();
        fx.coordinator.on_icon_activated(TabId(1)).await;
        let messages = drain(&mut fx.inbox);
        assert!(matches!(
            messages.as_slice(),
            [AgentMessage::ToggleNativePopup { configured: true, host, .. }] if host == "https://g.example"
        ));
    }

    #[tokio::test]
    async fn test_tab_switch_notifies_both_tabs() {
        let mut fx = fixture(None);
        let (tx2, mut inbox2) = mpsc::unbounded_channel();
        fx.coordinator.tabs.register(TabId(2), tx2).unwrap();

        fx.coordinator.on_tab_activated(TabId(1));
        assert_eq!(drain(&mut fx.inbox), vec![AgentMessage::ActiveTabChange]);
        assert!(drain(&mut inbox2).is_empty());

        fx.coordinator.on_tab_activated(TabId(2));
        assert_eq!(drain(&mut fx.inbox), vec![AgentMessage::ActiveTabChange]);
        assert_eq!(drain(&mut inbox2), vec![AgentMessage::ActiveTabChange]);

        fx.coordinator.on_tab_removed(TabId(2));
        fx.coordinator.on_tab_activated(TabId(1));
        assert_eq!(drain(&mut fx.inbox), vec![AgentMessage::ActiveTabChange]);
        assert!(drain(&mut inbox2).is_empty());
    }

    #[tokio::test]
    async fn test_list_badge_text() {
        let fx = fixture(None);
        fx.coordinator.set_list_badge(2, TabId(1));
        assert_eq!(fx.badges.last(TabId(1)).unwrap().text, "2");
        fx.coordinator.set_list_badge(0, TabId(1));
        assert_eq!(
            fx.badges.last(TabId(1)),
            Some(TabBadge {
                text: String::new(),
                color: BadgeColor::List
            })
        );
    }

    #[tokio::test]
    async fn test_save_clears_badge_after_persisting() {
        let fx = fixture(None);
        fx.coordinator.set_config_needed_badge(TabId(1));
        fx.coordinator
            .save_credentials(Credentials::new("https://g.example", "", ""), TabId(1))
            .await
            .unwrap();
        assert_eq!(fx.coordinator.badge(TabId(1)), Some(TabBadge::default()));
        assert!(fx.coordinator.credentials().await.is_configured());
    }

    #[tokio::test]
    async fn test_event_loop_answers_requests() {
        let fx = fixture(configured());
        fx.source.respond(
            "ABC-9",
            Ok(FetchOutcome {
                status: 200,
                changes: vec![change(9)],
            }),
        );
        let (handle, task) = fx.coordinator.clone().spawn();

        let reply = handle
            .request(
                TabId(1),
                &CoordinatorRequest::TryGetChangesByJiraKey {
                    jira_key: "ABC-9".into(),
                    request_id: Some(4),
                },
            )
            .await
            .unwrap();
        assert_eq!(reply, Reply::Changes(vec![change(9)]));

        let reply = handle
            .request(TabId(1), &CoordinatorRequest::SetListBadge { value: 1 })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Done);
        assert_eq!(fx.coordinator.badge(TabId(1)).unwrap().text, "1");

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_request_is_rejected() {
        let fx = fixture(None);
        let (reply, response) = oneshot::channel();
        fx.coordinator
            .dispatch(TabId(1), json!({"type": "deleteEverything"}), reply)
            .await;
        let Ok(Reply::Rejected(reason)) = response.await else {
            panic!("expected a rejection");
        };
        assert!(reason.contains("deleteEverything"));
    }
}
