//! Per-tab side of the extension: watches the page URL, asks the coordinator
//! for changes and drives the overlay state machine.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::coordinator::CoordinatorHandle;
use crate::detect;
use crate::models::{Credentials, OverlayState, TabId};
use crate::overlay::OverlayView;
use crate::protocol::{AgentMessage, CoordinatorRequest, Reply};
use crate::router::TabRouter;
use crate::session::{PerTabSession, SessionSnapshot};

/// Where the page currently is.
pub trait PageLocation: Send + Sync {
    fn href(&self) -> String;
}

/// The page-side rendering primitive. The agent guarantees `mount` is only
/// called when nothing is mounted.
pub trait OverlaySurface: Send + Sync {
    fn mount(&self, view: &OverlayView);
    fn unmount(&self);
}

/// A location the embedder can move, e.g. to mirror single-page-app
/// navigation.
pub struct SharedLocation {
    href: Mutex<String>,
}

impl SharedLocation {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Mutex::new(href.into()),
        }
    }

    pub fn navigate(&self, href: impl Into<String>) {
        match self.href.lock() {
            Ok(mut current) => *current = href.into(),
            Err(e) => log::error!("Lock error: {e}"),
        }
    }
}

impl PageLocation for SharedLocation {
    fn href(&self) -> String {
        self.href
            .lock()
            .map(|href| href.clone())
            .unwrap_or_default()
    }
}

/// What the user clicked on while the page is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    Outside,
    Inside,
    CloseButton,
    SettingsGear,
    Save(Credentials),
}

pub enum AgentEvent {
    /// JSON-encoded [`AgentMessage`] from the coordinator.
    Message(Value),
    Click(ClickTarget),
    LookupSettled {
        key: String,
        generation: u64,
        reply: Result<Reply, String>,
    },
    CredentialsSaved {
        creds: Credentials,
        reply: Result<Reply, String>,
    },
}

pub struct PageAgent {
    tab: TabId,
    session: PerTabSession,
    coordinator: CoordinatorHandle,
    location: Arc<dyn PageLocation>,
    surface: Arc<dyn OverlaySurface>,
    events: mpsc::UnboundedSender<AgentEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
    settled: u64,
}

/// Owner's side of a running page agent. Dropping it stops the agent.
pub struct PageAgentHandle {
    tab: TabId,
    events: mpsc::UnboundedSender<AgentEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PageAgent {
    /// Attach an agent to `tab` and start its URL watch.
    pub fn attach(
        tab: TabId,
        coordinator: CoordinatorHandle,
        router: &TabRouter,
        location: Arc<dyn PageLocation>,
        surface: Arc<dyn OverlaySurface>,
        poll_interval: Duration,
    ) -> Result<PageAgentHandle, String> {
        let (events, inbox) = mpsc::unbounded_channel();
        router.register(tab, events.clone())?;

        let (snapshots, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (stop_tx, stop_rx) = oneshot::channel();
        let agent = Self {
            tab,
            session: PerTabSession::default(),
            coordinator,
            location,
            surface,
            events: events.clone(),
            snapshots,
            settled: 0,
        };
        let task = tokio::spawn(agent.run(inbox, stop_rx, poll_interval));
        log::info!("page agent attached to {tab}");

        Ok(PageAgentHandle {
            tab,
            events,
            snapshots: snapshot_rx,
            stop_tx: Some(stop_tx),
            task,
        })
    }

    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<AgentEvent>,
        mut stop_rx: oneshot::Receiver<()>,
        poll_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    self.check_url();
                }
                event = inbox.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
            self.publish();
        }
        self.close_overlay();
        self.publish();
        log::info!("page agent detached from {}", self.tab);
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(self.session.snapshot(self.settled));
    }

    fn handle(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Message(value) => match AgentMessage::decode(value) {
                Ok(message) => self.on_message(message),
                Err(e) => log::warn!("{}: ignoring message: {e}", self.tab),
            },
            AgentEvent::Click(target) => self.on_click(target),
            AgentEvent::LookupSettled {
                key,
                generation,
                reply,
            } => self.on_lookup_settled(&key, generation, reply),
            AgentEvent::CredentialsSaved { creds, reply } => {
                self.on_credentials_saved(creds, reply);
            }
        }
    }

    fn on_message(&mut self, message: AgentMessage) {
        match message {
            AgentMessage::ToggleNativePopup { host, user, pass, .. } => {
                log::debug!("{}: toggle overlay", self.tab);
                self.session.set_credentials(Credentials { host, user, pass });
                self.toggle_overlay(self.session.next_overlay());
            }
            AgentMessage::ActiveTabChange => {
                self.close_overlay();
                self.recheck();
            }
            AgentMessage::SetLastGerritResponse {
                status,
                jira_key,
                request_id,
            } => {
                if !self
                    .session
                    .store_last_response(status, jira_key.as_deref(), request_id)
                {
                    log::debug!(
                        "{}: dropping status {status} for {jira_key:?} (request {request_id:?})",
                        self.tab
                    );
                }
            }
            AgentMessage::PurgeLocalChanges => self.session.purge_changes(),
        }
    }

    /// Returns true when the URL moved since the last look.
    fn check_url(&mut self) -> bool {
        let href = self.location.href();
        if !self.session.observe_url(&href) {
            return false;
        }
        log::info!("{}: url changed to {href}", self.tab);
        self.session.clear();
        self.report_badge(0);
        self.close_overlay();
        self.detect_and_fetch();
        true
    }

    /// Re-run detection, unless the URL check just did it.
    fn recheck(&mut self) {
        if !self.check_url() {
            self.detect_and_fetch();
        }
    }

    fn detect_and_fetch(&mut self) {
        let Some(key) = detect::tracker_key(self.session.current_url()) else {
            log::debug!("{}: no issue key in url", self.tab);
            return;
        };
        let generation = self.session.begin_lookup(key.clone());
        log::info!("{}: looking up {key} (generation {generation})", self.tab);

        let coordinator = self.coordinator.clone();
        let events = self.events.clone();
        let tab = self.tab;
        tokio::spawn(async move {
            let request = CoordinatorRequest::TryGetChangesByJiraKey {
                jira_key: key.clone(),
                request_id: Some(generation),
            };
            let reply = coordinator.request(tab, &request).await;
            let _ = events.send(AgentEvent::LookupSettled {
                key,
                generation,
                reply,
            });
        });
    }

    fn on_lookup_settled(&mut self, key: &str, generation: u64, reply: Result<Reply, String>) {
        self.settled += 1;
        let changes = match reply {
            Ok(Reply::Changes(changes)) => changes,
            Ok(other) => {
                log::warn!("{}: unexpected reply to lookup of {key}: {other:?}", self.tab);
                return;
            }
            Err(e) => {
                log::warn!("{}: lookup of {key} failed: {e}", self.tab);
                return;
            }
        };
        if !self.session.store_changes(key, generation, changes) {
            log::debug!("{}: discarding stale reply for {key} (generation {generation})", self.tab);
            return;
        }
        // An unconfigured lookup has no status and keeps the "?" badge.
        if self.session.last_response_status().is_some() {
            self.report_badge(self.session.fetched_changes().len());
        }
    }

    fn report_badge(&self, value: usize) {
        if let Err(e) = self
            .coordinator
            .notify(self.tab, &CoordinatorRequest::SetListBadge { value })
        {
            log::warn!("{}: {e}", self.tab);
        }
    }

    fn on_click(&mut self, target: ClickTarget) {
        if !self.session.overlay().is_open() {
            return;
        }
        match target {
            ClickTarget::Inside => {}
            ClickTarget::Outside | ClickTarget::CloseButton => self.close_overlay(),
            ClickTarget::SettingsGear => {
                self.close_overlay();
                self.toggle_overlay(OverlayState::Settings);
            }
            ClickTarget::Save(creds) => {
                if self.session.overlay() != OverlayState::Settings {
                    return;
                }
                self.close_overlay();
                self.save_credentials(creds);
            }
        }
    }

    fn save_credentials(&self, creds: Credentials) {
        let coordinator = self.coordinator.clone();
        let events = self.events.clone();
        let tab = self.tab;
        tokio::spawn(async move {
            let request = CoordinatorRequest::SetGerritHost {
                host: creds.host.clone(),
                user: creds.user.clone(),
                pass: creds.pass.clone(),
            };
            let reply = coordinator.request(tab, &request).await;
            let _ = events.send(AgentEvent::CredentialsSaved { creds, reply });
        });
    }

    fn on_credentials_saved(&mut self, creds: Credentials, reply: Result<Reply, String>) {
        match reply {
            Ok(Reply::Done) => self.session.set_credentials(creds),
            Ok(other) => log::warn!("{}: saving settings failed: {other:?}", self.tab),
            Err(e) => log::warn!("{}: saving settings failed: {e}", self.tab),
        }
        self.recheck();
    }

    /// Mount the view for `target`, or close the overlay if one is shown.
    fn toggle_overlay(&mut self, target: OverlayState) {
        if self.session.overlay().is_open() {
            self.close_overlay();
            return;
        }
        let Some(view) = self.session.view_for(target) else {
            return;
        };
        self.surface.mount(&view);
        self.session.set_overlay(target);
    }

    fn close_overlay(&mut self) {
        if self.session.overlay().is_open() {
            self.surface.unmount();
            self.session.set_overlay(OverlayState::Closed);
        }
    }
}

impl PageAgentHandle {
    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn click(&self, target: ClickTarget) -> Result<(), String> {
        self.events
            .send(AgentEvent::Click(target))
            .map_err(|_| format!("Page agent for {} is not running", self.tab))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait until the published session satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, String> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(predicate)
            .await
            .map_err(|e| format!("Page agent for {} stopped: {e}", self.tab))?;
        Ok(snapshot.clone())
    }

    /// Stop the URL watch, close any overlay and wait for the task to end.
    pub async fn detach(mut self, router: &TabRouter) -> Result<(), String> {
        router.unregister(self.tab);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let tab = self.tab;
        self.task
            .await
            .map_err(|e| format!("Page agent task for {tab} failed: {e}"))
    }
}
