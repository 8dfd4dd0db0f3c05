use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::agent::{OverlaySurface, PageAgent, PageAgentHandle, PageLocation};
use crate::coordinator::{BadgeSurface, Coordinator, CoordinatorHandle};
use crate::gerrit::ChangeSource;
use crate::models::{TabBadge, TabId};
use crate::router::TabRouter;
use crate::settings_db::SettingsDb;

/// A running extension: one coordinator plus the page agents of open tabs.
/// Must be created inside a tokio runtime.
pub struct Extension {
    coordinator: Coordinator,
    handle: CoordinatorHandle,
    coordinator_task: JoinHandle<()>,
    router: TabRouter,
    agents: HashMap<TabId, PageAgentHandle>,
    poll_interval: Duration,
}

impl Extension {
    pub fn start(
        settings: SettingsDb,
        source: Arc<dyn ChangeSource>,
        badges: Arc<dyn BadgeSurface>,
        poll_interval: Duration,
    ) -> Self {
        let router = TabRouter::default();
        let coordinator = Coordinator::new(settings, source, router.clone(), badges);
        let (handle, coordinator_task) = coordinator.clone().spawn();
        Self {
            coordinator,
            handle,
            coordinator_task,
            router,
            agents: HashMap::new(),
            poll_interval,
        }
    }

    /// Inject a page agent into `tab`.
    pub fn open_tab(
        &mut self,
        tab: TabId,
        location: Arc<dyn PageLocation>,
        surface: Arc<dyn OverlaySurface>,
    ) -> Result<&PageAgentHandle, String> {
        if self.agents.contains_key(&tab) {
            return Err(format!("{tab} is already open"));
        }
        let agent = PageAgent::attach(
            tab,
            self.handle.clone(),
            &self.router,
            location,
            surface,
            self.poll_interval,
        )?;
        Ok(self.agents.entry(tab).or_insert(agent))
    }

    pub fn tab(&self, tab: TabId) -> Option<&PageAgentHandle> {
        self.agents.get(&tab)
    }

    pub fn activate_tab(&self, tab: TabId) -> Result<(), String> {
        self.handle.tab_activated(tab)
    }

    pub fn click_icon(&self, tab: TabId) -> Result<(), String> {
        self.handle.icon_activated(tab)
    }

    pub fn badge(&self, tab: TabId) -> Option<TabBadge> {
        self.coordinator.badge(tab)
    }

    pub async fn close_tab(&mut self, tab: TabId) -> Result<(), String> {
        let agent = self
            .agents
            .remove(&tab)
            .ok_or_else(|| format!("{tab} is not open"))?;
        agent.detach(&self.router).await?;
        self.handle.tab_removed(tab)
    }

    /// Detach every agent, then stop the coordinator.
    pub async fn shutdown(mut self) -> Result<(), String> {
        let router = self.router.clone();
        let results = futures::future::join_all(
            self.agents
                .drain()
                .map(|(_, agent)| agent.detach(&router)),
        )
        .await;
        for result in results {
            if let Err(e) = result {
                log::warn!("{e}");
            }
        }
        self.handle.shutdown()?;
        self.coordinator_task
            .await
            .map_err(|e| format!("Coordinator task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ClickTarget;
    use crate::models::{BadgeColor, Credentials, OverlayState};
    use crate::overlay::OverlayView;
    use crate::test_support::{
        change, location, ok, RecordingBadges, RecordingSurface, StubSource,
    };

    const WAIT: Duration = Duration::from_secs(5);

    fn extension(source: Arc<StubSource>) -> (Extension, SettingsDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsDb::init(dir.path()).unwrap();
        let ext = Extension::start(
            settings.clone(),
            source,
            Arc::new(RecordingBadges::default()),
            Duration::from_millis(10),
        );
        (ext, settings, dir)
    }

    #[tokio::test]
    async fn test_two_tabs_keep_separate_sessions() {
        let source = Arc::new(StubSource::default());
        source.respond("ABC-123", ok(vec![change(1), change(2)]));
        source.respond("DEF-4", ok(vec![change(3)]));
        let (mut ext, settings, _dir) = extension(source);
        settings
            .save_credentials(&Credentials::new("https://g.example", "", ""))
            .unwrap();

        let surface_a = Arc::new(RecordingSurface::default());
        let surface_b = Arc::new(RecordingSurface::default());
        ext.open_tab(TabId(1), location("https://jira.example/browse/ABC-123"), surface_a.clone())
            .unwrap();
        ext.open_tab(TabId(2), location("https://jira.example/browse/DEF-4"), surface_b.clone())
            .unwrap();

        for (tab, expected) in [(TabId(1), 2), (TabId(2), 1)] {
            let snapshot = tokio::time::timeout(
                WAIT,
                ext.tab(tab).unwrap().wait_for(|s| s.settled >= 1),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(snapshot.change_count, expected);
        }

        ext.click_icon(TabId(1)).unwrap();
        tokio::time::timeout(
            WAIT,
            ext.tab(TabId(1))
                .unwrap()
                .wait_for(|s| s.overlay == OverlayState::List),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(matches!(surface_a.mounted(), Some(OverlayView::List { rows, .. }) if rows.len() == 2));
        assert_eq!(surface_b.mounted(), None);

        // Switching to tab 2 closes the overlay left open in tab 1.
        ext.activate_tab(TabId(1)).unwrap();
        ext.activate_tab(TabId(2)).unwrap();
        tokio::time::timeout(
            WAIT,
            ext.tab(TabId(1))
                .unwrap()
                .wait_for(|s| s.overlay == OverlayState::Closed),
        )
        .await
        .unwrap()
        .unwrap();

        tokio::time::timeout(WAIT, async {
            while ext.badge(TabId(2)).map(|b| b.text) != Some("1".to_string()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("tab 2 badge shows its count");
        assert_eq!(ext.badge(TabId(2)).unwrap().color, BadgeColor::List);

        ext.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_settings_flow_from_fresh_install() {
        let source = Arc::new(StubSource::default());
        source.respond("ABC-123", ok(vec![change(1), change(2)]));
        let (mut ext, settings, _dir) = extension(source.clone());
        let surface = Arc::new(RecordingSurface::default());
        ext.open_tab(TabId(7), location("https://jira.example/browse/ABC-123"), surface.clone())
            .unwrap();
        let agent = ext.tab(TabId(7)).unwrap();
        tokio::time::timeout(WAIT, agent.wait_for(|s| s.settled >= 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ext.badge(TabId(7)).unwrap().text, "?");

        ext.click_icon(TabId(7)).unwrap();
        tokio::time::timeout(WAIT, agent.wait_for(|s| s.overlay == OverlayState::Settings))
            .await
            .unwrap()
            .unwrap();
        agent
            .click(ClickTarget::Save(Credentials::new("https://g.example", "alice", "pw")))
            .unwrap();
        let snapshot = tokio::time::timeout(WAIT, agent.wait_for(|s| s.settled >= 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.change_count, 2);
        assert_eq!(settings.load_credentials().unwrap().user, "alice");

        ext.click_icon(TabId(7)).unwrap();
        tokio::time::timeout(WAIT, agent.wait_for(|s| s.overlay == OverlayState::List))
            .await
            .unwrap()
            .unwrap();

        ext.close_tab(TabId(7)).await.unwrap();
        assert!(ext.tab(TabId(7)).is_none());
        tokio::time::timeout(WAIT, async {
            while ext.badge(TabId(7)).is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("closed tab forgets its badge");
        ext.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_tab_twice_fails() {
        let (mut ext, _settings, _dir) = extension(Arc::new(StubSource::default()));
        let surface = Arc::new(RecordingSurface::default());
        ext.open_tab(TabId(1), location("https://jira.example/"), surface.clone())
            .unwrap();
        assert!(ext
            .open_tab(TabId(1), location("https://jira.example/"), surface)
            .is_err());
        ext.shutdown().await.unwrap();
    }
}
