use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::agent::AgentEvent;
use crate::models::TabId;
use crate::protocol::{self, AgentMessage};

/// Delivers coordinator notifications to the page agent attached to a tab.
#[derive(Clone, Default)]
pub struct TabRouter {
    inboxes: Arc<Mutex<HashMap<TabId, mpsc::UnboundedSender<AgentEvent>>>>,
}

impl TabRouter {
    pub fn register(
        &self,
        tab: TabId,
        inbox: mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<(), String> {
        let mut inboxes = self
            .inboxes
            .lock()
            .map_err(|e| format!("Lock error: {e}"))?;
        if inboxes.get(&tab).is_some_and(|existing| !existing.is_closed()) {
            return Err(format!("A page agent is already attached to {tab}"));
        }
        inboxes.insert(tab, inbox);
        Ok(())
    }

    pub fn unregister(&self, tab: TabId) {
        match self.inboxes.lock() {
            Ok(mut inboxes) => {
                inboxes.remove(&tab);
            }
            Err(e) => log::error!("Lock error while detaching {tab}: {e}"),
        }
    }

    pub fn is_attached(&self, tab: TabId) -> bool {
        self.inboxes
            .lock()
            .map(|inboxes| inboxes.get(&tab).is_some_and(|inbox| !inbox.is_closed()))
            .unwrap_or(false)
    }

    /// Send `message` to the agent in `tab`. Returns false when nobody is
    /// listening there.
    pub fn send(&self, tab: TabId, message: &AgentMessage) -> bool {
        let inbox = match self.inboxes.lock() {
            Ok(inboxes) => inboxes.get(&tab).cloned(),
            Err(e) => {
                log::error!("Lock error while messaging {tab}: {e}");
                return false;
            }
        };
        let Some(inbox) = inbox else {
            log::debug!("no page agent in {tab}, dropping {message:?}");
            return false;
        };
        if inbox
            .send(AgentEvent::Message(protocol::encode(message)))
            .is_err()
        {
            log::debug!("page agent in {tab} is gone, dropping {message:?}");
            return false;
        }
        true
    }
}
