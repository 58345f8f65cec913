use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events fanned out to observers (UI windows, CLI)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// A record finished syncing, remote data should be refetched
    RefreshObs,
    /// A record changed state locally, e.g. went to systemError
    RefreshLocalQueue,
}

/// Best-effort broadcast; having no subscribers is fine
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ClientMessage>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn notify(&self, msg: ClientMessage) {
        match self.tx.send(msg) {
            Ok(receivers) => log::debug!("Sent {:?} to {} observers", msg, receivers),
            Err(_) => log::debug!("No observers for {:?}", msg),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
