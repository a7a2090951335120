use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacité d'annonce "quelque chose a changé". Ne bloque jamais et
/// n'échoue jamais côté appelant : les clients refont un fetch complet.
pub trait Notifier: Send + Sync {
    fn publish_change(&self);
}

/// Marqueur de changement, sans charge utile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Update,
}

impl ChangeEvent {
    pub fn to_json(self) -> String {
        serde_json::to_string(&self).unwrap_or_else(|_| r#"{"type":"update"}"#.to_string())
    }
}

const CHANNEL_CAPACITY: usize = 64;

/// Fan-out via tokio::sync::broadcast. Un abonné trop lent perd des
/// événements (Lagged) au lieu de ralentir les émetteurs.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish_change(&self) {
        // Err = aucun abonné, rien à faire
        match self.tx.send(ChangeEvent::Update) {
            Ok(n) => debug!(subscribers = n, "change published"),
            Err(_) => debug!("change published, no subscribers"),
        }
    }
}
