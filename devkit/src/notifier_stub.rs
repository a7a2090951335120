/*!
Notifier d'enregistrement pour tests sans client WebSocket

Remplace le BroadcastNotifier là où seul le nombre d'annonces compte.
*/

use netdash_kernel::notify::Notifier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    published: Arc<AtomicUsize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nombre d'annonces depuis la création (ou le dernier clear)
    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.published.store(0, Ordering::SeqCst);
    }
}

impl Notifier for RecordingNotifier {
    fn publish_change(&self) {
        self.published.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("📤 [STUB] change published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_clears() {
        let notifier = RecordingNotifier::new();
        let shared = notifier.clone();

        notifier.publish_change();
        shared.publish_change();
        assert_eq!(notifier.published(), 2);

        notifier.clear();
        assert_eq!(shared.published(), 0);
    }
}
