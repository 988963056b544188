//! Change notification fan-out.

use cartosync_model::{ClientId, DocumentId, Version};
use cartosync_protocol::Poke;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Fans pokes out to subscribed clients.
///
/// Delivery is best effort over unbounded channels; a dropped receiver
/// is pruned on the next send. The hub never blocks a push on a slow
/// subscriber.
#[derive(Default)]
pub struct PokeHub {
    subscribers: Mutex<HashMap<DocumentId, Vec<Subscriber>>>,
}

struct Subscriber {
    client_id: ClientId,
    sender: mpsc::UnboundedSender<Poke>,
}

impl PokeHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a client to pokes for a document.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(
        &self,
        document_id: DocumentId,
        client_id: ClientId,
    ) -> mpsc::UnboundedReceiver<Poke> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .entry(document_id)
            .or_default()
            .push(Subscriber { client_id, sender });
        receiver
    }

    /// Pokes every subscriber of `document_id` except the originator.
    ///
    /// The originator learns the outcome from its push response; a
    /// poke would only trigger a redundant pull.
    pub fn poke(&self, document_id: DocumentId, version: Version, originator: ClientId) {
        let mut subscribers = self.subscribers.lock();
        let Some(entries) = subscribers.get_mut(&document_id) else {
            return;
        };
        let poke = Poke {
            document_id,
            version: Some(version),
        };
        entries.retain(|s| s.client_id == originator || s.sender.send(poke).is_ok());
    }

    /// Returns the number of live subscribers for a document.
    #[must_use]
    pub fn subscriber_count(&self, document_id: DocumentId) -> usize {
        self.subscribers
            .lock()
            .get(&document_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poke_skips_originator() {
        let hub = PokeHub::new();
        let document_id = DocumentId::new();
        let (author, observer) = (ClientId::new(), ClientId::new());

        let mut author_rx = hub.subscribe(document_id, author);
        let mut observer_rx = hub.subscribe(document_id, observer);

        hub.poke(document_id, Version::new(3), author);

        let poke = observer_rx.try_recv().unwrap();
        assert_eq!(poke.document_id, document_id);
        assert_eq!(poke.version, Some(Version::new(3)));
        assert!(author_rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_pruned() {
        let hub = PokeHub::new();
        let document_id = DocumentId::new();
        let observer = ClientId::new();

        let rx = hub.subscribe(document_id, observer);
        assert_eq!(hub.subscriber_count(document_id), 1);

        drop(rx);
        hub.poke(document_id, Version::new(1), ClientId::new());
        assert_eq!(hub.subscriber_count(document_id), 0);
    }

    #[test]
    fn poke_for_unknown_document_is_quiet() {
        let hub = PokeHub::new();
        hub.poke(DocumentId::new(), Version::new(1), ClientId::new());
    }
}
