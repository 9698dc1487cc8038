//! Per-key change notification. Each watched key owns one broadcast channel,
//! created lazily on the first subscription and kept for the life of the
//! client; every later subscription to the same key is another receiver on
//! the same channel.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::ConfabError;

const CHANNEL_CAPACITY: usize = 16;

/// One notification on a watched key: either the freshly resolved value or
/// the error that replaced it.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Value(Value),
    Error(ConfabError),
}

/// Receiving end of a key watch. The current value at subscription time is
/// delivered as the first event, so observers never start blind.
pub struct Observer {
    key: String,
    initial: Option<WatchEvent>,
    rx: broadcast::Receiver<WatchEvent>,
}

impl Observer {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next event, or `None` once the client is gone. A slow observer that
    /// falls behind the channel skips to the most recent events rather than
    /// erroring out.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct WatchHub {
    channels: Mutex<HashMap<String, broadcast::Sender<WatchEvent>>>,
}

impl WatchHub {
    /// Subscribe to `key`, seeding the observer with `initial()`. Returns
    /// the observer and whether this key is being watched for the first time
    /// (the caller hooks up the provider-side watch exactly once).
    ///
    /// The initial value is computed while the hub lock is held and after
    /// the receiver exists, so a concurrent publish is either reflected in
    /// the initial event or delivered through the receiver, never lost.
    pub fn subscribe(
        &self,
        key: &str,
        initial: impl FnOnce() -> WatchEvent,
    ) -> (Observer, bool) {
        let mut channels = self.channels.lock();
        let (tx, first) = match channels.get(key) {
            Some(tx) => (tx.clone(), false),
            None => {
                let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
                channels.insert(key.to_string(), tx.clone());
                (tx, true)
            }
        };
        let rx = tx.subscribe();
        let observer = Observer {
            key: key.to_string(),
            initial: Some(initial()),
            rx,
        };
        (observer, first)
    }

    /// Fan an event out to every observer of `key`. No-op when nothing is
    /// watching.
    pub fn publish(&self, key: &str, event: WatchEvent) {
        if let Some(tx) = self.channels.lock().get(key) {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn initial_event_arrives_before_updates() {
        let hub = WatchHub::default();
        let (mut observer, first) = hub.subscribe("db.host", || WatchEvent::Value(json!("a")));
        assert!(first);
        hub.publish("db.host", WatchEvent::Value(json!("b")));

        match observer.next().await {
            Some(WatchEvent::Value(v)) => assert_eq!(v, json!("a")),
            other => panic!("expected initial value, got {other:?}"),
        }
        match observer.next().await {
            Some(WatchEvent::Value(v)) => assert_eq!(v, json!("b")),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_subscription_reuses_the_channel() {
        let hub = WatchHub::default();
        let (_first_observer, first) = hub.subscribe("k", || WatchEvent::Value(json!(1)));
        let (mut second_observer, second) = hub.subscribe("k", || WatchEvent::Value(json!(2)));
        assert!(first);
        assert!(!second);

        hub.publish("k", WatchEvent::Value(json!(3)));
        match second_observer.next().await {
            Some(WatchEvent::Value(v)) => assert_eq!(v, json!(2)),
            other => panic!("expected seeded value, got {other:?}"),
        }
        match second_observer.next().await {
            Some(WatchEvent::Value(v)) => assert_eq!(v, json!(3)),
            other => panic!("expected published value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_update_slips_between_seed_and_registration() {
        // the receiver exists before the initial value is computed, so an
        // update published right after subscribe returns is never dropped
        let hub = WatchHub::default();
        let (mut observer, _) = hub.subscribe("k", || {
            // the seed read sees the pre-publish state
            WatchEvent::Value(json!("stale"))
        });
        hub.publish("k", WatchEvent::Value(json!("fresh")));

        match observer.next().await {
            Some(WatchEvent::Value(v)) => assert_eq!(v, json!("stale")),
            other => panic!("expected seeded value, got {other:?}"),
        }
        match observer.next().await {
            Some(WatchEvent::Value(v)) => assert_eq!(v, json!("fresh")),
            other => panic!("expected follow-up, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_to_unwatched_key_is_a_noop() {
        let hub = WatchHub::default();
        hub.publish("nobody.cares", WatchEvent::Value(json!(0)));
    }

    #[tokio::test]
    async fn error_events_are_delivered() {
        let hub = WatchHub::default();
        let (mut observer, _) = hub.subscribe("k", || WatchEvent::Value(json!("ok")));
        observer.next().await;
        hub.publish(
            "k",
            WatchEvent::Error(ConfabError::KeyNotFound("k".into())),
        );
        match observer.next().await {
            Some(WatchEvent::Error(ConfabError::KeyNotFound(key))) => assert_eq!(key, "k"),
            other => panic!("expected error event, got {other:?}"),
        }
    }
}
