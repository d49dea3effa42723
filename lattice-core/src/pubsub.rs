//! In-process topic hub used for signal-driven FaaS continuations.
//!
//! Subscription bookkeeping is guarded by a single lock. Delivery fans out
//! per subscriber with non-blocking sends and an overflow-drop policy; a
//! publisher-requested blocking mode waits for every subscriber instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

/// A topic-tagged payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<T> {
    pub topic: String,
    pub payload: T,
}

/// Per-subscriber buffer capacity.
const SUBSCRIBER_BUFFER: usize = 16;

pub struct Subscriber<T> {
    id: u64,
    rx: mpsc::Receiver<Message<T>>,
}

impl<T> Subscriber<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receives the next message; `None` once the hub side is gone.
    pub async fn recv(&mut self) -> Option<Message<T>> {
        self.rx.recv().await
    }
}

struct SubscriberState<T> {
    tx: mpsc::Sender<Message<T>>,
    topics: Vec<String>,
}

struct HubState<T> {
    // topic -> subscriber ids
    subscriptions: HashMap<String, Vec<u64>>,
    subscribers: HashMap<u64, SubscriberState<T>>,
}

pub struct PubSub<T> {
    state: Mutex<HubState<T>>,
    next_id: AtomicU64,
}

impl<T: Clone + Send + 'static> Default for PubSub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> PubSub<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState {
                subscriptions: HashMap::new(),
                subscribers: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a subscriber for the given topics.
    pub fn subscribe(&self, topics: &[String]) -> Subscriber<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        let mut state = self.state.lock().expect("pubsub lock poisoned");
        state.subscribers.insert(
            id,
            SubscriberState {
                tx,
                topics: topics.to_vec(),
            },
        );
        for topic in topics {
            state
                .subscriptions
                .entry(topic.clone())
                .or_default()
                .push(id);
        }

        Subscriber { id, rx }
    }

    /// Removes a subscriber from every topic it was registered on.
    pub fn unsubscribe(&self, subscriber_id: u64) {
        let mut state = self.state.lock().expect("pubsub lock poisoned");

        let Some(subscriber) = state.subscribers.remove(&subscriber_id) else {
            return;
        };

        for topic in subscriber.topics {
            if let Some(ids) = state.subscriptions.get_mut(&topic) {
                ids.retain(|id| *id != subscriber_id);
                if ids.is_empty() {
                    state.subscriptions.remove(&topic);
                }
            }
        }
    }

    /// Publishes messages, returning the number of subscribers addressed.
    ///
    /// Non-blocking mode drops a message for any subscriber whose buffer is
    /// full; blocking mode awaits every delivery.
    pub async fn publish(&self, blocking: bool, messages: Vec<Message<T>>) -> usize {
        let mut addressed = 0;
        let mut pending = Vec::new();

        {
            let state = self.state.lock().expect("pubsub lock poisoned");

            for message in messages {
                let Some(ids) = state.subscriptions.get(&message.topic) else {
                    continue;
                };
                addressed += ids.len();

                for id in ids {
                    let Some(subscriber) = state.subscribers.get(id) else {
                        continue;
                    };
                    if blocking {
                        pending.push((subscriber.tx.clone(), message.clone()));
                    } else {
                        let _ = subscriber.tx.try_send(message.clone());
                    }
                }
            }
        }

        for (tx, message) in pending {
            let _ = tx.send(message).await;
        }

        addressed
    }
}
