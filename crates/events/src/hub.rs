//! In-memory versioned fan-out hub.

use std::sync::{Mutex, mpsc};

use thiserror::Error;
use tracing::{debug, warn};

use crate::bus::{EventBus, Subscription, SubscriptionHandle, Versioned};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Publish failed due to internal lock poisoning.
    #[error("subscription hub lock poisoned")]
    Poisoned,

    /// The message is not newer than what the hub already published.
    #[error("stale publish: version {published} is not newer than {latest}")]
    Stale { latest: u64, published: u64 },
}

#[derive(Debug)]
struct Subscriber<M> {
    handle: SubscriptionHandle,
    sender: mpsc::Sender<M>,
    last_version: Option<u64>,
}

impl<M> Subscriber<M>
where
    M: Versioned + Clone,
{
    /// Returns `false` once the receiving side is gone.
    fn deliver(&mut self, message: &M) -> bool {
        let version = message.version();
        if self.last_version.is_some_and(|last| version <= last) {
            return true;
        }
        if self.sender.send(message.clone()).is_err() {
            return false;
        }
        self.last_version = Some(version);
        true
    }
}

#[derive(Debug)]
struct HubState<M> {
    latest: Option<M>,
    next_handle: u64,
    subscribers: Vec<Subscriber<M>>,
}

/// In-memory pub/sub hub for versioned snapshots.
///
/// - Late subscribers immediately receive the latest published message.
/// - Each subscriber sees strictly increasing versions (no duplicates, no reordering).
/// - Channels are unbounded: `publish` only enqueues, so a stalled subscriber never
///   delays the publisher or other subscribers.
/// - Subscribers whose `Subscription` was dropped are pruned on publish.
#[derive(Debug)]
pub struct SubscriptionHub<M> {
    state: Mutex<HubState<M>>,
}

impl<M> SubscriptionHub<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live registrations (pruning happens on publish).
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().map(|s| s.subscribers.len()).unwrap_or(0)
    }
}

impl<M> SubscriptionHub<M>
where
    M: Versioned + Clone,
{
    /// Hub pre-seeded with an initial message for early subscribers.
    pub fn with_initial(initial: M) -> Self {
        Self {
            state: Mutex::new(HubState {
                latest: Some(initial),
                next_handle: 1,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Most recently published message.
    pub fn latest(&self) -> Option<M> {
        self.state.lock().ok().and_then(|s| s.latest.clone())
    }
}

impl<M> Default for SubscriptionHub<M> {
    fn default() -> Self {
        Self {
            state: Mutex::new(HubState {
                latest: None,
                next_handle: 1,
                subscribers: Vec::new(),
            }),
        }
    }
}

impl<M> EventBus<M> for SubscriptionHub<M>
where
    M: Versioned + Clone + Send + 'static,
{
    type Error = HubError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut state = self.state.lock().map_err(|_| HubError::Poisoned)?;

        let published = message.version();
        if let Some(latest) = state.latest.as_ref().map(Versioned::version) {
            if published <= latest {
                return Err(HubError::Stale { latest, published });
            }
        }

        let before = state.subscribers.len();
        state.subscribers.retain_mut(|sub| sub.deliver(&message));
        let pruned = before - state.subscribers.len();
        if pruned > 0 {
            debug!(pruned, version = published, "dropped closed subscriptions");
        }

        state.latest = Some(message);
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                // The sender is dropped here, so the caller sees a disconnected stream.
                warn!("subscribe on poisoned hub; returning a closed subscription");
                return Subscription::new(SubscriptionHandle::new(0), rx);
            }
        };

        let handle = SubscriptionHandle::new(state.next_handle);
        state.next_handle += 1;

        let mut subscriber = Subscriber {
            handle,
            sender: tx,
            last_version: None,
        };
        if let Some(latest) = state.latest.clone() {
            // The receiver is alive in this scope, so delivery cannot fail.
            subscriber.deliver(&latest);
        }
        state.subscribers.push(subscriber);

        debug!(%handle, "subscriber registered");
        Subscription::new(handle, rx)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let before = state.subscribers.len();
        state.subscribers.retain(|sub| sub.handle != handle);
        let removed = state.subscribers.len() != before;
        if removed {
            debug!(%handle, "subscriber removed");
        }
        removed
    }
}
