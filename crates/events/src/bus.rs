//! Publish/subscribe abstraction for versioned state notifications.
//!
//! Messages carry a monotonically increasing version. A bus built on this contract
//! delivers, per subscriber, strictly increasing versions: no duplicates and no
//! reordering. Gaps only appear if the publisher itself skips a version.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

/// A message that carries its position in a monotonically increasing sequence.
pub trait Versioned {
    fn version(&self) -> u64;
}

/// Opaque identifier of one registration with a bus.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl core::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A subscription to a message stream.
///
/// ## Usage Pattern
///
/// ```ignore
/// let subscription = bus.subscribe();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_secs(1)) {
///         Ok(snapshot) => render(snapshot),
///         Err(RecvTimeoutError::Timeout) => continue,       // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break,     // unsubscribed / bus gone
///     }
/// }
/// ```
///
/// Dropping the subscription closes its channel; the bus prunes it on the next
/// publish.
///
/// Subscriptions are designed for single-threaded consumption. Each subscription
/// should be used by one thread.
#[derive(Debug)]
pub struct Subscription<M> {
    handle: SubscriptionHandle,
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(handle: SubscriptionHandle, receiver: Receiver<M>) -> Self {
        Self { handle, receiver }
    }

    /// Handle to pass to `unsubscribe`.
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything already queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }

    /// Blocking iterator that ends when the subscription is disconnected.
    pub fn iter(&self) -> mpsc::Iter<'_, M> {
        self.receiver.iter()
    }
}

/// Pub/sub transport for versioned messages.
///
/// The trait requires `Send + Sync`: publishers and subscribers live on different
/// threads.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Hand a message to every current subscriber. Must not block on slow
    /// subscribers beyond enqueueing.
    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;

    /// Returns `false` when the handle was not (or no longer) registered.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        (**self).unsubscribe(handle)
    }
}
