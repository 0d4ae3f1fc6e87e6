//! Subscription handle and identifiers.

use crate::types::Announcement;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something a subscription can deregister itself from.
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: SubscriptionId);
}

/// A consumer's inbox of announcements.
///
/// The handle is owned by the consumer, which is responsible for canceling
/// it. Dropping the handle cancels it as well. The service only keeps the
/// sending half, and only a weak reference flows back, so there is no cycle.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    receiver: Receiver<Arc<Announcement>>,
    canceled: AtomicBool,
    owner: Weak<dyn Unsubscribe>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: SubscriptionId,
        receiver: Receiver<Arc<Announcement>>,
        owner: Weak<dyn Unsubscribe>,
    ) -> Self {
        Self {
            id,
            receiver,
            canceled: AtomicBool::new(false),
            owner,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next announcement (blocking).
    ///
    /// Fails once the subscription is canceled and its inbox drained.
    pub fn recv(&self) -> Result<Arc<Announcement>, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an announcement (non-blocking).
    pub fn try_recv(&self) -> Result<Arc<Announcement>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Arc<Announcement>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Blocking iterator over announcements, ending after cancellation.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, Arc<Announcement>> {
        self.receiver.iter()
    }

    /// Number of announcements waiting in the inbox.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Cancel the subscription and remove it from the service.
    ///
    /// Idempotent and safe to call from several threads at once. Whatever
    /// was already queued remains readable; nothing further is delivered.
    pub fn cancel(&self) {
        if self.canceled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.unsubscribe(self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("canceled", &self.is_canceled())
            .field("pending", &self.pending())
            .finish()
    }
}
