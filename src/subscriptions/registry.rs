//! Subscription registry and non-blocking announcement fan-out.

use crate::types::Announcement;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use tracing::trace;

use super::types::SubscriptionId;

/// Registry-side half of a subscription.
struct Entry {
    id: SubscriptionId,
    sender: Sender<Arc<Announcement>>,
}

impl Entry {
    /// Try to enqueue without blocking. Returns false if the announcement was dropped.
    fn try_send(&self, announcement: &Arc<Announcement>) -> bool {
        match self.sender.try_send(Arc::clone(announcement)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(subscription = %self.id, "inbox full, dropping announcement");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!(subscription = %self.id, "inbox disconnected, dropping announcement");
                false
            }
        }
    }
}

/// Outcome of a single broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Inboxes that accepted the announcement.
    pub delivered: usize,
    /// Inboxes that were full (or gone) and skipped it.
    pub dropped: usize,
}

/// The set of live subscriptions.
///
/// Not internally synchronized: the service guards it with the same lock as
/// the cue history so that building an announcement and fanning it out are
/// atomic with respect to subscribe, cancel and trigger.
pub struct SubscriptionRegistry {
    entries: Vec<Entry>,
    /// Counter for generating subscription IDs.
    next_id: u64,
    /// Bounded inbox size for new subscriptions.
    capacity: usize,
}

impl SubscriptionRegistry {
    /// Create a registry whose inboxes hold at most `capacity` announcements.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            capacity: capacity.max(1),
        }
    }

    /// Open a new inbox and register it.
    ///
    /// The registry keeps the sending half; the receiving half belongs to
    /// the consumer.
    pub fn add(&mut self) -> (SubscriptionId, Receiver<Arc<Announcement>>) {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (sender, receiver) = bounded(self.capacity);
        self.entries.push(Entry { id, sender });

        (id, receiver)
    }

    /// Remove a subscription by identity.
    ///
    /// Dropping the sender closes the inbox: the consumer drains whatever was
    /// already queued and then sees a disconnect. Unknown ids are a no-op.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(i) => {
                self.entries.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Offer `announcement` to every inbox without blocking.
    ///
    /// A full inbox silently skips this announcement; the next one it accepts
    /// carries the complete state anyway.
    pub fn broadcast(&self, announcement: &Arc<Announcement>) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        for entry in &self.entries {
            if entry.try_send(announcement) {
                outcome.delivered += 1;
            } else {
                outcome.dropped += 1;
            }
        }
        outcome
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
