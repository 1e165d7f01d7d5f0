//! Deferred notification signals.
//!
//! An object fires a [`Signal`] from inside its update; the value is only
//! queued.  The service flushes every signal after the tick's update pass,
//! so subscriber code never runs inside arbitration and cannot re-enter it.
//!
//! ```text
//!   Actuator::update ──fire()──▶ pending (heapless::Deque)
//!                                        │
//!   AppService::tick (after updates) ──flush()──▶ subscribers + EventSink
//! ```

use core::fmt;

use heapless::{Deque, Vec};
use log::warn;

use crate::config::{MAX_SUBSCRIBERS, SIGNAL_QUEUE_CAP};

/// Identifies one subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u16);

type Callback<T> = Box<dyn FnMut(&T)>;

/// Fixed-capacity subscriber list with a queue of undelivered values.
pub struct Signal<T: Copy> {
    subscribers: Vec<(SubscriptionId, Callback<T>), MAX_SUBSCRIBERS>,
    pending: Deque<T, SIGNAL_QUEUE_CAP>,
    next_id: u16,
}

impl<T: Copy> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Signal<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            pending: Deque::new(),
            next_id: 0,
        }
    }

    /// Add a subscriber.  Returns `None` if the list is full.
    pub fn subscribe(&mut self, callback: impl FnMut(&T) + 'static) -> Option<SubscriptionId> {
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, Box::new(callback))).ok()?;
        self.next_id = self.next_id.wrapping_add(1);
        Some(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match self.subscribers.iter().position(|(sid, _)| *sid == id) {
            Some(i) => {
                drop(self.subscribers.swap_remove(i));
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Queue `value` for delivery on the next flush.  When the queue is
    /// full the oldest value is dropped.
    pub fn fire(&mut self, value: T) {
        if self.pending.is_full() {
            warn!("Signal: queue full, dropping oldest notification");
            self.pending.pop_front();
        }
        let _ = self.pending.push_back(value);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Deliver every queued value, in order, to all subscribers and to
    /// `forward`.  Returns the number of values delivered.
    pub fn flush(&mut self, mut forward: impl FnMut(&T)) -> usize {
        let mut delivered = 0;
        while let Some(value) = self.pending.pop_front() {
            for (_, callback) in self.subscribers.iter_mut() {
                callback(&value);
            }
            forward(&value);
            delivered += 1;
        }
        delivered
    }
}

impl<T: Copy> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscribers.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
