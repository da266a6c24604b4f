//! Holding area for remote candidates that arrive before a transport session
//! exists for their call.

use crate::types::call::{CallCandidate, CallId};
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default bound on queued candidates across all calls.
pub const DEFAULT_PENDING_CAPACITY: usize = 128;

/// Output of [`PendingCandidates::drain_for`].
#[derive(Debug, Default)]
pub struct DrainedCandidates {
    /// Candidates of the requested call, in arrival order.
    pub matched: Vec<CallCandidate>,
    /// How many candidates of other calls were thrown away.
    pub discarded: usize,
}

#[derive(Debug)]
pub struct PendingCandidates {
    queue: Mutex<VecDeque<CallCandidate>>,
    capacity: usize,
}

impl Default for PendingCandidates {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PENDING_CAPACITY)
    }
}

impl PendingCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer holding at most `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a candidate. When full, the oldest entry is evicted.
    pub fn add(&self, candidate: CallCandidate) {
        debug!(
            target: "Call/Pending",
            "Queuing early candidate for call {}: {}",
            candidate.call_id, candidate.candidate.candidate
        );
        let mut queue = self
            .queue
            .lock()
            .expect("pending candidate lock should not be poisoned");
        if queue.len() >= self.capacity {
            if let Some(evicted) = queue.pop_front() {
                warn!(
                    target: "Call/Pending",
                    "Buffer full ({}), evicting oldest candidate for call {}",
                    self.capacity, evicted.call_id
                );
            }
        }
        queue.push_back(candidate);
    }

    /// Take every queued candidate of `call_id` and empty the buffer. Entries
    /// of any other call belong to a superseded attempt and are dropped.
    pub fn drain_for(&self, call_id: &CallId) -> DrainedCandidates {
        let queued = std::mem::take(
            &mut *self
                .queue
                .lock()
                .expect("pending candidate lock should not be poisoned"),
        );

        if queued.is_empty() {
            return DrainedCandidates::default();
        }

        let total = queued.len();
        let matched: Vec<CallCandidate> = queued
            .into_iter()
            .filter(|c| &c.call_id == call_id)
            .collect();
        let discarded = total - matched.len();

        if discarded > 0 {
            warn!(
                target: "Call/Pending",
                "Discarding {} queued candidates for calls other than {}",
                discarded, call_id
            );
        }
        debug!(
            target: "Call/Pending",
            "Drained {} queued candidates for call {}",
            matched.len(),
            call_id
        );

        DrainedCandidates { matched, discarded }
    }

    /// Drop everything. Returns how many entries were removed.
    pub fn clear(&self) -> usize {
        let mut queue = self
            .queue
            .lock()
            .expect("pending candidate lock should not be poisoned");
        let n = queue.len();
        queue.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .expect("pending candidate lock should not be poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
