//! Two-tier command queue with a single in-flight slot.
//!
//! The device has no command buffer, so exactly one command may be on the
//! wire at a time. [`CommandQueue`] enforces that itself: [`next_ready`]
//! hands out an entry only when the queue is running and nothing is in
//! flight, and the slot stays taken until [`complete`] is called.
//!
//! # Ordering
//!
//! - Entries are FIFO within a priority band.
//! - [`Priority::High`] entries run before any waiting [`Priority::Normal`]
//!   entry, but never pre-empt the one in flight.
//!
//! Only two levels ever occur (normal work and the pause/lift sequence), so
//! this is two FIFOs rather than a heap.
//!
//! ```rust
//! use rs_lineus::queue::{CommandQueue, Priority};
//!
//! let mut queue = CommandQueue::new();
//! queue.push("first", Priority::Normal);
//! queue.push("second", Priority::Normal);
//! queue.push("urgent", Priority::High);
//!
//! // Inert until started
//! assert!(queue.next_ready().is_none());
//!
//! queue.start();
//! assert_eq!(queue.next_ready().unwrap().item, "urgent");
//!
//! // One in flight at a time
//! assert!(queue.next_ready().is_none());
//! queue.complete();
//! assert_eq!(queue.next_ready().unwrap().item, "first");
//! ```
//!
//! [`next_ready`]: CommandQueue::next_ready
//! [`complete`]: CommandQueue::complete

use std::collections::VecDeque;

/// Priority band of a queued entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Regular work, FIFO.
    #[default]
    Normal,
    /// Jumps ahead of waiting normal work.
    High,
}

/// A queued unit of work.
#[derive(Debug)]
pub struct QueueEntry<T> {
    /// The work itself.
    pub item: T,
    /// Band it was queued in.
    pub priority: Priority,
    /// Monotonic submission counter.
    pub sequence: u64,
}

/// Strictly ordered queue that never has more than one entry in flight.
///
/// Starts paused: nothing is handed out until [`start`](Self::start).
#[derive(Debug)]
pub struct CommandQueue<T> {
    high: VecDeque<QueueEntry<T>>,
    normal: VecDeque<QueueEntry<T>>,
    next_sequence: u64,
    running: bool,
    in_flight: bool,
}

impl<T> CommandQueue<T> {
    /// Creates an empty, paused queue.
    pub fn new() -> Self {
        Self {
            high: VecDeque::new(),
            normal: VecDeque::new(),
            next_sequence: 0,
            running: false,
            in_flight: false,
        }
    }

    /// Queues an item. Returns its sequence number.
    pub fn push(&mut self, item: T, priority: Priority) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let entry = QueueEntry {
            item,
            priority,
            sequence,
        };
        match priority {
            Priority::High => self.high.push_back(entry),
            Priority::Normal => self.normal.push_back(entry),
        }
        sequence
    }

    /// Takes the next entry if the queue is running and the slot is free.
    ///
    /// The returned entry occupies the in-flight slot until
    /// [`complete`](Self::complete).
    pub fn next_ready(&mut self) -> Option<QueueEntry<T>> {
        if !self.running || self.in_flight {
            return None;
        }
        let entry = self.high.pop_front().or_else(|| self.normal.pop_front())?;
        self.in_flight = true;
        Some(entry)
    }

    /// Frees the in-flight slot.
    pub fn complete(&mut self) {
        self.in_flight = false;
    }

    /// Begins or resumes handing out entries.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stops handing out entries. The in-flight entry, if any, is
    /// unaffected and queued entries stay queued.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Discards every entry that has not started, in execution order.
    pub fn clear(&mut self) -> Vec<T> {
        self.high
            .drain(..)
            .chain(self.normal.drain(..))
            .map(|e| e.item)
            .collect()
    }

    /// Waiting items in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.high.iter().chain(self.normal.iter()).map(|e| &e.item)
    }

    /// True if entries are being handed out.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// True if an entry is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Number of waiting entries (excluding the one in flight).
    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    /// True if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<T>(q: &mut CommandQueue<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(entry) = q.next_ready() {
            out.push(entry.item);
            q.complete();
        }
        out
    }

    #[test]
    fn queue_new_is_empty_and_paused() {
        let q: CommandQueue<u8> = CommandQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
        assert!(!q.is_running());
        assert!(!q.is_busy());
    }

    #[test]
    fn queue_is_inert_until_started() {
        let mut q = CommandQueue::new();
        q.push(1, Priority::Normal);
        assert!(q.next_ready().is_none());
        q.start();
        assert_eq!(q.next_ready().unwrap().item, 1);
    }

    #[test]
    fn queue_fifo_within_band() {
        let mut q = CommandQueue::new();
        for i in 0..5 {
            q.push(i, Priority::Normal);
        }
        q.start();
        assert_eq!(drain(&mut q), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn queue_high_runs_before_waiting_normal() {
        let mut q = CommandQueue::new();
        q.push("n1", Priority::Normal);
        q.push("h1", Priority::High);
        q.push("n2", Priority::Normal);
        q.push("h2", Priority::High);
        q.start();
        assert_eq!(drain(&mut q), vec!["h1", "h2", "n1", "n2"]);
    }

    #[test]
    fn queue_high_does_not_preempt_in_flight() {
        let mut q = CommandQueue::new();
        q.push("n1", Priority::Normal);
        q.push("n2", Priority::Normal);
        q.start();

        let current = q.next_ready().unwrap();
        assert_eq!(current.item, "n1");

        q.push("h1", Priority::High);
        // slot still taken by n1
        assert!(q.next_ready().is_none());

        q.complete();
        assert_eq!(q.next_ready().unwrap().item, "h1");
        q.complete();
        assert_eq!(q.next_ready().unwrap().item, "n2");
    }

    #[test]
    fn queue_single_in_flight() {
        let mut q = CommandQueue::new();
        for i in 0..10 {
            q.push(i, Priority::Normal);
        }
        q.start();
        assert!(q.next_ready().is_some());
        assert!(q.is_busy());
        for _ in 0..10 {
            assert!(q.next_ready().is_none());
        }
    }

    #[test]
    fn queue_pause_keeps_entries() {
        let mut q = CommandQueue::new();
        q.push(1, Priority::Normal);
        q.push(2, Priority::Normal);
        q.start();

        let _first = q.next_ready().unwrap();
        q.pause();
        q.complete();
        assert!(q.next_ready().is_none());
        assert_eq!(q.len(), 1);

        q.start();
        assert_eq!(q.next_ready().unwrap().item, 2);
    }

    #[test]
    fn queue_clear_returns_waiting_in_order() {
        let mut q = CommandQueue::new();
        q.push("n1", Priority::Normal);
        q.push("h1", Priority::High);
        q.push("n2", Priority::Normal);
        q.start();

        let in_flight = q.next_ready().unwrap();
        assert_eq!(in_flight.item, "h1");

        let discarded = q.clear();
        assert_eq!(discarded, vec!["n1", "n2"]);
        assert!(q.is_empty());
        // in-flight slot is untouched
        assert!(q.is_busy());
    }

    #[test]
    fn queue_sequence_is_monotonic_across_bands() {
        let mut q = CommandQueue::new();
        let a = q.push((), Priority::Normal);
        let b = q.push((), Priority::High);
        let c = q.push((), Priority::Normal);
        assert!(a < b && b < c);

        q.start();
        let first = q.next_ready().unwrap();
        assert_eq!(first.sequence, b);
        assert_eq!(first.priority, Priority::High);
    }

    #[test]
    fn queue_iter_matches_execution_order() {
        let mut q = CommandQueue::new();
        q.push("n1", Priority::Normal);
        q.push("h1", Priority::High);
        q.push("n2", Priority::Normal);

        let waiting: Vec<_> = q.iter().copied().collect();
        assert_eq!(waiting, vec!["h1", "n1", "n2"]);
        // iterating does not consume
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn queue_default_is_empty() {
        let q: CommandQueue<u8> = CommandQueue::default();
        assert!(q.is_empty());
    }
}
