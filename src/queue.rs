//! Fixed-capacity line message queue posted to by the RX framer and
//! consumed by the COMM controller.
//!
//! The sender is the reader ("ISR") context and must never block: a full
//! queue drops the incoming message rather than stalling the byte
//! stream.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Capacity-256 null-terminated command line, posted atomically to the
/// line queue. Capacity matches the RX line accumulator (255 data bytes +
/// terminator).
pub const LINE_CAPACITY: usize = 256;

/// A complete, terminator-stripped command line.
pub type LineMessage = heapless::Vec<u8, LINE_CAPACITY>;

/// Capacity of the line queue (§3: "capacity 4").
pub const QUEUE_CAPACITY: usize = 4;

/// MPSC queue of complete command lines. Drops the incoming line when full.
pub struct LineQueue {
    inner: Mutex<VecDeque<LineMessage>>,
    not_empty: Condvar,
}

impl LineQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
            not_empty: Condvar::new(),
        }
    }

    /// Posts a line. Never blocks. If the queue is already at capacity,
    /// the incoming line is discarded and the already-buffered lines are
    /// left untouched, matching `k_msgq_put(..., K_NO_WAIT)` returning
    /// `-ENOMSG` without enqueueing on a full queue.
    pub fn push(&self, line: LineMessage) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() >= QUEUE_CAPACITY {
            return;
        }
        guard.push_back(line);
        self.not_empty.notify_one();
    }

    /// Blocks until a line is available, then returns it.
    pub fn pop_blocking(&self) -> LineMessage {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(line) = guard.pop_front() {
                return line;
            }
            guard = self
                .not_empty
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

impl Default for LineQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(tag: u8) -> LineMessage {
        let mut v = LineMessage::new();
        v.push(tag).unwrap();
        v
    }

    #[test]
    fn incoming_line_dropped_on_full_queue() {
        let q = LineQueue::new();
        for i in 0..5u8 {
            q.push(line(i));
        }
        // 5th push (tag 4) finds the queue full and is discarded; tags 0-3 remain.
        assert_eq!(q.len(), QUEUE_CAPACITY);
        for expected in 0..4u8 {
            assert_eq!(q.pop_blocking()[0], expected);
        }
    }

    #[test]
    fn fifo_order_preserved() {
        let q = LineQueue::new();
        q.push(line(10));
        q.push(line(20));
        assert_eq!(q.pop_blocking()[0], 10);
        assert_eq!(q.pop_blocking()[0], 20);
    }
}
