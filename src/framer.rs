//! C2: RX framer. The only "ISR-side" component, in this hosted
//! re-architecture, driven by a dedicated reader thread instead of a real
//! interrupt, but preserving the exact same hand-off discipline: state
//! mutations happen under a brief lock (standing in for interrupt masking),
//! and the reader never blocks on anything but the next batch of bytes.

use std::sync::{Arc, Mutex};

use crate::queue::{LineMessage, LineQueue};
use crate::semaphore::Semaphore;

/// Capacity of the line accumulator, reserving one slot for the conceptual
/// terminator the original C implementation null-terminates with. Rust
/// slices carry their own length, so no literal terminator byte is stored;
/// the reserved slot simply keeps the 255-byte usable-data limit intact.
pub const LINE_MAX_DATA: usize = crate::queue::LINE_CAPACITY - 1;

/// RX hand-off state: a tagged variant guarded by the framer's lock.
/// Transitions between variants happen only from the COMM thread (via
/// [`RxFramer::start_binary_reception`] / [`RxFramer::force_line_mode`]);
/// the reader thread only ever advances within whichever variant is
/// current.
enum RxState {
    Line(LineMessage),
    Binary {
        buf: Vec<u8>,
        expected: usize,
        received: usize,
    },
}

pub struct RxFramer {
    state: Mutex<RxState>,
    completed_binary: Mutex<Option<Vec<u8>>>,
    line_queue: Arc<LineQueue>,
    bin_sem: Arc<Semaphore>,
}

enum ByteOutcome {
    None,
    LineReady(LineMessage),
    BinaryComplete(Vec<u8>),
}

impl RxFramer {
    pub fn new(line_queue: Arc<LineQueue>, bin_sem: Arc<Semaphore>) -> Self {
        Self {
            state: Mutex::new(RxState::Line(LineMessage::new())),
            completed_binary: Mutex::new(None),
            line_queue,
            bin_sem,
        }
    }

    /// Feeds a batch of freshly read bytes into the framer. Called from the
    /// reader ("ISR") context; never blocks.
    pub fn process_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.process_byte(byte);
        }
    }

    fn process_byte(&self, byte: u8) {
        let outcome = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match &mut *state {
                RxState::Line(acc) => {
                    if byte == b'\n' || byte == b'\r' {
                        if acc.is_empty() {
                            // Isolated terminator at position 0: ignored.
                            ByteOutcome::None
                        } else {
                            let line = acc.clone();
                            acc.clear();
                            ByteOutcome::LineReady(line)
                        }
                    } else {
                        if acc.len() < LINE_MAX_DATA {
                            let _ = acc.push(byte);
                        }
                        // else: oversized line, tail byte silently dropped.
                        ByteOutcome::None
                    }
                }
                RxState::Binary {
                    buf,
                    expected,
                    received,
                } => {
                    if *received < *expected {
                        buf[*received] = byte;
                        *received += 1;
                        if *received == *expected {
                            ByteOutcome::BinaryComplete(std::mem::take(buf))
                        } else {
                            ByteOutcome::None
                        }
                    } else {
                        // Excess bytes mid-transition: discarded.
                        ByteOutcome::None
                    }
                }
            }
        };

        match outcome {
            ByteOutcome::None => {}
            ByteOutcome::LineReady(line) => self.line_queue.push(line),
            ByteOutcome::BinaryComplete(buf) => {
                {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    *state = RxState::Line(LineMessage::new());
                }
                *self
                    .completed_binary
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(buf);
                self.bin_sem.give();
            }
        }
    }

    /// Switches the framer into binary-payload mode expecting `expected`
    /// bytes, and resets the completion semaphore to 0. Called by COMM
    /// under its own critical section (§4.4 step 5); the lock here plays
    /// the role of interrupt masking.
    pub fn start_binary_reception(&self, expected: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = RxState::Binary {
            buf: vec![0u8; expected],
            expected,
            received: 0,
        };
        drop(state);
        self.bin_sem.reset();
    }

    /// Forces the framer back to line mode, discarding any partially
    /// received binary payload. Used on upload timeout.
    pub fn force_line_mode(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = RxState::Line(LineMessage::new());
    }

    /// Takes the most recently completed binary payload, if any.
    pub fn take_completed_binary(&self) -> Option<Vec<u8>> {
        self.completed_binary
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framer() -> RxFramer {
        RxFramer::new(Arc::new(LineQueue::new()), Arc::new(Semaphore::new(0)))
    }

    #[test]
    fn accumulates_line_and_posts_on_terminator() {
        let f = framer();
        f.process_bytes(b"STATUS\n");
        let line = f.line_queue.pop_blocking();
        assert_eq!(&line[..], b"STATUS");
    }

    #[test]
    fn carriage_return_also_terminates() {
        let f = framer();
        f.process_bytes(b"STATUS\r");
        let line = f.line_queue.pop_blocking();
        assert_eq!(&line[..], b"STATUS");
    }

    #[test]
    fn isolated_terminator_at_position_zero_is_ignored() {
        let f = framer();
        f.process_bytes(b"\n\nSTATUS\n");
        let line = f.line_queue.pop_blocking();
        assert_eq!(&line[..], b"STATUS");
        assert_eq!(f.line_queue.len(), 0);
    }

    #[test]
    fn oversized_line_is_truncated_not_lost() {
        let f = framer();
        let mut long_line = vec![b'A'; 400];
        long_line.push(b'\n');
        f.process_bytes(&long_line);
        let line = f.line_queue.pop_blocking();
        assert_eq!(line.len(), LINE_MAX_DATA);
    }

    #[test]
    fn binary_reception_completes_and_signals_semaphore() {
        let f = framer();
        f.start_binary_reception(4);
        f.process_bytes(&[1, 2, 3, 4]);
        assert!(f.bin_sem.take_timeout(std::time::Duration::from_millis(50)));
        let buf = f.take_completed_binary().unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }

    #[test]
    fn binary_mode_does_not_split_on_newline_bytes() {
        let f = framer();
        f.start_binary_reception(3);
        f.process_bytes(&[b'\n', b'\r', 0xFF]);
        assert!(f.bin_sem.take_timeout(std::time::Duration::from_millis(50)));
        let buf = f.take_completed_binary().unwrap();
        assert_eq!(buf, vec![b'\n', b'\r', 0xFF]);
    }

    #[test]
    fn excess_binary_bytes_after_completion_are_discarded() {
        let f = framer();
        f.start_binary_reception(2);
        f.process_bytes(&[1, 2, 3, 4]); // 2 extra bytes after completion
        let buf = f.take_completed_binary().unwrap();
        assert_eq!(buf, vec![1, 2]);
        // the 2 excess bytes land back in line mode and don't crash
        // anything; since neither is a terminator no line is posted yet.
        assert_eq!(f.line_queue.len(), 0);
    }

    #[test]
    fn force_line_mode_after_timeout_returns_to_line_parsing() {
        let f = framer();
        f.start_binary_reception(10);
        f.process_bytes(&[1, 2, 3]);
        f.force_line_mode();
        f.process_bytes(b"STATUS\n");
        let line = f.line_queue.pop_blocking();
        assert_eq!(&line[..], b"STATUS");
    }
}
