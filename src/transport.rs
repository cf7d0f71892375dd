//! UART peripheral collaborator (out of scope per §1: "treated as byte
//! sink/byte source with RX interrupt"). The agent only needs a blocking
//! byte source it can read in chunks and a byte sink it can write whole
//! lines to, kept as independent read/write halves so the reader
//! ("ISR") context and the COMM/RUNNER writer context never contend for
//! the same lock on a read.

use std::io::{self, Read, Write};
use std::time::Duration;

pub type BoxedReader = Box<dyn Read + Send>;
pub type BoxedWriter = Box<dyn Write + Send>;

/// Opens a real serial port, split into independent read/write handles.
pub fn open_serial(
    path: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> io::Result<(BoxedReader, BoxedWriter)> {
    let port = serialport::new(path, baud_rate)
        .timeout(read_timeout)
        .open()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let writer = port
        .try_clone()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok((Box::new(port), Box::new(writer)))
}

/// In-memory duplex byte pipe used by tests to drive the agent without a
/// real serial port: writes from one end are readable from the other.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Condvar, Mutex};
    use std::time::{Duration, Instant};

    #[derive(Clone)]
    struct Pipe {
        buf: Arc<Mutex<VecDeque<u8>>>,
        cond: Arc<Condvar>,
    }

    impl Pipe {
        fn new() -> Self {
            Self {
                buf: Arc::new(Mutex::new(VecDeque::new())),
                cond: Arc::new(Condvar::new()),
            }
        }

        fn write_bytes(&self, data: &[u8]) {
            let mut guard = self.buf.lock().unwrap();
            guard.extend(data.iter().copied());
            self.cond.notify_all();
        }

        fn read_bytes(&self, out: &mut [u8], timeout: Duration) -> io::Result<usize> {
            let deadline = Instant::now() + timeout;
            let mut guard = self.buf.lock().unwrap();
            while guard.is_empty() {
                let now = Instant::now();
                if now >= deadline {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
                }
                let (g, _) = self.cond.wait_timeout(guard, deadline - now).unwrap();
                guard = g;
            }
            let n = out.len().min(guard.len());
            for slot in out.iter_mut().take(n) {
                *slot = guard.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    pub struct ReadHalf {
        side: Pipe,
        timeout: Duration,
    }

    impl Read for ReadHalf {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.side.read_bytes(buf, self.timeout)
        }
    }

    pub struct WriteHalf {
        side: Pipe,
    }

    impl Write for WriteHalf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.side.write_bytes(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// One end of an in-memory duplex byte pipe.
    pub struct DuplexEnd {
        read_side: Pipe,
        write_side: Pipe,
        read_timeout: Duration,
    }

    impl DuplexEnd {
        /// Creates a connected pair. `.0` is the "agent" end (what the
        /// firmware treats as its transport); `.1` is the "gateway" end
        /// (what the test drives).
        pub fn pair(read_timeout: Duration) -> (DuplexEnd, DuplexEnd) {
            let a = Pipe::new();
            let b = Pipe::new();
            (
                DuplexEnd {
                    read_side: a.clone(),
                    write_side: b.clone(),
                    read_timeout,
                },
                DuplexEnd {
                    read_side: b,
                    write_side: a,
                    read_timeout,
                },
            )
        }

        /// Splits into independent read/write halves, mirroring
        /// `try_clone()` on a real serial port.
        pub fn split(self) -> (ReadHalf, WriteHalf) {
            (
                ReadHalf {
                    side: self.read_side,
                    timeout: self.read_timeout,
                },
                WriteHalf {
                    side: self.write_side,
                },
            )
        }
    }

    impl Read for DuplexEnd {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.read_side.read_bytes(buf, self.read_timeout)
        }
    }

    impl Write for DuplexEnd {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.write_side.write_bytes(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
