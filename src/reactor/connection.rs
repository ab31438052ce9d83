//! Per-connection state (§3 "Connection state", §4.I "Write path").

use std::time::Instant;

use crate::buf::GrowBuf;
use crate::transport::{Hint, Transport};

/// Cancellation intent for a connection (§5 "Cancellation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShouldClose {
    None,
    /// Close once the current response's last byte has been queued.
    Drain,
    /// Close as soon as the event loop next looks at this connection.
    Immediate,
}

pub struct Connection {
    pub transport: Box<dyn Transport>,
    pub in_buf: GrowBuf,
    pub out_buf: GrowBuf,
    pub waiting_writable: bool,
    pub should_close: ShouldClose,
    pub requests_served: u64,
    /// Set once a `100 Continue` interim response has been queued for the
    /// request currently being read, so a connection only sends it once per
    /// request even if the body keeps arriving across several reads.
    pub continue_sent: bool,
    pub header_start: Option<Instant>,
    pub body_start: Option<Instant>,
    pub last_activity: Instant,
    pub handshake_start: Instant,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>, now: Instant) -> Self {
        Connection {
            transport,
            in_buf: GrowBuf::new(),
            out_buf: GrowBuf::new(),
            waiting_writable: false,
            should_close: ShouldClose::None,
            requests_served: 0,
            continue_sent: false,
            header_start: None,
            body_start: None,
            last_activity: now,
            handshake_start: now,
        }
    }

    /// Offers one contiguous region to the transport; on anything short of
    /// full, unhurried success the remainder is appended to `out_buf` and OUT
    /// interest is requested (§4.I "Write path").
    pub fn queue_data(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if self.out_buf.is_empty() {
            let outcome = self.transport.write(bytes);
            match outcome.hint {
                Hint::Error => self.should_close = ShouldClose::Immediate,
                Hint::None => {
                    if outcome.bytes < bytes.len() {
                        self.out_buf.append(&bytes[outcome.bytes..]);
                        self.waiting_writable = true;
                    }
                }
                Hint::WantRead | Hint::WantWrite => {
                    self.out_buf.append(&bytes[outcome.bytes..]);
                    self.waiting_writable = true;
                }
            }
        } else {
            self.out_buf.append(bytes);
            self.waiting_writable = true;
        }
    }

    /// Queues each region in order; ordering across regions is preserved
    /// because once any region fails to fully drain, `out_buf` becomes
    /// non-empty and every later region is appended behind it rather than
    /// offered to the transport directly (§4.I "Partial-write correctness").
    pub fn queue_vec(&mut self, parts: &[&[u8]]) {
        for part in parts {
            self.queue_data(part);
        }
    }

    /// Drains `out_buf` on OUT readiness, one contiguous offer per call.
    pub fn flush(&mut self) -> Hint {
        while !self.out_buf.is_empty() {
            let outcome = self.transport.write(self.out_buf.as_slice());
            if outcome.bytes > 0 {
                self.out_buf.erase_front(outcome.bytes);
            }
            match outcome.hint {
                Hint::Error => {
                    self.should_close = ShouldClose::Immediate;
                    return Hint::Error;
                }
                Hint::WantRead | Hint::WantWrite => {
                    self.waiting_writable = true;
                    return outcome.hint;
                }
                Hint::None => {
                    if outcome.bytes == 0 {
                        break;
                    }
                }
            }
        }
        if self.out_buf.is_empty() && !self.transport.handshake_pending() {
            self.waiting_writable = false;
        }
        Hint::None
    }

    pub fn is_idle(&self) -> bool {
        self.header_start.is_none() && self.body_start.is_none()
    }
}

impl crate::response::ChunkSink for Connection {
    fn queue_data(&mut self, bytes: &[u8]) {
        Connection::queue_data(self, bytes)
    }
    fn queue_vec(&mut self, parts: &[&[u8]]) {
        Connection::queue_vec(self, parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::IoOutcome;

    struct MockTransport {
        writes: Vec<Vec<u8>>,
        accept: usize,
        hint: Hint,
    }

    impl Transport for MockTransport {
        fn read(&mut self, _buf: &mut [u8]) -> IoOutcome {
            IoOutcome { bytes: 0, hint: Hint::None }
        }
        fn write(&mut self, buf: &[u8]) -> IoOutcome {
            let n = buf.len().min(self.accept);
            self.writes.push(buf[..n].to_vec());
            IoOutcome { bytes: n, hint: self.hint }
        }
        fn reregister(
            &mut self,
            _registry: &mio::Registry,
            _token: mio::Token,
            _interest: mio::Interest,
        ) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn full_write_leaves_out_buf_empty() {
        let t = MockTransport { writes: Vec::new(), accept: usize::MAX, hint: Hint::None };
        let mut c = Connection::new(Box::new(t), Instant::now());
        c.queue_data(b"hello");
        assert!(c.out_buf.is_empty());
        assert!(!c.waiting_writable);
    }

    #[test]
    fn partial_write_buffers_remainder_in_order() {
        let t = MockTransport { writes: Vec::new(), accept: 2, hint: Hint::WantWrite };
        let mut c = Connection::new(Box::new(t), Instant::now());
        c.queue_data(b"hello");
        assert_eq!(c.out_buf.as_slice(), b"llo");
        assert!(c.waiting_writable);
    }

    #[test]
    fn queue_vec_preserves_ordering_across_parts() {
        let t = MockTransport { writes: Vec::new(), accept: 1, hint: Hint::WantWrite };
        let mut c = Connection::new(Box::new(t), Instant::now());
        c.queue_vec(&[b"AB", b"CD"]);
        // First byte of "AB" went straight to the transport; everything
        // after is queued behind it in arrival order.
        assert_eq!(c.out_buf.as_slice(), b"BCD");
    }
}
