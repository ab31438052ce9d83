//! Transport abstraction over plain TCP and (optionally) TLS (§4.H).

#[cfg(feature = "tls")]
mod tls;

use mio::net::TcpStream;
use std::io::{self, Read, Write};

/// What a transport call needs before it can make further progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    None,
    WantRead,
    WantWrite,
    Error,
}

/// Result of one `read`/`write` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoOutcome {
    pub bytes: usize,
    pub hint: Hint,
}

/// A byte transport a connection reads from and writes to, abstracting
/// plain TCP and TLS behind one non-blocking interface.
pub trait Transport: Send {
    fn read(&mut self, buf: &mut [u8]) -> IoOutcome;
    fn write(&mut self, buf: &[u8]) -> IoOutcome;
    /// `true` until the transport has finished any handshake and is ready
    /// to carry application bytes (always `false` for plain TCP).
    fn handshake_pending(&self) -> bool {
        false
    }
    /// Updates the poll registration for the underlying socket, letting the
    /// reactor add/drop `WRITABLE` interest as `waiting_writable` changes.
    fn reregister(
        &mut self,
        registry: &mio::Registry,
        token: mio::Token,
        interest: mio::Interest,
    ) -> io::Result<()>;
}

/// Plain, unencrypted TCP transport.
pub struct PlainTransport {
    stream: TcpStream,
}

impl PlainTransport {
    pub fn new(stream: TcpStream) -> Self {
        PlainTransport { stream }
    }
}

fn classify_io_error(e: &io::Error, reading: bool) -> Hint {
    match e.kind() {
        io::ErrorKind::WouldBlock => {
            if reading {
                Hint::WantRead
            } else {
                Hint::WantWrite
            }
        }
        io::ErrorKind::Interrupted => Hint::None,
        _ => Hint::Error,
    }
}

impl Transport for PlainTransport {
    fn read(&mut self, buf: &mut [u8]) -> IoOutcome {
        match self.stream.read(buf) {
            Ok(n) => IoOutcome { bytes: n, hint: Hint::None },
            Err(e) => IoOutcome { bytes: 0, hint: classify_io_error(&e, true) },
        }
    }

    fn write(&mut self, buf: &[u8]) -> IoOutcome {
        match self.stream.write(buf) {
            Ok(n) => IoOutcome { bytes: n, hint: Hint::None },
            Err(e) => IoOutcome { bytes: 0, hint: classify_io_error(&e, false) },
        }
    }

    fn reregister(
        &mut self,
        registry: &mio::Registry,
        token: mio::Token,
        interest: mio::Interest,
    ) -> io::Result<()> {
        registry.reregister(&mut self.stream, token, interest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_maps_to_directional_hint() {
        let e = io::Error::from(io::ErrorKind::WouldBlock);
        assert_eq!(classify_io_error(&e, true), Hint::WantRead);
        assert_eq!(classify_io_error(&e, false), Hint::WantWrite);
    }

    #[test]
    fn other_error_is_fatal() {
        let e = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(classify_io_error(&e, true), Hint::Error);
    }
}
