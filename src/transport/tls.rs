//! TLS transport, driving a `rustls::ServerConnection` over a non-blocking
//! socket (§4.H). Key material and certificate verification are the host's
//! concern; this module only drives the handshake and the encrypted byte
//! stream.

use super::{classify_io_error, Hint, IoOutcome, Transport};
use mio::net::TcpStream;
use rustls::ServerConnection;
use std::io::{self, Read, Write};
use std::sync::Arc;

pub struct TlsTransport {
    stream: TcpStream,
    conn: ServerConnection,
}

impl TlsTransport {
    pub fn new(stream: TcpStream, config: Arc<rustls::ServerConfig>) -> Result<Self, rustls::Error> {
        let conn = ServerConnection::new(config)?;
        Ok(TlsTransport { stream, conn })
    }

    fn pump_io(&mut self) -> Hint {
        if self.conn.wants_write() {
            match self.conn.write_tls(&mut self.stream) {
                Ok(_) => {}
                Err(e) => return classify_io_error(&e, false),
            }
        }
        if self.conn.wants_read() {
            match self.conn.read_tls(&mut self.stream) {
                Ok(0) => return Hint::Error,
                Ok(_) => {
                    if let Err(e) = self.conn.process_new_packets() {
                        let _ = self.conn.write_tls(&mut self.stream);
                        return Hint::Error.tap_log(&e);
                    }
                }
                Err(e) => return classify_io_error(&e, true),
            }
        }
        Hint::None
    }
}

trait TapLog {
    fn tap_log(self, e: &rustls::Error) -> Self;
}

impl TapLog for Hint {
    fn tap_log(self, e: &rustls::Error) -> Self {
        tracing::debug!(error = %e, "TLS record processing failed");
        self
    }
}

impl Transport for TlsTransport {
    fn handshake_pending(&self) -> bool {
        self.conn.is_handshaking()
    }

    fn read(&mut self, buf: &mut [u8]) -> IoOutcome {
        let hint = self.pump_io();
        if hint == Hint::Error {
            return IoOutcome { bytes: 0, hint };
        }
        match self.conn.reader().read(buf) {
            Ok(0) if self.conn.is_handshaking() => IoOutcome { bytes: 0, hint: Hint::WantRead },
            Ok(n) => IoOutcome { bytes: n, hint: Hint::None },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                IoOutcome { bytes: 0, hint: Hint::WantRead }
            }
            Err(_) => IoOutcome { bytes: 0, hint: Hint::Error },
        }
    }

    fn write(&mut self, buf: &[u8]) -> IoOutcome {
        let n = match self.conn.writer().write(buf) {
            Ok(n) => n,
            Err(_) => return IoOutcome { bytes: 0, hint: Hint::Error },
        };
        let hint = self.pump_io();
        IoOutcome { bytes: n, hint }
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
