//! permessage-deflate (RFC 7692) compression contract for WebSocket message
//! payloads. Frame parsing itself is out of scope; this module only
//! compresses/decompresses a message payload per the negotiated parameters.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::{Error, Result};

/// The trailing 4 bytes RFC 7692 §7.2.1 strips after compressing and
/// re-appends before inflating.
const TAIL: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBits(u8);

impl WindowBits {
    pub fn new(bits: u8) -> Option<Self> {
        if (8..=15).contains(&bits) {
            Some(WindowBits(bits))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for WindowBits {
    fn default() -> Self {
        WindowBits(15)
    }
}

/// Negotiated permessage-deflate parameters, parsed from the
/// `Sec-WebSocket-Extensions` offer/response tokens listed in RFC 7692 §7.1:
/// `permessage-deflate`, `server_no_context_takeover`,
/// `client_no_context_takeover`, `server_max_window_bits`,
/// `client_max_window_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    pub server_no_context_takeover: bool,
    pub client_no_context_takeover: bool,
    pub server_max_window_bits: WindowBits,
    pub client_max_window_bits: WindowBits,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: WindowBits::default(),
            client_max_window_bits: WindowBits::default(),
        }
    }
}

/// Parses the extension parameter tokens following a `permessage-deflate`
/// token in a `Sec-WebSocket-Extensions` header value (a single offer, e.g.
/// `permessage-deflate; client_max_window_bits=12`).
pub fn parse_params(offer: &str) -> Result<Params> {
    let mut params = Params::default();
    let mut tokens = offer.split(';').map(|t| t.trim());
    let head = tokens.next().unwrap_or("");
    if !head.eq_ignore_ascii_case("permessage-deflate") {
        return Err(Error::Decoding("not a permessage-deflate offer"));
    }
    for tok in tokens {
        if tok.is_empty() {
            continue;
        }
        let (name, value) = match tok.split_once('=') {
            Some((n, v)) => (n.trim(), Some(v.trim().trim_matches('"'))),
            None => (tok, None),
        };
        match name {
            "server_no_context_takeover" => params.server_no_context_takeover = true,
            "client_no_context_takeover" => params.client_no_context_takeover = true,
            "server_max_window_bits" => {
                let bits: u8 = value
                    .unwrap_or("15")
                    .parse()
                    .map_err(|_| Error::Decoding("invalid server_max_window_bits"))?;
                params.server_max_window_bits = WindowBits::new(bits)
                    .ok_or(Error::Decoding("server_max_window_bits out of 8..=15"))?;
            }
            "client_max_window_bits" => {
                let bits: u8 = value
                    .unwrap_or("15")
                    .parse()
                    .map_err(|_| Error::Decoding("invalid client_max_window_bits"))?;
                params.client_max_window_bits = WindowBits::new(bits)
                    .ok_or(Error::Decoding("client_max_window_bits out of 8..=15"))?;
            }
            _ => return Err(Error::Decoding("unknown permessage-deflate parameter")),
        }
    }
    Ok(params)
}

/// A per-connection compressor. Context takeover (retaining the sliding
/// window across messages) is the default; `no_context_takeover` resets the
/// stream after every message instead.
pub struct PerMessageCompressor {
    compress: Compress,
    no_context_takeover: bool,
}

impl PerMessageCompressor {
    pub fn new(no_context_takeover: bool) -> Self {
        PerMessageCompressor {
            compress: Compress::new(Compression::default(), false),
            no_context_takeover,
        }
    }

    /// Compresses one message payload, stripping the RFC 7692 tail.
    pub fn compress_message(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len());
        self.compress
            .compress_vec(input, &mut out, FlushCompress::Sync)
            .map_err(|_| Error::Decoding("deflate compression failed"))?;
        if out.ends_with(&TAIL) {
            out.truncate(out.len() - TAIL.len());
        }
        if self.no_context_takeover {
            self.compress.reset();
        }
        Ok(out)
    }
}

/// A per-connection decompressor, mirroring [`PerMessageCompressor`].
pub struct PerMessageDecompressor {
    decompress: Decompress,
    no_context_takeover: bool,
    max_decompressed_bytes: usize,
}

impl PerMessageDecompressor {
    pub fn new(no_context_takeover: bool, max_decompressed_bytes: usize) -> Self {
        PerMessageDecompressor {
            decompress: Decompress::new(false),
            no_context_takeover,
            max_decompressed_bytes,
        }
    }

    /// Decompresses one message payload, re-appending the RFC 7692 tail
    /// before inflating.
    pub fn decompress_message(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut framed = Vec::with_capacity(input.len() + TAIL.len());
        framed.extend_from_slice(input);
        framed.extend_from_slice(&TAIL);

        let start_total_in = self.decompress.total_in();
        let start_total_out = self.decompress.total_out();
        let mut out = Vec::with_capacity(input.len() * 2);
        loop {
            let consumed = (self.decompress.total_in() - start_total_in) as usize;
            let before_out = out.len();
            out.resize(out.len() + 8192, 0);
            let status = self
                .decompress
                .decompress(&framed[consumed.min(framed.len())..], &mut out[before_out..], FlushDecompress::Sync)
                .map_err(|_| Error::Decoding("deflate decompression failed"))?;
            let produced_total = (self.decompress.total_out() - start_total_out) as usize;
            out.truncate(produced_total);
            if out.len() > self.max_decompressed_bytes {
                return Err(Error::Decoding("decompressed message exceeds limit"));
            }
            if status == Status::StreamEnd || produced_total == before_out {
                break;
            }
        }

        if self.no_context_takeover {
            self.decompress.reset(false);
        }
        Ok(out)
    }
}
