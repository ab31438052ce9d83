//! Body framing decision and chunked transfer-coding decode (§4.F "Body
//! framing").

use crate::error::{Error, Result};
use crate::headers::HeaderIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    None,
    ContentLength(u64),
    Chunked,
}

/// Decides how the request body (if any) is framed, per RFC 7230 §3.3.3
/// precedence (§4.F "Body framing").
pub fn determine_framing(headers: &HeaderIndex) -> Result<BodyFraming> {
    if let Some(te) = headers.get("transfer-encoding") {
        if headers.contains("content-length") {
            return Err(Error::ConflictingFraming);
        }
        let codings: Vec<&str> = te.split(',').map(|s| s.trim()).collect();
        match codings.last() {
            Some(&"chunked") => return Ok(BodyFraming::Chunked),
            Some(other) => return Err(Error::UnsupportedTransferCoding(other.to_string())),
            None => return Err(Error::MalformedRequest("empty Transfer-Encoding")),
        }
    }
    if let Some(cl) = headers.get("content-length") {
        let n: u64 =
            cl.trim().parse().map_err(|_| Error::MalformedRequest("invalid Content-Length"))?;
        return Ok(BodyFraming::ContentLength(n));
    }
    Ok(BodyFraming::None)
}

pub enum ChunkedStatus {
    NeedMore,
    Done { body: Vec<u8>, trailers: Vec<(String, String)>, consumed: usize },
}

/// Decodes a full chunked body (all chunks through the terminating `0`
/// chunk and optional trailer block) out of the front of `buf`.
///
/// This is a whole-buffer decoder rather than an incremental state machine:
/// callers re-invoke it as more bytes arrive, paying an O(n) rescan per call
/// which is acceptable given bodies are bounded by `max_body_bytes`.
pub fn decode_chunked(buf: &[u8]) -> Result<ChunkedStatus> {
    let mut pos = 0usize;
    let mut body = Vec::new();

    loop {
        let line_end = match find_crlf(&buf[pos..]) {
            Some(i) => pos + i,
            None => return Ok(ChunkedStatus::NeedMore),
        };
        let size_line = &buf[pos..line_end];
        let size_str = std::str::from_utf8(size_line)
            .map_err(|_| Error::InvalidChunk("non-UTF8 chunk size line"))?;
        let size_token = size_str.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_token, 16)
            .map_err(|_| Error::InvalidChunk("invalid chunk size"))?;
        pos = line_end + 2;

        if size == 0 {
            // Terminating chunk: optional trailer block, then CRLF.
            let mut trailers = Vec::new();
            loop {
                let tline_end = match find_crlf(&buf[pos..]) {
                    Some(i) => pos + i,
                    None => return Ok(ChunkedStatus::NeedMore),
                };
                if tline_end == pos {
                    pos += 2;
                    break;
                }
                let line = std::str::from_utf8(&buf[pos..tline_end])
                    .map_err(|_| Error::InvalidChunk("non-UTF8 trailer line"))?;
                let (name, value) = line
                    .split_once(':')
                    .ok_or(Error::InvalidChunk("malformed trailer line"))?;
                trailers.push((name.trim().to_string(), value.trim().to_string()));
                pos = tline_end + 2;
            }
            return Ok(ChunkedStatus::Done { body, trailers, consumed: pos });
        }

        if buf.len() < pos + size + 2 {
            return Ok(ChunkedStatus::NeedMore);
        }
        body.extend_from_slice(&buf[pos..pos + size]);
        if &buf[pos + size..pos + size + 2] != b"\r\n" {
            return Err(Error::InvalidChunk("missing chunk-terminating CRLF"));
        }
        pos += size + 2;
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
