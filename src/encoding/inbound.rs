//! Inbound `Content-Encoding` decompression (§4.J "Inbound").
//!
//! Each stage decodes into one of two scratch buffers alternately so no
//! stage needs to resize the one it is currently reading from.

use flate2::read::{DeflateDecoder, GzDecoder};
use std::io::Read;

use crate::error::{Error, Result};
use crate::headers::HeaderIndex;

#[derive(Debug, Clone, Copy)]
pub struct DecodeGuards {
    pub max_compressed_bytes: u64,
    pub max_decompressed_bytes: u64,
    pub max_expansion_ratio: u64,
}

impl Default for DecodeGuards {
    fn default() -> Self {
        DecodeGuards {
            max_compressed_bytes: 10 * 1024 * 1024,
            max_decompressed_bytes: 100 * 1024 * 1024,
            max_expansion_ratio: 100,
        }
    }
}

fn decode_stage(coding: &str, input: &[u8], guards: &DecodeGuards) -> Result<Vec<u8>> {
    if input.len() as u64 > guards.max_compressed_bytes {
        return Err(Error::Decoding("compressed stage exceeds max_compressed_bytes"));
    }
    let cap = input.len().saturating_mul(4).max(1024);
    let mut out = Vec::with_capacity(cap.min(guards.max_decompressed_bytes as usize));
    let limit = guards.max_decompressed_bytes;

    let read_result = match coding {
        "gzip" | "x-gzip" => {
            let mut dec = GzDecoder::new(input);
            read_bounded(&mut dec, &mut out, limit)
        }
        "deflate" => {
            let mut dec = DeflateDecoder::new(input);
            read_bounded(&mut dec, &mut out, limit)
        }
        "identity" => {
            out.extend_from_slice(input);
            Ok(())
        }
        _ => return Err(Error::Decoding("unsupported Content-Encoding")),
    };
    read_result?;

    if !input.is_empty() {
        let ratio = out.len() as u64 / input.len().max(1) as u64;
        if ratio > guards.max_expansion_ratio {
            return Err(Error::Decoding("decompression exceeded max_expansion_ratio"));
        }
    }
    Ok(out)
}

/// Reads `dec` to EOF, failing once the running total would exceed `limit`.
/// Uses a fixed-size chunk so a decoder cannot be coaxed into a single
/// unbounded allocation ("zip bomb").
fn read_bounded<R: Read>(dec: &mut R, out: &mut Vec<u8>, limit: u64) -> Result<()> {
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = dec.read(&mut chunk).map_err(|_| Error::Decoding("decompression stream error"))?;
        if n == 0 {
            break;
        }
        if out.len() as u64 + n as u64 > limit {
            return Err(Error::Decoding("decompression exceeds max_decompressed_bytes"));
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

/// Decodes a request body per the `Content-Encoding` header, applying each
/// listed coding right-to-left, and strips the header from `headers` on
/// success so the handler sees a canonical decoded body.
pub fn decode_inbound(
    headers: &mut HeaderIndex,
    body: &[u8],
    guards: &DecodeGuards,
) -> Result<Vec<u8>> {
    let Some(raw) = headers.get("content-encoding") else {
        return Ok(body.to_vec());
    };
    let codings: Vec<String> = raw.split(',').map(|s| s.trim().to_ascii_lowercase()).collect();

    let mut current = body.to_vec();
    for coding in codings.iter().rev() {
        current = decode_stage(coding, &current, guards)?;
    }
    headers.remove("content-encoding");
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderView;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn headers(pairs: &[(&str, &str)]) -> HeaderIndex {
        HeaderIndex::build(pairs.iter().map(|(n, v)| HeaderView { name: n, value: v }))
    }

    fn gzip_bytes(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn no_content_encoding_passes_through() {
        let mut h = headers(&[]);
        let out = decode_inbound(&mut h, b"raw body", &DecodeGuards::default()).unwrap();
        assert_eq!(out, b"raw body");
    }

    #[test]
    fn gzip_decodes_and_strips_header() {
        let compressed = gzip_bytes(b"hello world");
        let mut h = headers(&[("Content-Encoding", "gzip")]);
        let out = decode_inbound(&mut h, &compressed, &DecodeGuards::default()).unwrap();
        assert_eq!(out, b"hello world");
        assert!(!h.contains("content-encoding"));
    }

    #[test]
    fn oversized_compressed_input_is_rejected() {
        let compressed = gzip_bytes(b"hello world");
        let mut h = headers(&[("Content-Encoding", "gzip")]);
        let guards = DecodeGuards { max_compressed_bytes: 2, ..DecodeGuards::default() };
        assert!(decode_inbound(&mut h, &compressed, &guards).is_err());
    }

    #[test]
    fn expansion_ratio_guard_trips_on_bomb_like_input() {
        let compressed = gzip_bytes(&vec![0u8; 1_000_000]);
        let mut h = headers(&[("Content-Encoding", "gzip")]);
        let guards = DecodeGuards { max_expansion_ratio: 10, ..DecodeGuards::default() };
        assert!(decode_inbound(&mut h, &compressed, &guards).is_err());
    }

    #[test]
    fn unsupported_coding_is_rejected() {
        let mut h = headers(&[("Content-Encoding", "br")]);
        assert!(decode_inbound(&mut h, b"x", &DecodeGuards::default()).is_err());
    }
}
