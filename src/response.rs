//! Buffered response builder and finalizer (§4.G).
//!
//! Handlers build a `Response` by setting status, headers, and a body
//! [`Payload`]; `finalize` then injects the reserved headers (`Date`,
//! `Connection`, `Content-Length`/`Transfer-Encoding`) exactly once, right
//! before the response is handed to the connection writer. User code can
//! never set a reserved header directly — `add_header` silently drops
//! attempts to do so, matching the teacher's historical raw-header
//! protections.

use crate::buf::Payload;
use crate::headers::{is_reserved_response_header, HeaderIndex};

#[derive(Debug)]
pub struct Response {
    status: u16,
    reason: Option<&'static str>,
    headers: HeaderIndex,
    trailers: HeaderIndex,
    body: Payload,
    finalized: bool,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            status: 200,
            reason: None,
            headers: HeaderIndex::new(),
            trailers: HeaderIndex::new(),
            body: Payload::Empty,
            finalized: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Response::default()
    }

    pub fn status(&mut self, code: u16) -> &mut Self {
        self.status = code;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn reason(&mut self, reason: &'static str) -> &mut Self {
        self.reason = Some(reason);
        self
    }

    /// Sets a header. Silently ignored for reserved response headers (§3);
    /// callers needing the value transmitted should use the corresponding
    /// body/status API instead.
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        if !is_reserved_response_header(name) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(name)
    }

    pub fn merge_vary_token(&mut self, token: &str) {
        self.headers.merge_vary_token(token);
    }

    pub fn add_trailer(&mut self, name: &str, value: &str) {
        self.trailers.insert(name, value);
    }

    pub fn trailers(&self) -> &HeaderIndex {
        &self.trailers
    }

    pub fn set_body(&mut self, body: Payload) -> &mut Self {
        self.body = body;
        self
    }

    pub fn body(&self) -> &Payload {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Payload {
        &mut self.body
    }

    pub fn headers(&self) -> &HeaderIndex {
        &self.headers
    }

    fn reason_phrase(&self) -> &str {
        self.reason.unwrap_or_else(|| {
            http::StatusCode::from_u16(self.status)
                .ok()
                .and_then(|c| c.canonical_reason())
                .unwrap_or("")
        })
    }

    /// Injects the reserved headers and serializes the status line + header
    /// block (no trailing CRLF before the body). A file-backed body without
    /// trailers gets a known `Content-Length`; any body with trailers, or
    /// one whose length cannot be known up front, is framed with chunked
    /// `Transfer-Encoding` instead (§3 Payload invariants, §4.G).
    ///
    /// Idempotent: finalizing twice is a no-op on the second call.
    pub fn finalize(&mut self, keep_alive: bool, use_chunked: bool) -> Vec<u8> {
        if !self.finalized {
            self.finalized = true;
            if use_chunked || !self.trailers.is_empty() {
                self.headers.insert("transfer-encoding", "chunked");
                if !self.trailers.is_empty() {
                    let names = self.trailers_names_for_header_list();
                    self.headers.insert("trailer", &names.join(", "));
                }
            } else {
                self.headers.insert("content-length", &self.body.len().to_string());
            }
            self.headers.insert("connection", if keep_alive { "keep-alive" } else { "close" });
        }

        let mut out = Vec::with_capacity(128 + self.headers.len() * 32);
        out.extend_from_slice(b"HTTP/1.1 ");
        out.extend_from_slice(self.status.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.reason_phrase().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(b"Date: ");
        crate::date::extend(&mut out);
        out.extend_from_slice(b"\r\n");
        for name in self.headers.iter_order() {
            if name == "date" {
                continue;
            }
            if let Some(value) = self.headers.get(name) {
                out.extend_from_slice(canonical_header_name(name).as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    fn trailers_names_for_header_list(&self) -> Vec<String> {
        self.trailers.iter_order().map(str::to_string).collect()
    }
}

/// Byte-count threshold below which a chunk header and its data are appended
/// to the sink as a single `queue_vec` call rather than two separate calls
/// (§4.G "Streaming writer" — "small chunks are coalesced... large chunks
/// emit the frame header and data with minimal copies").
const COALESCE_THRESHOLD: usize = 1024;

/// Destination a [`StreamingWriter`] pushes framed bytes into. Implemented by
/// [`crate::reactor::Connection`]; kept as a trait here so this module has no
/// dependency on the reactor.
pub trait ChunkSink {
    fn queue_data(&mut self, bytes: &[u8]);
    fn queue_vec(&mut self, parts: &[&[u8]]);
}

/// Emits a response as a sequence of `Transfer-Encoding: chunked` frames
/// instead of one fixed-length buffer (§4.G "Streaming writer").
///
/// The head is finalized lazily, on the first [`StreamingWriter::write`] or
/// on [`StreamingWriter::end`] if no data is ever written, so trailers and
/// status can still be adjusted right up until the first byte leaves.
pub struct StreamingWriter {
    status: u16,
    reason: Option<&'static str>,
    headers: HeaderIndex,
    trailers: HeaderIndex,
    head_sent: bool,
    ended: bool,
    chunks_coalesced: u64,
    chunks_large: u64,
    keep_alive: bool,
}

impl StreamingWriter {
    /// Starts a streaming response from an in-progress [`Response`]'s status
    /// and headers; its body (if any was set) is discarded since streaming
    /// output entirely replaces the buffered body path. `keep_alive` is
    /// decided by the caller up front (request version, `Connection` header,
    /// reactor shutdown state) the same way [`Response::finalize`] decides it
    /// for the buffered path.
    pub fn new(status: u16, reason: Option<&'static str>, headers: HeaderIndex, keep_alive: bool) -> Self {
        StreamingWriter {
            status,
            reason,
            headers,
            trailers: HeaderIndex::new(),
            head_sent: false,
            ended: false,
            chunks_coalesced: 0,
            chunks_large: 0,
            keep_alive,
        }
    }

    /// Overrides the status set at construction. No-op once the head has
    /// already gone out.
    pub fn status(&mut self, code: u16) -> &mut Self {
        if !self.head_sent {
            self.status = code;
        }
        self
    }

    pub fn reason(&mut self, reason: &'static str) -> &mut Self {
        if !self.head_sent {
            self.reason = Some(reason);
        }
        self
    }

    /// Adds a header. Silently ignored once the head has already gone out,
    /// or for a reserved response header (§3).
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        if !self.head_sent && !is_reserved_response_header(name) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn add_trailer(&mut self, name: &str, value: &str) {
        self.trailers.insert(name, value);
    }

    pub fn chunks_coalesced(&self) -> u64 {
        self.chunks_coalesced
    }

    pub fn chunks_large(&self) -> u64 {
        self.chunks_large
    }

    fn finalize_head(&mut self, sink: &mut dyn ChunkSink) {
        if self.head_sent {
            return;
        }
        self.head_sent = true;
        self.headers.insert("transfer-encoding", "chunked");
        if !self.trailers.is_empty() {
            let names: Vec<&str> = self.trailers.iter_order().collect();
            self.headers.insert("trailer", &names.join(", "));
        }
        self.headers.insert("connection", if self.keep_alive { "keep-alive" } else { "close" });

        let mut out = Vec::with_capacity(128 + self.headers.len() * 32);
        out.extend_from_slice(b"HTTP/1.1 ");
        out.extend_from_slice(self.status.to_string().as_bytes());
        out.push(b' ');
        let reason = self.reason.unwrap_or_else(|| {
            http::StatusCode::from_u16(self.status)
                .ok()
                .and_then(|c| c.canonical_reason())
                .unwrap_or("")
        });
        out.extend_from_slice(reason.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(b"Date: ");
        crate::date::extend(&mut out);
        out.extend_from_slice(b"\r\n");
        for name in self.headers.iter_order() {
            if name == "date" {
                continue;
            }
            if let Some(value) = self.headers.get(name) {
                out.extend_from_slice(canonical_header_name(name).as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        out.extend_from_slice(b"\r\n");
        sink.queue_data(&out);
    }

    /// Frames and queues one chunk. An empty slice is a no-op (the zero-size
    /// chunk is reserved for [`StreamingWriter::end`]).
    pub fn write(&mut self, data: &[u8], sink: &mut dyn ChunkSink) {
        if data.is_empty() {
            return;
        }
        self.finalize_head(sink);
        let header = format!("{:x}\r\n", data.len());
        if data.len() < COALESCE_THRESHOLD {
            let mut frame = Vec::with_capacity(header.len() + data.len() + 2);
            frame.extend_from_slice(header.as_bytes());
            frame.extend_from_slice(data);
            frame.extend_from_slice(b"\r\n");
            sink.queue_data(&frame);
            self.chunks_coalesced += 1;
        } else {
            sink.queue_vec(&[header.as_bytes(), data, b"\r\n"]);
            self.chunks_large += 1;
        }
    }

    /// Emits the terminating `0` chunk plus any buffered trailers. Calling
    /// this more than once, or writing after it, has no further effect.
    pub fn end(&mut self, sink: &mut dyn ChunkSink) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.finalize_head(sink);
        let mut tail = Vec::new();
        tail.extend_from_slice(b"0\r\n");
        for name in self.trailers.iter_order() {
            if let Some(value) = self.trailers.get(name) {
                tail.extend_from_slice(canonical_header_name(name).as_bytes());
                tail.extend_from_slice(b": ");
                tail.extend_from_slice(value.as_bytes());
                tail.extend_from_slice(b"\r\n");
            }
        }
        tail.extend_from_slice(b"\r\n");
        sink.queue_data(&tail);
    }
}

/// Title-Cases a lowercased header name for wire output (`content-type` ->
/// `Content-Type`), matching conventional HTTP/1.1 casing.
fn canonical_header_name(lower: &str) -> String {
    let mut out = String::with_capacity(lower.len());
    let mut start_of_word = true;
    for c in lower.chars() {
        if c == '-' {
            out.push(c);
            start_of_word = true;
        } else if start_of_word {
            out.extend(c.to_uppercase());
            start_of_word = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_headers_cannot_be_set_by_caller() {
        let mut r = Response::new();
        r.add_header("Content-Length", "999");
        assert_eq!(r.header("content-length"), None);
    }

    #[test]
    fn finalize_injects_content_length_and_connection() {
        let mut r = Response::new();
        r.set_body(Payload::from("hello"));
        let head = r.finalize(true, false);
        let head_str = String::from_utf8(head).unwrap();
        assert!(head_str.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head_str.contains("Content-Length: 5\r\n"));
        assert!(head_str.contains("Connection: keep-alive\r\n"));
        assert!(head_str.contains("Date: "));
    }

    #[test]
    fn finalize_with_trailers_uses_chunked_and_trailer_header() {
        let mut r = Response::new();
        r.add_trailer("X-Checksum", "abc");
        let head = r.finalize(true, true);
        let head_str = String::from_utf8(head).unwrap();
        assert!(head_str.contains("Transfer-Encoding: chunked\r\n"));
        assert!(head_str.contains("Trailer: x-checksum\r\n") || head_str.to_lowercase().contains("trailer: x-checksum"));
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut r = Response::new();
        let first = r.finalize(true, false);
        let second = r.finalize(true, false);
        assert_eq!(first, second);
    }

    #[test]
    fn canonical_casing_is_applied() {
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("x-a-b"), "X-A-B");
    }

    struct VecSink(Vec<u8>);
    impl ChunkSink for VecSink {
        fn queue_data(&mut self, bytes: &[u8]) {
            self.0.extend_from_slice(bytes);
        }
        fn queue_vec(&mut self, parts: &[&[u8]]) {
            for p in parts {
                self.0.extend_from_slice(p);
            }
        }
    }

    #[test]
    fn streaming_writer_frames_small_chunks_and_end() {
        let mut w = StreamingWriter::new(200, None, HeaderIndex::new(), true);
        let mut sink = VecSink(Vec::new());
        w.write(b"Wiki", &mut sink);
        w.write(b"pedia", &mut sink);
        w.end(&mut sink);
        let out = String::from_utf8(sink.0).unwrap();
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Transfer-Encoding: chunked\r\n"));
        assert!(out.contains("4\r\nWiki\r\n"));
        assert!(out.contains("5\r\npedia\r\n"));
        assert!(out.ends_with("0\r\n\r\n"));
        assert_eq!(w.chunks_coalesced(), 2);
        assert_eq!(w.chunks_large(), 0);
    }

    #[test]
    fn streaming_writer_uses_large_path_above_threshold() {
        let mut w = StreamingWriter::new(200, None, HeaderIndex::new(), true);
        let mut sink = VecSink(Vec::new());
        let big = vec![b'x'; COALESCE_THRESHOLD + 1];
        w.write(&big, &mut sink);
        w.end(&mut sink);
        assert_eq!(w.chunks_large(), 1);
        assert_eq!(w.chunks_coalesced(), 0);
    }

    #[test]
    fn streaming_writer_emits_trailers_after_terminal_chunk() {
        let mut w = StreamingWriter::new(200, None, HeaderIndex::new(), true);
        let mut sink = VecSink(Vec::new());
        w.add_trailer("X-Checksum", "abc");
        w.write(b"hi", &mut sink);
        w.end(&mut sink);
        let out = String::from_utf8(sink.0).unwrap();
        assert!(out.to_lowercase().contains("trailer: x-checksum"));
        assert!(out.to_lowercase().contains("x-checksum: abc\r\n"));
        assert!(out.trim_end().ends_with("x-checksum: abc"));
    }

    #[test]
    fn streaming_writer_end_without_write_still_sends_head() {
        let mut w = StreamingWriter::new(204, None, HeaderIndex::new(), true);
        let mut sink = VecSink(Vec::new());
        w.end(&mut sink);
        let out = String::from_utf8(sink.0).unwrap();
        assert!(out.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(out.ends_with("0\r\n\r\n"));
    }
}
