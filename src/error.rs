//! Crate-wide error type.
//!
//! Protocol-level failures (malformed requests, oversized headers, ...) are
//! modeled as values rather than exceptions: callers translate them into a
//! response and a close decision (see [`crate::http1::status_for_error`]).

use thiserror::Error;

/// Errors produced anywhere in the core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),

    #[error("request header block exceeds max_header_bytes")]
    HeaderTooLarge,

    #[error("request target exceeds max_uri_bytes")]
    UriTooLong,

    #[error("unsupported HTTP version")]
    UnsupportedVersion,

    #[error("unsupported transfer-coding {0:?}")]
    UnsupportedTransferCoding(String),

    #[error("conflicting Content-Length and Transfer-Encoding headers")]
    ConflictingFraming,

    #[error("invalid chunk framing: {0}")]
    InvalidChunk(&'static str),

    #[error("connection closed before request was complete")]
    UnexpectedEof,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HPACK decode error: {0}")]
    Hpack(#[from] crate::hpack::HpackError),

    #[error("router pattern error: {0}")]
    RouterPattern(#[from] crate::router::PatternError),

    #[error("content decoding error: {0}")]
    Decoding(&'static str),

    #[error("handler panicked")]
    HandlerPanicked,

    #[error("TLS error: {0}")]
    Tls(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
