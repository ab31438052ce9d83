//! HTTP/1.1 request parsing and body framing (§4.F).

mod body;
mod parse;

pub use body::{decode_chunked, determine_framing, BodyFraming, ChunkedStatus};
pub use parse::{parse_head, ParseStatus, ParsedHead};

use crate::error::Error;
use crate::headers::HeaderIndex;

/// The literal bytes of a `100 Continue` interim response (§6 "Wire
/// protocol").
pub const CONTINUE_100: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectAction {
    /// No `Expect` header, or it is satisfied with no action needed.
    None,
    /// `Expect: 100-continue` with a body expected: emit [`CONTINUE_100`]
    /// before reading the body.
    Send100Continue,
    /// Any other `Expect` token with no registered expectation handler:
    /// respond 417.
    ExpectationFailed,
}

/// Decides what, if anything, the connection must do about an `Expect`
/// header before reading the request body (§4.F).
pub fn expect_action(headers: &HeaderIndex, body_expected: bool) -> ExpectAction {
    match headers.get("expect") {
        None => ExpectAction::None,
        Some(v) if v.eq_ignore_ascii_case("100-continue") => {
            if body_expected {
                ExpectAction::Send100Continue
            } else {
                ExpectAction::None
            }
        }
        Some(_) => ExpectAction::ExpectationFailed,
    }
}

/// Maps a parse/framing error to the status code a compliant server must
/// answer with (§4.F "Framing").
pub fn status_for_error(err: &Error) -> u16 {
    match err {
        Error::MalformedRequest(_) => 400,
        Error::HeaderTooLarge => 413,
        Error::UriTooLong => 414,
        Error::UnsupportedVersion => 505,
        Error::UnsupportedTransferCoding(_) => 501,
        Error::ConflictingFraming => 400,
        Error::InvalidChunk(_) => 400,
        Error::UnexpectedEof => 400,
        Error::Decoding(_) => 400,
        Error::Hpack(_) => 400,
        Error::RouterPattern(_) | Error::HandlerPanicked | Error::Tls(_) | Error::Io(_) => 500,
    }
}

pub fn status_for_parse(status: &ParseStatus) -> Option<u16> {
    match status {
        ParseStatus::HeaderTooLarge => Some(413),
        ParseStatus::Malformed => Some(400),
        ParseStatus::UriTooLong => Some(414),
        ParseStatus::UnsupportedVersion => Some(505),
        ParseStatus::NeedMore | ParseStatus::Ok(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderView;

    fn headers(pairs: &[(&str, &str)]) -> HeaderIndex {
        HeaderIndex::build(pairs.iter().map(|(n, v)| HeaderView { name: n, value: v }))
    }

    #[test]
    fn expect_100_continue_triggers_interim_response() {
        let h = headers(&[("Expect", "100-continue")]);
        assert_eq!(expect_action(&h, true), ExpectAction::Send100Continue);
        assert_eq!(expect_action(&h, false), ExpectAction::None);
    }

    #[test]
    fn unknown_expect_token_fails() {
        let h = headers(&[("Expect", "widget-mode")]);
        assert_eq!(expect_action(&h, true), ExpectAction::ExpectationFailed);
    }

    #[test]
    fn status_mapping_matches_spec_codes() {
        assert_eq!(status_for_error(&Error::HeaderTooLarge), 413);
        assert_eq!(status_for_error(&Error::UriTooLong), 414);
        assert_eq!(status_for_error(&Error::UnsupportedVersion), 505);
        assert_eq!(
            status_for_error(&Error::UnsupportedTransferCoding("gzip".into())),
            501
        );
    }
}
