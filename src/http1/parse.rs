//! Request-line and header-block parsing (§4.F "Framing").

use crate::headers::HeaderIndex;

const MAX_HEADERS: usize = 100;

/// The parsed request line plus header index, and how many bytes of the
/// input buffer the head consumed.
pub struct ParsedHead {
    pub method: http::Method,
    pub uri: http::Uri,
    pub version: http::Version,
    pub headers: HeaderIndex,
    pub consumed: usize,
}

/// Outcome of attempting to parse one request head out of the front of a
/// connection's input buffer.
pub enum ParseStatus {
    /// Not enough bytes buffered yet; try again after more reads.
    NeedMore,
    Ok(ParsedHead),
    /// 413 — header block exceeded `max_header_bytes` before `CRLF CRLF`.
    HeaderTooLarge,
    /// 400 — the request line or a header line was malformed.
    Malformed,
    /// 414 — the request-target exceeded `max_uri_bytes`.
    UriTooLong,
    /// 505 — a version other than HTTP/1.0 or HTTP/1.1.
    UnsupportedVersion,
}

/// Parses the request line and headers at the front of `buf`.
///
/// `max_header_bytes` bounds the search for the terminating blank line;
/// `max_uri_bytes` bounds the request-target length.
pub fn parse_head(buf: &[u8], max_header_bytes: usize, max_uri_bytes: usize) -> ParseStatus {
    if buf.is_empty() {
        return ParseStatus::NeedMore;
    }
    let search_window = &buf[..buf.len().min(max_header_bytes)];
    if !contains_double_crlf(search_window) {
        return if buf.len() >= max_header_bytes {
            ParseStatus::HeaderTooLarge
        } else {
            ParseStatus::NeedMore
        };
    }

    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut raw_headers);
    let consumed = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return ParseStatus::NeedMore,
        Err(_) => return ParseStatus::Malformed,
    };

    let path = match req.path {
        Some(p) => p,
        None => return ParseStatus::Malformed,
    };
    if path.len() > max_uri_bytes {
        return ParseStatus::UriTooLong;
    }
    let uri: http::Uri = match path.parse() {
        Ok(u) => u,
        Err(_) => return ParseStatus::Malformed,
    };

    let method = match req.method.and_then(|m| http::Method::from_bytes(m.as_bytes()).ok()) {
        Some(m) => m,
        None => return ParseStatus::Malformed,
    };

    let version = match req.version {
        Some(0) => http::Version::HTTP_10,
        Some(1) => http::Version::HTTP_11,
        _ => return ParseStatus::UnsupportedVersion,
    };

    let mut headers = HeaderIndex::new();
    for h in req.headers.iter() {
        if h.name.is_empty() {
            continue;
        }
        let value = match std::str::from_utf8(h.value) {
            Ok(v) => v,
            Err(_) => return ParseStatus::Malformed,
        };
        if !crate::headers::is_valid_header_name(h.name.as_bytes())
            || !crate::headers::is_valid_header_value(value.as_bytes())
        {
            return ParseStatus::Malformed;
        }
        headers.insert(h.name, value);
    }

    ParseStatus::Ok(ParsedHead { method, uri, version, headers, consumed })
}

fn contains_double_crlf(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let raw = b"GET /foo?x=1 HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n";
        match parse_head(raw, 8192, 8192) {
            ParseStatus::Ok(head) => {
                assert_eq!(head.method, http::Method::GET);
                assert_eq!(head.uri.path(), "/foo");
                assert_eq!(head.version, http::Version::HTTP_11);
                assert_eq!(head.headers.get("host"), Some("example.com"));
                assert_eq!(head.consumed, raw.len());
            }
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn incomplete_request_needs_more() {
        let raw = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
        assert!(matches!(parse_head(raw, 8192, 8192), ParseStatus::NeedMore));
    }

    #[test]
    fn oversized_header_block_is_413() {
        let raw = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
        assert!(matches!(parse_head(raw, 8, 8192), ParseStatus::HeaderTooLarge));
    }

    #[test]
    fn uri_too_long_is_414() {
        let long_path = "/".to_string() + &"a".repeat(100);
        let raw = format!("GET {long_path} HTTP/1.1\r\nHost: h\r\n\r\n");
        assert!(matches!(parse_head(raw.as_bytes(), 8192, 16), ParseStatus::UriTooLong));
    }

    #[test]
    fn unsupported_version_is_505() {
        let raw = b"GET / HTTP/2.0\r\nHost: h\r\n\r\n";
        assert!(matches!(parse_head(raw, 8192, 8192), ParseStatus::Malformed | ParseStatus::UnsupportedVersion));
    }

    #[test]
    fn mergeable_headers_combine() {
        let raw = b"GET / HTTP/1.1\r\nAccept-Encoding: gzip\r\nAccept-Encoding: br\r\n\r\n";
        match parse_head(raw, 8192, 8192) {
            ParseStatus::Ok(head) => {
                assert_eq!(head.headers.get("accept-encoding"), Some("gzip, br"));
            }
            _ => panic!("expected Ok"),
        }
    }
}
