//! Cached `Date` header value (§4.G: the response finalizer injects this on
//! every response). Formatting an HTTP-date on every response would mean a
//! syscall plus a format on the hot path; instead we cache the formatted
//! bytes per thread and refresh at most once a second.

use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};

// "Sun, 06 Nov 1994 08:49:37 GMT".len()
pub const DATE_VALUE_LENGTH: usize = 29;

struct CachedDate {
    text: String,
    next_update: u64,
}

thread_local! {
    static CACHED: RefCell<CachedDate> = RefCell::new(CachedDate::new());
}

impl CachedDate {
    fn new() -> Self {
        let mut cache = CachedDate { text: String::with_capacity(DATE_VALUE_LENGTH), next_update: 0 };
        cache.refresh();
        cache
    }

    fn refresh(&mut self) {
        let now_secs =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        self.text.clear();
        self.text.push_str(&httpdate::fmt_http_date(UNIX_EPOCH + std::time::Duration::from_secs(now_secs)));
        debug_assert_eq!(self.text.len(), DATE_VALUE_LENGTH);
        self.next_update = now_secs + 1;
    }

    fn check(&mut self) {
        let now_secs =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        if now_secs >= self.next_update {
            self.refresh();
        }
    }
}

/// Appends the current cached `Date` value (no trailing CRLF) to `dst`.
pub fn extend(dst: &mut Vec<u8>) {
    CACHED.with(|cache| {
        let mut cache = cache.borrow_mut();
        cache.check();
        dst.extend_from_slice(cache.text.as_bytes());
    });
}

/// Returns the current cached `Date` value as an owned `String`.
pub fn now() -> String {
    CACHED.with(|cache| {
        let mut cache = cache.borrow_mut();
        cache.check();
        cache.text.clone()
    })
}
