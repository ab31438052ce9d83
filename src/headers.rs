//! Flat header storage and the case-insensitive header index (§3, header view).
//!
//! Request and response headers both live as a single contiguous byte block
//! (`name: value\r\n` pairs); this module provides the view type over that
//! block plus the index used for O(1)-ish lookup, last-occurrence-wins
//! semantics, and comma-merging of the known mergeable header set.

use std::collections::HashMap;

/// A borrowed `(name, value)` pair over either the request buffer or a
/// response buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderView<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// Header names whose repeated occurrences are combined with `", "` rather
/// than the later one winning outright.
pub const MERGEABLE: &[&str] = &[
    "accept",
    "accept-encoding",
    "accept-language",
    "cache-control",
    "via",
    "vary",
    "warning",
];

/// Reserved response headers the core injects at finalize; user code may not
/// set these directly (§3, Response invariants).
pub const RESERVED_RESPONSE_HEADERS: &[&str] = &[
    "date",
    "connection",
    "content-length",
    "transfer-encoding",
    "trailer",
    "upgrade",
    "te",
];

pub fn is_reserved_response_header(name: &str) -> bool {
    RESERVED_RESPONSE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

pub fn is_mergeable(name: &str) -> bool {
    MERGEABLE.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// RFC 7230 `tchar`: the set of bytes legal in a header field name.
pub fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.'
        | b'^' | b'_' | b'`' | b'|' | b'~'
    ) || b.is_ascii_alphanumeric()
}

pub fn is_valid_header_name(name: &[u8]) -> bool {
    !name.is_empty() && name.iter().all(|&b| is_tchar(b))
}

/// A header field value must not contain bare CR or LF.
pub fn is_valid_header_value(value: &[u8]) -> bool {
    !value.iter().any(|&b| b == b'\r' || b == b'\n')
}

/// A case-insensitive index from header name to the (last, or merged) value.
///
/// Built once after parsing; subsequent lookups are a single hashmap probe
/// on the lowercased name.
#[derive(Debug, Default, Clone)]
pub struct HeaderIndex {
    // lowercased name -> resolved value (merged, or last-occurrence)
    map: HashMap<String, String>,
    // preserves first-seen order for iteration / Vary merging
    order: Vec<String>,
}

impl HeaderIndex {
    pub fn new() -> Self {
        HeaderIndex::default()
    }

    /// Folds a parsed `(name, value)` sequence into the index, honoring
    /// last-occurrence-wins for ordinary headers and comma-merge for the
    /// mergeable set.
    pub fn build<'a, I: IntoIterator<Item = HeaderView<'a>>>(pairs: I) -> Self {
        let mut idx = HeaderIndex::new();
        for h in pairs {
            idx.insert(h.name, h.value);
        }
        idx
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        let key = name.to_ascii_lowercase();
        if is_mergeable(&key) {
            self.map
                .entry(key.clone())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        } else {
            self.map.insert(key.clone(), value.to_string());
        }
        if !self.order.contains(&key) {
            self.order.push(key);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let key = name.to_ascii_lowercase();
        self.order.retain(|k| k != &key);
        self.map.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates lowercased header names in first-seen order.
    pub fn iter_order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Appends `token` to the `Vary` header, merging at the token level
    /// (case-insensitive) instead of blindly appending.
    pub fn merge_vary_token(&mut self, token: &str) {
        let key = "vary";
        match self.map.get_mut(key) {
            Some(existing) => {
                let already = existing.split(',').any(|t| t.trim().eq_ignore_ascii_case(token));
                if !already {
                    existing.push_str(", ");
                    existing.push_str(token);
                }
            }
            None => {
                self.map.insert(key.to_string(), token.to_string());
                self.order.push(key.to_string());
            }
        }
    }
}
