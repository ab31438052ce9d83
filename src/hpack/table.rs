//! HPACK static table (RFC 7541 Appendix A) and the per-connection dynamic
//! table (§4.C).

use std::collections::VecDeque;

/// The 61-entry static table, embedded verbatim. Index `i` (1-based) maps to
/// `STATIC_TABLE[i - 1]`.
pub const STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

pub const STATIC_TABLE_LEN: usize = STATIC_TABLE.len();

/// Per-RFC overhead added to each dynamic table entry's size accounting.
pub const ENTRY_OVERHEAD: usize = 32;

#[derive(Debug, Clone)]
pub struct DynamicEntry {
    pub name: String,
    pub value: String,
}

impl DynamicEntry {
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + ENTRY_OVERHEAD
    }
}

/// The FIFO dynamic table: newest entries at the front (lowest dynamic
/// index, 62), oldest evicted from the back once `max_size` is exceeded.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    entries: VecDeque<DynamicEntry>,
    current_size: usize,
    max_size: usize,
    protocol_max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        DynamicTable {
            entries: VecDeque::new(),
            current_size: 0,
            max_size,
            protocol_max_size: max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies a dynamic table size update (§4.C). May immediately evict.
    /// Errors if `new_max` exceeds the protocol-announced ceiling.
    pub fn set_max_size(&mut self, new_max: usize) -> Result<(), super::HpackError> {
        if new_max > self.protocol_max_size {
            return Err(super::HpackError::TableSizeUpdateTooLarge);
        }
        self.max_size = new_max;
        self.evict_to_fit(0);
        Ok(())
    }

    /// Adds a new entry. If its own size exceeds `max_size`, the table is
    /// cleared and the entry is dropped (RFC 7541 §4.4).
    pub fn add(&mut self, name: String, value: String) {
        let entry = DynamicEntry { name, value };
        let size = entry.size();
        if size > self.max_size {
            self.entries.clear();
            self.current_size = 0;
            return;
        }
        self.evict_to_fit(size);
        self.current_size += size;
        self.entries.push_front(entry);
    }

    fn evict_to_fit(&mut self, incoming: usize) {
        while self.current_size + incoming > self.max_size {
            match self.entries.pop_back() {
                Some(e) => self.current_size -= e.size(),
                None => break,
            }
        }
    }

    /// Dynamic index space starts at 62 (the most recently added entry).
    pub fn get(&self, dynamic_index_from_62: usize) -> Option<&DynamicEntry> {
        self.entries.get(dynamic_index_from_62)
    }

    pub fn find_full_match(&self, name: &str, value: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name == name && e.value == value)
            .map(|i| i + STATIC_TABLE_LEN + 1)
    }

    pub fn find_name_match(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|i| i + STATIC_TABLE_LEN + 1)
    }
}

/// Resolves a 1-based HPACK index (static `1..=61`, dynamic `62..`) to a
/// `(name, value)` pair.
pub fn resolve_index<'a>(
    index: usize,
    dynamic: &'a DynamicTable,
) -> Option<(std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)> {
    if index == 0 {
        return None;
    }
    if index <= STATIC_TABLE_LEN {
        let (n, v) = STATIC_TABLE[index - 1];
        return Some((n.into(), v.into()));
    }
    let dyn_idx = index - STATIC_TABLE_LEN - 1;
    dynamic
        .get(dyn_idx)
        .map(|e| (e.name.as_str().into(), e.value.as_str().into()))
}
