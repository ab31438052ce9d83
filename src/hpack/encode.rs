use super::huffman;
use super::table::DynamicTable;
use super::varint;

/// Requested indexing mode for an encoded header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexing {
    WithIncremental,
    WithoutIndexing,
    NeverIndexed,
}

enum Match {
    Full(usize),
    NameOnly(usize),
    None,
}

pub struct Encoder {
    dynamic: DynamicTable,
    use_huffman: bool,
    pending_size_update: Option<usize>,
}

impl Encoder {
    pub fn new(max_dynamic_size: usize) -> Self {
        Encoder {
            dynamic: DynamicTable::new(max_dynamic_size),
            use_huffman: true,
            pending_size_update: None,
        }
    }

    pub fn set_huffman(&mut self, enabled: bool) {
        self.use_huffman = enabled;
    }

    /// Requests a dynamic table size change; emission is deferred until the
    /// next `encode`/`finish_block` call, and always precedes any header
    /// field in that call's output.
    pub fn set_dynamic_table_max_size(&mut self, new_max: usize) {
        self.pending_size_update = Some(new_max);
    }

    fn find_match(&self, name: &str, value: &str) -> Match {
        for (i, &(sn, sv)) in super::table::STATIC_TABLE.iter().enumerate() {
            if sn == name && sv == value {
                return Match::Full(i + 1);
            }
        }
        if let Some(idx) = self.dynamic.find_full_match(name, value) {
            return Match::Full(idx);
        }
        for (i, &(sn, _)) in super::table::STATIC_TABLE.iter().enumerate() {
            if sn == name {
                return Match::NameOnly(i + 1);
            }
        }
        if let Some(idx) = self.dynamic.find_name_match(name) {
            return Match::NameOnly(idx);
        }
        Match::None
    }

    fn emit_pending_size_update(&mut self, out: &mut Vec<u8>) {
        if let Some(max) = self.pending_size_update.take() {
            varint::encode_into_first_byte(max as u64, 5, 0x20, out);
            let _ = self.dynamic.set_max_size(max);
        }
    }

    fn encode_string(&self, s: &str, out: &mut Vec<u8>) {
        if self.use_huffman {
            let enc_len = huffman::encoded_len(s.as_bytes());
            if enc_len < s.len() {
                varint::encode_into_first_byte(enc_len as u64, 7, 0x80, out);
                huffman::encode(s.as_bytes(), out);
                return;
            }
        }
        varint::encode_into_first_byte(s.len() as u64, 7, 0x00, out);
        out.extend_from_slice(s.as_bytes());
    }

    /// Encodes a single header field, selecting representation from the
    /// best static/dynamic match (§4.C "Encode").
    pub fn encode(&mut self, name: &str, value: &str, indexing: Indexing, out: &mut Vec<u8>) {
        self.emit_pending_size_update(out);

        match indexing {
            Indexing::WithIncremental => match self.find_match(name, value) {
                Match::Full(idx) => {
                    varint::encode_into_first_byte(idx as u64, 7, 0x80, out);
                }
                Match::NameOnly(idx) => {
                    varint::encode_into_first_byte(idx as u64, 6, 0x40, out);
                    self.encode_string(value, out);
                    self.dynamic.add(name.to_string(), value.to_string());
                }
                Match::None => {
                    out.push(0x40);
                    self.encode_string(name, out);
                    self.encode_string(value, out);
                    self.dynamic.add(name.to_string(), value.to_string());
                }
            },
            Indexing::WithoutIndexing | Indexing::NeverIndexed => {
                let (leading, prefix_bits) = if indexing == Indexing::NeverIndexed {
                    (0x10, 4)
                } else {
                    (0x00, 4)
                };
                match self.find_match(name, value) {
                    Match::Full(idx) => {
                        // A full match still benefits from plain indexed
                        // representation; it is always safe regardless of
                        // the requested non-indexing mode since no new
                        // table entry is created either way.
                        varint::encode_into_first_byte(idx as u64, 7, 0x80, out);
                    }
                    Match::NameOnly(idx) => {
                        varint::encode_into_first_byte(idx as u64, prefix_bits, leading, out);
                        self.encode_string(value, out);
                    }
                    Match::None => {
                        out.push(leading);
                        self.encode_string(name, out);
                        self.encode_string(value, out);
                    }
                }
            }
        }
    }

    pub fn dynamic_table(&self) -> &DynamicTable {
        &self.dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_static_match_is_indexed() {
        let mut enc = Encoder::new(4096);
        let mut out = Vec::new();
        enc.encode(":method", "GET", Indexing::WithIncremental, &mut out);
        assert_eq!(out, vec![0x82]);
    }

    #[test]
    fn name_only_static_match_uses_literal_with_index() {
        let mut enc = Encoder::new(4096);
        enc.set_huffman(false);
        let mut out = Vec::new();
        enc.encode(":path", "/foo", Indexing::WithIncremental, &mut out);
        // index 4 (":path") with incremental indexing prefix 01, then literal "/foo"
        assert_eq!(out[0], 0x40 | 0x04);
    }

    #[test]
    fn pending_size_update_precedes_fields() {
        let mut enc = Encoder::new(4096);
        enc.set_dynamic_table_max_size(0);
        let mut out = Vec::new();
        enc.encode(":method", "GET", Indexing::WithIncremental, &mut out);
        assert_eq!(out[0] & 0xe0, 0x20, "size update byte must come first");
    }

    #[test]
    fn never_indexed_does_not_grow_dynamic_table() {
        let mut enc = Encoder::new(4096);
        let mut out = Vec::new();
        enc.encode("x-secret", "v", Indexing::NeverIndexed, &mut out);
        assert_eq!(enc.dynamic_table().len(), 0);
        assert_eq!(out[0] & 0xf0, 0x10);
    }
}
