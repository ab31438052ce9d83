use super::huffman::DecodeTree;
use super::table::{resolve_index, DynamicTable, STATIC_TABLE_LEN};
use super::{varint, DecodedField, HpackError};

pub struct Decoder {
    dynamic: DynamicTable,
    huffman: DecodeTree,
}

impl Decoder {
    pub fn new(max_dynamic_size: usize) -> Self {
        Decoder { dynamic: DynamicTable::new(max_dynamic_size), huffman: DecodeTree::build() }
    }

    pub fn dynamic_table(&self) -> &DynamicTable {
        &self.dynamic
    }

    pub fn set_protocol_max_size(&mut self, max: usize) -> Result<(), HpackError> {
        self.dynamic.set_max_size(max)
    }

    /// Decodes one full header block into an ordered list of fields.
    pub fn decode_block(&mut self, input: &[u8]) -> Result<Vec<DecodedField>, HpackError> {
        let mut out = Vec::new();
        let mut pos = 0usize;
        let mut seen_header_field = false;

        while pos < input.len() {
            let first = input[pos];
            if first & 0x80 != 0 {
                // Indexed header field.
                let (index, used) = varint::decode(&input[pos..], 7)?;
                pos += used;
                if index == 0 {
                    return Err(HpackError::ZeroIndex);
                }
                let (name, value) = resolve_index(index as usize, &self.dynamic)
                    .ok_or(HpackError::IndexOutOfRange)?;
                out.push(DecodedField {
                    name: name.into_owned(),
                    value: value.into_owned(),
                    never_indexed: false,
                });
                seen_header_field = true;
            } else if first & 0x40 != 0 {
                // Literal with incremental indexing.
                let (name, value, used) = self.decode_literal_pair(&input[pos..], 6)?;
                pos += used;
                self.dynamic.add(name.clone(), value.clone());
                out.push(DecodedField { name, value, never_indexed: false });
                seen_header_field = true;
            } else if first & 0x20 != 0 {
                // Dynamic table size update.
                if seen_header_field {
                    return Err(HpackError::SizeUpdateAfterField);
                }
                let (new_max, used) = varint::decode(&input[pos..], 5)?;
                pos += used;
                self.dynamic.set_max_size(new_max as usize)?;
            } else if first & 0x10 != 0 {
                // Literal never indexed.
                let (name, value, used) = self.decode_literal_pair(&input[pos..], 4)?;
                pos += used;
                out.push(DecodedField { name, value, never_indexed: true });
                seen_header_field = true;
            } else {
                // Literal without indexing (top 4 bits are 0000).
                let (name, value, used) = self.decode_literal_pair(&input[pos..], 4)?;
                pos += used;
                out.push(DecodedField { name, value, never_indexed: false });
                seen_header_field = true;
            }
        }

        Ok(out)
    }

    /// Shared literal-field decode: name (indexed or literal) + value
    /// literal. `name_prefix_bits` is 6 for incremental indexing, 4 for the
    /// never-indexed / without-indexing representations.
    fn decode_literal_pair(
        &self,
        buf: &[u8],
        name_prefix_bits: u8,
    ) -> Result<(String, String, usize), HpackError> {
        let (name_index, mut used) = varint::decode(buf, name_prefix_bits)?;
        let name = if name_index == 0 {
            let (s, n) = self.decode_string(&buf[used..])?;
            used += n;
            s
        } else {
            let (n, _) = resolve_index(name_index as usize, &self.dynamic)
                .ok_or(HpackError::IndexOutOfRange)?;
            n.into_owned()
        };
        let (value, n2) = self.decode_string(&buf[used..])?;
        used += n2;
        Ok((name, value, used))
    }

    /// Decodes a single HPACK string literal: huffman flag + 7-bit-prefixed
    /// length + bytes.
    fn decode_string(&self, buf: &[u8]) -> Result<(String, usize), HpackError> {
        if buf.is_empty() {
            return Err(HpackError::Truncated);
        }
        let huffman = buf[0] & 0x80 != 0;
        let (len, used) = varint::decode(buf, 7)?;
        let len = len as usize;
        let total = used + len;
        if total > buf.len() {
            return Err(HpackError::StringLengthOverrun);
        }
        let raw = &buf[used..total];
        let s = if huffman {
            let decoded = self.huffman.decode(raw)?;
            String::from_utf8_lossy(&decoded).into_owned()
        } else {
            String::from_utf8_lossy(raw).into_owned()
        };
        Ok((s, total))
    }
}

#[cfg(test)]
mod tests {
    use super::super::encode::{Encoder, Indexing};
    use super::*;

    #[test]
    fn static_index_only_reference() {
        let mut dec = Decoder::new(4096);
        // index 2 == ":method: GET"
        let fields = dec.decode_block(&[0x82]).unwrap();
        assert_eq!(fields[0].name, ":method");
        assert_eq!(fields[0].value, "GET");
    }

    #[test]
    fn never_indexed_flag_is_propagated_and_not_indexed() {
        let mut enc = Encoder::new(4096);
        let mut out = Vec::new();
        enc.encode("x-secret", "dont-cache-me", Indexing::NeverIndexed, &mut out);
        let mut dec = Decoder::new(4096);
        let fields = dec.decode_block(&out).unwrap();
        assert!(fields[0].never_indexed);
        assert_eq!(dec.dynamic_table().len(), 0);
    }

    #[test]
    fn size_update_after_field_is_error() {
        let mut dec = Decoder::new(4096);
        // 0x82 (indexed :method GET) then 0x3f 0xe1 0x1f (size update)
        let bytes = [0x82u8, 0x3f, 0xe1, 0x1f];
        assert_eq!(dec.decode_block(&bytes), Err(HpackError::SizeUpdateAfterField));
    }

    #[test]
    fn table_size_update_beyond_protocol_max_is_error() {
        let mut dec = Decoder::new(100);
        // Dynamic table size update (001xxxxx) encoding 200 with a 5-bit prefix.
        let mut payload = Vec::new();
        super::super::varint::encode_into_first_byte(200, 5, 0x20, &mut payload);
        assert_eq!(dec.decode_block(&payload), Err(HpackError::TableSizeUpdateTooLarge));
    }
}
