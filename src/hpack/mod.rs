//! HPACK (RFC 7541) header compression — static + dynamic table, integer and
//! string literal coding, Huffman, and the full encode/decode block loop
//! (§4.C). Tables are strictly per-connection (§5).

mod decode;
mod encode;
mod huffman;
mod table;
mod varint;

pub use decode::Decoder;
pub use encode::{Encoder, Indexing};
pub use table::{DynamicTable, STATIC_TABLE, STATIC_TABLE_LEN};

/// A single decoded header field plus its never-indexed flag (the flag must
/// be propagated downstream, e.g. to intermediaries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedField {
    pub name: String,
    pub value: String,
    pub never_indexed: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HpackError {
    #[error("reference to HPACK index 0")]
    ZeroIndex,
    #[error("HPACK index out of range")]
    IndexOutOfRange,
    #[error("malformed HPACK integer: {0}")]
    Integer(#[from] varint::IntError),
    #[error("huffman decode error: {0}")]
    Huffman(#[from] huffman::HuffmanError),
    #[error("declared string length exceeds remaining input")]
    StringLengthOverrun,
    #[error("dynamic table size update appeared after a header field in this block")]
    SizeUpdateAfterField,
    #[error("dynamic table size update exceeds the protocol-announced maximum")]
    TableSizeUpdateTooLarge,
    #[error("truncated HPACK block")]
    Truncated,
}

#[cfg(test)]
mod roundtrip_tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip_preserves_order() {
        let fields = vec![
            (":method", "GET"),
            (":path", "/foo/bar"),
            ("x-custom", "value-one"),
            ("x-custom", "value-two"),
        ];
        let mut enc = Encoder::new(4096);
        let mut out = Vec::new();
        for (n, v) in &fields {
            enc.encode(n, v, Indexing::WithIncremental, &mut out);
        }
        let mut dec = Decoder::new(4096);
        let decoded = dec.decode_block(&out).unwrap();
        let got: Vec<(&str, &str)> =
            decoded.iter().map(|f| (f.name.as_str(), f.value.as_str())).collect();
        assert_eq!(got, fields);
    }

    #[test]
    fn rfc_c2_1_literal_with_incremental_indexing_no_huffman() {
        // RFC 7541 C.2.1
        let expected: [u8; 26] = [
            0x40, 0x0a, 0x63, 0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x6b, 0x65, 0x79, 0x0d, 0x63,
            0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x68, 0x65, 0x61, 0x64, 0x65, 0x72,
        ];
        let mut enc = Encoder::new(4096);
        enc.set_huffman(false);
        let mut out = Vec::new();
        enc.encode("custom-key", "custom-header", Indexing::WithIncremental, &mut out);
        assert_eq!(out, expected);

        let mut dec = Decoder::new(4096);
        let fields = dec.decode_block(&expected).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "custom-key");
        assert_eq!(fields[0].value, "custom-header");
        assert_eq!(dec.dynamic_table().current_size(), 55);
    }

    #[test]
    fn index_zero_is_rejected() {
        let mut dec = Decoder::new(4096);
        // 0x80 == indexed field representation with index 0.
        assert_eq!(dec.decode_block(&[0x80]), Err(HpackError::ZeroIndex));
    }
}
