//! Content-coding negotiation and decompression pipeline (§4.J).

mod inbound;
mod negotiate;

pub use inbound::{decode_inbound, DecodeGuards};
pub use negotiate::{negotiate_outbound, Coding};
