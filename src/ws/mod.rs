//! permessage-deflate compression contract for WebSocket payloads (§4, §6).
//! WebSocket frame parsing itself is out of scope.

pub mod deflate;
