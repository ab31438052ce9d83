#![cfg_attr(test, deny(rust_2018_idioms))]

//! # tidepool
//!
//! A single-threaded, event-driven HTTP/1.1 server core: an epoll-style
//! reactor built on [`mio`], a radix-tree router, an HPACK codec for
//! intermediaries that need to pass compressed header blocks through, a
//! CORS policy engine, and permessage-deflate for WebSocket upgrades.
//!
//! tidepool is a lower-level building block, not an application framework:
//! it owns the connection lifecycle, request parsing, and response framing,
//! and leaves routing decisions and business logic to handlers registered
//! on a [`router::Router`].
//!
//! ## Shape
//!
//! - [`buf`] — growable buffers and the request/response body [`buf::Payload`] union.
//! - [`concat`] — flat, separator-joined token lists used in place of `Vec<String>`.
//! - [`headers`] — the case-insensitive header index shared by requests and responses.
//! - [`hpack`] — RFC 7541 header compression, used for the HPACK-over-H1 passthrough mode.
//! - [`cors`] — the CORS preflight/simple-request policy engine.
//! - [`router`] — the radix-tree path router.
//! - [`http1`] — request-line/header parsing and body framing over HTTP/1.1.
//! - [`response`] — the buffered response builder and finalizer.
//! - [`transport`] — the plain/TLS transport abstraction.
//! - [`reactor`] — the single-threaded connection event loop and lifecycle.
//! - [`encoding`] — content-coding negotiation and decompression.
//! - [`ws`] — permessage-deflate for WebSocket frames.
//! - [`config`] — server-wide configuration.

pub use crate::error::{Error, Result};

pub mod buf;
pub mod concat;
pub mod config;
pub mod cors;
mod date;
pub mod encoding;
mod error;
pub mod headers;
pub mod hpack;
pub mod http1;
pub mod method;
pub mod reactor;
mod request;
pub mod response;
pub mod router;
pub mod transport;
pub mod ws;

pub use crate::request::{PathParam, Request};

#[doc(no_inline)]
pub use http::{Method, StatusCode, Uri, Version};
