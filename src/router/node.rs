//! Trie node storage (§4.E "Router entities").

use super::middleware::{RequestMiddleware, ResponseMiddleware};
use super::pattern::{CompiledRoute, CompiledSegment};
use crate::method::MethodSet;
use crate::request::Request;
use crate::response::{ChunkSink, Response, StreamingWriter};
use rustc_hash::FxHashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The kind of handler registered for a method, used to reject accidental
/// kind conflicts at registration and to pick the dispatch path (§4.E
/// "Handler registration").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Normal,
    Streaming,
    Async,
}

pub type HandlerFn = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Produces a response incrementally via a [`StreamingWriter`] instead of
/// returning one (§4.G "Streaming writer").
pub type StreamingHandlerFn = Arc<dyn Fn(&Request, &mut StreamingWriter, &mut dyn ChunkSink) + Send + Sync>;

/// Produces a response from a boxed future, driven cooperatively by the
/// reactor's event loop instead of blocking it (§1 "coroutine-style...
/// handlers").
pub type AsyncHandlerFn =
    Arc<dyn Fn(&Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

/// The handler stored for one registered method, tagged by the calling
/// convention the reactor must use to drive it.
#[derive(Clone)]
pub enum HandlerBody {
    Normal(HandlerFn),
    Streaming(StreamingHandlerFn),
    Async(AsyncHandlerFn),
}

impl HandlerBody {
    pub fn kind(&self) -> HandlerKind {
        match self {
            HandlerBody::Normal(_) => HandlerKind::Normal,
            HandlerBody::Streaming(_) => HandlerKind::Streaming,
            HandlerBody::Async(_) => HandlerKind::Async,
        }
    }
}

#[derive(Clone)]
pub struct Registered {
    pub kind: HandlerKind,
    pub body: HandlerBody,
}

/// Marks a route as a WebSocket upgrade endpoint (§3: "`PathHandlerEntry`...
/// also carries an optional WebSocket endpoint"). Frame parsing, opcodes,
/// and callback dispatch are out of scope; this carries only what the
/// HTTP-level upgrade handshake needs — the subprotocols this endpoint
/// accepts, in preference order, and the permessage-deflate parameters to
/// negotiate.
#[derive(Debug, Clone)]
pub struct WsEndpoint {
    pub supported_protocols: crate::concat::ConcatList<crate::concat::CommaSpace>,
    pub deflate_params: Option<crate::ws::deflate::Params>,
}

/// Per-method handler storage for one trailing-slash variant of a node.
#[derive(Default, Clone)]
pub struct PathHandlerEntry {
    pub methods: MethodSet,
    by_method: Vec<(http::Method, Registered)>,
    pub pre_middleware: Vec<RequestMiddleware>,
    pub post_middleware: Vec<ResponseMiddleware>,
    pub ws_endpoint: Option<Arc<WsEndpoint>>,
}

impl PathHandlerEntry {
    pub fn new() -> Self {
        PathHandlerEntry::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty()
    }

    pub fn get(&self, method: &http::Method) -> Option<&Registered> {
        self.by_method.iter().find(|(m, _)| m == method).map(|(_, r)| r)
    }

    /// Registers `body` for every method set in `methods`. Returns an error
    /// message if a different [`HandlerKind`] is already registered for any
    /// selected method; re-registration with the *same* kind replaces the
    /// prior handler.
    pub fn set(&mut self, methods: &MethodSet, body: HandlerBody) -> Result<(), &'static str> {
        let kind = body.kind();
        for m in methods.iter() {
            if let Some(existing) = self.get(m) {
                if existing.kind != kind {
                    return Err("a different handler kind is already registered for this method");
                }
            }
        }
        for m in methods.iter() {
            self.methods.insert(m);
            let registered = Registered { kind, body: body.clone() };
            if let Some(slot) = self.by_method.iter_mut().find(|(em, _)| em == m) {
                slot.1 = registered;
            } else {
                self.by_method.push((m.clone(), registered));
            }
        }
        Ok(())
    }

    pub fn push_pre_middleware(&mut self, mw: RequestMiddleware) {
        self.pre_middleware.push(mw);
    }

    pub fn push_post_middleware(&mut self, mw: ResponseMiddleware) {
        self.post_middleware.push(mw);
    }

    pub fn set_ws_endpoint(&mut self, endpoint: Arc<WsEndpoint>) {
        self.ws_endpoint = Some(endpoint);
    }
}

/// One node of the path trie.
#[derive(Default)]
pub struct RouteNode {
    pub literal_children: FxHashMap<String, Box<RouteNode>>,
    pub dynamic_children: Vec<(CompiledSegment, Box<RouteNode>)>,
    pub wildcard_child: Option<Box<RouteNode>>,
    pub handlers_no_slash: PathHandlerEntry,
    pub handlers_with_slash: PathHandlerEntry,
    pub route: Option<Arc<CompiledRoute>>,
    pub cors: Option<Arc<crate::cors::CorsPolicy>>,
}

impl RouteNode {
    pub fn new() -> Self {
        RouteNode::default()
    }

    pub fn child_for(&mut self, segment: &CompiledSegment) -> &mut RouteNode {
        match segment {
            CompiledSegment::Literal(lit) => {
                self.literal_children.entry(lit.clone()).or_insert_with(|| Box::new(RouteNode::new()))
            }
            CompiledSegment::Wildcard => {
                if self.wildcard_child.is_none() {
                    self.wildcard_child = Some(Box::new(RouteNode::new()));
                }
                self.wildcard_child.as_mut().unwrap()
            }
            CompiledSegment::Dynamic(_) => {
                let key = segment.edge_key();
                if let Some(pos) = self.dynamic_children.iter().position(|(s, _)| s.edge_key() == key)
                {
                    &mut self.dynamic_children[pos].1
                } else {
                    self.dynamic_children.push((segment.clone(), Box::new(RouteNode::new())));
                    &mut self.dynamic_children.last_mut().unwrap().1
                }
            }
        }
    }
}
