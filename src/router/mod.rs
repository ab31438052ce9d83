//! Radix-trie path router (§4.E).

mod middleware;
mod node;
mod pattern;

pub use middleware::{
    run_request_chain, run_response_chain, MiddlewareOutcome, RequestMiddleware, ResponseMiddleware,
};
pub use node::{
    AsyncHandlerFn, HandlerBody, HandlerFn, HandlerKind, PathHandlerEntry, Registered, RouteNode,
    StreamingHandlerFn, WsEndpoint,
};
pub use pattern::{CompiledRoute, CompiledSegment, PatternError, SegPart};

use crate::cors::CorsPolicy;
use crate::method::MethodSet;
use crate::request::PathParam;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingSlashPolicy {
    Strict,
    Normalize,
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectIndicator {
    AddSlash,
    RemoveSlash,
}

/// The outcome of [`Router::route`].
pub struct RouteMatch {
    pub params: Vec<PathParam>,
    pub route: Arc<CompiledRoute>,
    pub cors: Option<Arc<CorsPolicy>>,
    pub handler: Option<Registered>,
    pub method_not_allowed: bool,
    pub redirect: Option<RedirectIndicator>,
    /// Global middleware first, then the route's own, in the order they run
    /// (§4.E "Middleware": global policy gets first refusal).
    pub pre_middleware: Vec<RequestMiddleware>,
    /// The route's own middleware first, then global, in the order they run
    /// (§4.E "Middleware": route amendments land before router-wide ones).
    pub post_middleware: Vec<ResponseMiddleware>,
    pub ws_endpoint: Option<Arc<WsEndpoint>>,
}

pub struct Router {
    root: RouteNode,
    literal_only_routes: FxHashMap<String, Box<RouteNode>>,
    pub trailing_slash_policy: TrailingSlashPolicy,
    pub default_cors: Option<Arc<CorsPolicy>>,
    global_pre_middleware: Vec<RequestMiddleware>,
    global_post_middleware: Vec<ResponseMiddleware>,
}

impl Default for Router {
    fn default() -> Self {
        Router {
            root: RouteNode::new(),
            literal_only_routes: FxHashMap::default(),
            trailing_slash_policy: TrailingSlashPolicy::Strict,
            default_cors: None,
            global_pre_middleware: Vec::new(),
            global_post_middleware: Vec::new(),
        }
    }
}

fn literal_key(segments: &[CompiledSegment]) -> String {
    let mut s = String::from("/");
    let parts: Vec<&str> = segments
        .iter()
        .map(|seg| match seg {
            CompiledSegment::Literal(l) => l.as_str(),
            _ => unreachable!("literal_key called on a non-literal-only route"),
        })
        .collect();
    s.push_str(&parts.join("/"));
    s
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    /// Adds a request hook that runs, in registration order, ahead of every
    /// route's own pre-middleware (§4.E "Middleware").
    pub fn add_request_middleware(&mut self, mw: RequestMiddleware) {
        self.global_pre_middleware.push(mw);
    }

    /// Adds a response hook that runs, in registration order, after every
    /// route's own post-middleware (§4.E "Middleware").
    pub fn add_response_middleware(&mut self, mw: ResponseMiddleware) {
        self.global_post_middleware.push(mw);
    }

    fn locate_node_mut(&mut self, segments: &[CompiledSegment]) -> &mut RouteNode {
        let has_wildcard = segments.iter().any(|s| matches!(s, CompiledSegment::Wildcard));
        let is_literal_only =
            !has_wildcard && segments.iter().all(|s| matches!(s, CompiledSegment::Literal(_)));
        if is_literal_only {
            let key = literal_key(segments);
            self.literal_only_routes.entry(key).or_insert_with(|| Box::new(RouteNode::new()))
        } else {
            let mut cur = &mut self.root;
            for seg in segments {
                cur = cur.child_for(seg);
            }
            cur
        }
    }

    /// Registers `body` under `pattern` for every method in `methods`,
    /// returning a handle the caller can chain `.cors()`/`.before()`/
    /// `.after()`/`.websocket()` off of to attach the route's own policy
    /// and middleware (§4.E "Handler registration").
    pub fn register(
        &mut self,
        pattern: &str,
        methods: MethodSet,
        body: HandlerBody,
    ) -> Result<RouteHandle<'_>, PatternError> {
        let had_slash = pattern.len() > 1 && pattern.ends_with('/');
        let normalized: String =
            if had_slash { pattern[..pattern.len() - 1].to_string() } else { pattern.to_string() };
        let (segments, param_names) = pattern::compile(&normalized)?;
        let has_wildcard = segments.iter().any(|s| matches!(s, CompiledSegment::Wildcard));

        let node = self.locate_node_mut(&segments);

        if let Some(existing) = &node.route {
            if existing.param_names.as_str() != param_names.as_str() {
                return Err(PatternError::ParamNameMismatch);
            }
        }

        let entry = if had_slash { &mut node.handlers_with_slash } else { &mut node.handlers_no_slash };
        entry.set(&methods, body).map_err(PatternError::HandlerConflict)?;

        node.route = Some(Arc::new(CompiledRoute {
            segments: segments.clone(),
            param_names,
            has_wildcard,
            has_no_slash_registered: !node.handlers_no_slash.is_empty(),
            has_with_slash_registered: !node.handlers_with_slash.is_empty(),
        }));
        Ok(RouteHandle { router: self, segments, had_slash })
    }

    pub fn set_cors(&mut self, pattern: &str, policy: Arc<CorsPolicy>) -> Result<(), PatternError> {
        let had_slash = pattern.len() > 1 && pattern.ends_with('/');
        let normalized: String =
            if had_slash { pattern[..pattern.len() - 1].to_string() } else { pattern.to_string() };
        let (segments, _) = pattern::compile(&normalized)?;
        let node = self.locate_node_mut(&segments);
        node.cors = Some(policy);
        Ok(())
    }

    /// Matches `method`/`path` against the trie (§4.E "Match algorithm").
    pub fn route(&self, method: &http::Method, path: &str) -> Option<RouteMatch> {
        let path_had_slash = path.len() > 1 && path.ends_with('/');
        let lookup_path: &str = if path_had_slash
            && matches!(
                self.trailing_slash_policy,
                TrailingSlashPolicy::Normalize | TrailingSlashPolicy::Redirect
            ) {
            &path[..path.len() - 1]
        } else {
            path
        };

        if let Some(node) = self.literal_only_routes.get(lookup_path) {
            return self.resolve_at_node(node, Vec::new(), path_had_slash, method);
        }

        if lookup_path == "/" {
            return self.resolve_at_node(&self.root, Vec::new(), path_had_slash, method);
        }

        let segments: Vec<&str> = lookup_path.trim_start_matches('/').split('/').collect();
        let mut params = Vec::new();
        let node = Self::dfs(&self.root, &segments, 0, &mut params)?;
        self.resolve_at_node(node, params, path_had_slash, method)
    }

    fn dfs<'n>(
        node: &'n RouteNode,
        segments: &[&str],
        idx: usize,
        params: &mut Vec<PathParam>,
    ) -> Option<&'n RouteNode> {
        if idx == segments.len() {
            return if node.route.is_some() { Some(node) } else { None };
        }
        let seg = segments[idx];
        let watermark = params.len();

        if let Some(child) = node.literal_children.get(seg) {
            if let Some(found) = Self::dfs(child, segments, idx + 1, params) {
                return Some(found);
            }
            params.truncate(watermark);
        }

        for (pattern_seg, child) in &node.dynamic_children {
            if let Some(captured) = match_dynamic(pattern_seg, seg) {
                params.extend(captured);
                if let Some(found) = Self::dfs(child, segments, idx + 1, params) {
                    return Some(found);
                }
                params.truncate(watermark);
            }
        }

        if let Some(wc) = &node.wildcard_child {
            let rest = segments[idx..].join("/");
            params.push(PathParam { key: "*".to_string(), value: rest });
            if wc.route.is_some() {
                return Some(wc);
            }
            params.truncate(watermark);
        }

        None
    }

    fn resolve_at_node(
        &self,
        node: &RouteNode,
        params: Vec<PathParam>,
        path_had_slash: bool,
        method: &http::Method,
    ) -> Option<RouteMatch> {
        let (entry, redirect) = self.select_variant(node, path_had_slash)?;

        let route = node.route.clone()?;
        let cors = node.cors.clone().or_else(|| self.default_cors.clone());

        let handler = entry.and_then(|e| {
            e.get(method).cloned().or_else(|| {
                if *method == http::Method::HEAD {
                    e.get(&http::Method::GET).cloned()
                } else {
                    None
                }
            })
        });

        let method_not_allowed = entry.is_some() && handler.is_none() && redirect.is_none();

        let mut pre_middleware = self.global_pre_middleware.clone();
        let mut post_middleware = Vec::new();
        let ws_endpoint = entry.and_then(|e| e.ws_endpoint.clone());
        if let Some(e) = entry {
            pre_middleware.extend(e.pre_middleware.iter().cloned());
            post_middleware.extend(e.post_middleware.iter().cloned());
        }
        post_middleware.extend(self.global_post_middleware.iter().cloned());

        Some(RouteMatch {
            params,
            route,
            cors,
            handler,
            method_not_allowed,
            redirect,
            pre_middleware,
            post_middleware,
            ws_endpoint,
        })
    }

    /// Picks which slash variant's [`PathHandlerEntry`] applies, per policy
    /// (§4.E step 4).
    fn select_variant<'n>(
        &self,
        node: &'n RouteNode,
        path_had_slash: bool,
    ) -> Option<(Option<&'n PathHandlerEntry>, Option<RedirectIndicator>)> {
        let (primary, other) = if path_had_slash {
            (&node.handlers_with_slash, &node.handlers_no_slash)
        } else {
            (&node.handlers_no_slash, &node.handlers_with_slash)
        };

        match self.trailing_slash_policy {
            TrailingSlashPolicy::Strict => {
                if primary.is_empty() && other.is_empty() {
                    None
                } else {
                    Some((Some(primary), None))
                }
            }
            TrailingSlashPolicy::Normalize => {
                if !primary.is_empty() {
                    Some((Some(primary), None))
                } else if !other.is_empty() {
                    Some((Some(other), None))
                } else {
                    None
                }
            }
            TrailingSlashPolicy::Redirect => {
                if !primary.is_empty() {
                    Some((Some(primary), None))
                } else if !other.is_empty() {
                    let indicator = if path_had_slash {
                        RedirectIndicator::RemoveSlash
                    } else {
                        RedirectIndicator::AddSlash
                    };
                    Some((None, Some(indicator)))
                } else {
                    None
                }
            }
        }
    }

    /// Union of methods registered (any handler kind) at the matched
    /// variant, with no HEAD synthesis (§4.E "allowedMethods").
    pub fn allowed_methods(&self, path: &str) -> MethodSet {
        let path_had_slash = path.len() > 1 && path.ends_with('/');
        let node = if let Some(n) = self.literal_only_routes.get(path) {
            Some(&**n)
        } else if path == "/" {
            Some(&self.root)
        } else {
            let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
            let mut params = Vec::new();
            Self::dfs(&self.root, &segments, 0, &mut params)
        };
        match node.and_then(|n| self.select_variant(n, path_had_slash)) {
            Some((Some(entry), _)) => entry.methods.clone(),
            _ => MethodSet::new(),
        }
    }

    /// Renders the trie as a textual tree for diagnostics (§4.E "State
    /// printing").
    pub fn print_state(&self) -> String {
        let mut out = String::new();
        out.push_str("/\n");
        Self::print_node(&self.root, 1, &mut out);
        if !self.literal_only_routes.is_empty() {
            out.push_str("literal_only:\n");
            let mut keys: Vec<&String> = self.literal_only_routes.keys().collect();
            keys.sort();
            for k in keys {
                let n = &self.literal_only_routes[k];
                out.push_str(&format!(
                    "  {} [no_slash={} with_slash={}]\n",
                    k,
                    !n.handlers_no_slash.is_empty(),
                    !n.handlers_with_slash.is_empty()
                ));
            }
        }
        out
    }

    fn print_node(node: &RouteNode, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        for (lit, child) in &node.literal_children {
            out.push_str(&format!(
                "{indent}/{lit} [no_slash={} with_slash={}]\n",
                !child.handlers_no_slash.is_empty(),
                !child.handlers_with_slash.is_empty()
            ));
            Self::print_node(child, depth + 1, out);
        }
        for (seg, child) in &node.dynamic_children {
            out.push_str(&format!("{indent}/{} (dynamic)\n", seg.edge_key()));
            Self::print_node(child, depth + 1, out);
        }
        if let Some(wc) = &node.wildcard_child {
            out.push_str(&format!("{indent}/* (wildcard)\n"));
            Self::print_node(wc, depth + 1, out);
        }
    }
}

/// Fluent handle returned by [`Router::register`] for attaching the route's
/// own CORS policy, middleware, and WebSocket endpoint (§4.E "Handler
/// registration"). Each call re-locates the target node rather than holding
/// a live borrow into the trie across the chain.
pub struct RouteHandle<'r> {
    router: &'r mut Router,
    segments: Vec<CompiledSegment>,
    had_slash: bool,
}

impl<'r> RouteHandle<'r> {
    fn node_mut(&mut self) -> &mut RouteNode {
        self.router.locate_node_mut(&self.segments)
    }

    fn entry_mut(&mut self) -> &mut PathHandlerEntry {
        let had_slash = self.had_slash;
        let node = self.node_mut();
        if had_slash {
            &mut node.handlers_with_slash
        } else {
            &mut node.handlers_no_slash
        }
    }

    pub fn cors(mut self, policy: Arc<CorsPolicy>) -> Self {
        self.node_mut().cors = Some(policy);
        self
    }

    /// Adds a request hook scoped to this route, running after any global
    /// pre-middleware (§4.E "Middleware").
    pub fn before(mut self, mw: RequestMiddleware) -> Self {
        self.entry_mut().push_pre_middleware(mw);
        self
    }

    /// Adds a response hook scoped to this route, running before any global
    /// post-middleware (§4.E "Middleware").
    pub fn after(mut self, mw: ResponseMiddleware) -> Self {
        self.entry_mut().push_post_middleware(mw);
        self
    }

    /// Marks this route as a WebSocket upgrade endpoint (§3).
    pub fn websocket(mut self, endpoint: WsEndpoint) -> Self {
        self.entry_mut().set_ws_endpoint(Arc::new(endpoint));
        self
    }
}

/// Matches one path segment against a compiled dynamic pattern, returning
/// the captured `(name, value)` pairs on success.
fn match_dynamic(pattern: &CompiledSegment, input: &str) -> Option<Vec<PathParam>> {
    let CompiledSegment::Dynamic(parts) = pattern else { return None };
    let mut params = Vec::new();
    let mut rest = input;

    for (i, part) in parts.iter().enumerate() {
        match part {
            SegPart::Literal(lit) => {
                rest = rest.strip_prefix(lit.as_str())?;
            }
            SegPart::Param(name) => {
                let captured = match parts.get(i + 1) {
                    Some(SegPart::Literal(next_lit)) => {
                        let at = rest.find(next_lit.as_str())?;
                        let (cap, remainder) = rest.split_at(at);
                        rest = remainder;
                        cap
                    }
                    _ => {
                        let cap = rest;
                        rest = "";
                        cap
                    }
                };
                if captured.is_empty() {
                    return None;
                }
                let key = if name.is_empty() { params.len().to_string() } else { name.clone() };
                params.push(PathParam { key, value: captured.to_string() });
            }
        }
    }
    if rest.is_empty() {
        Some(params)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::response::Response;
    use std::sync::Arc;

    fn noop_body() -> HandlerBody {
        HandlerBody::Normal(Arc::new(|_req| Response::new()))
    }

    fn streaming_body() -> HandlerBody {
        HandlerBody::Streaming(Arc::new(|_req, _writer, _sink| {}))
    }

    fn methods(ms: &[http::Method]) -> MethodSet {
        let mut s = MethodSet::new();
        for m in ms {
            s.insert(m);
        }
        s
    }

    #[test]
    fn literal_route_matches() {
        let mut r = Router::new();
        r.register("/health", methods(&[http::Method::GET]), noop_body()).unwrap();
        let m = r.route(&http::Method::GET, "/health").unwrap();
        assert!(m.handler.is_some());
        assert!(m.params.is_empty());
    }

    #[test]
    fn named_param_capture_via_dfs() {
        let mut r = Router::new();
        r.register("/users/{id}", methods(&[http::Method::GET]), noop_body()).unwrap();
        let m = r.route(&http::Method::GET, "/users/42").unwrap();
        assert_eq!(m.params[0].key, "id");
        assert_eq!(m.params[0].value, "42");
    }

    #[test]
    fn s4_literal_beats_dynamic_beats_wildcard() {
        let mut r = Router::new();
        r.register("/files/report.txt", methods(&[http::Method::GET]), noop_body()).unwrap();
        r.register("/files/{name}", methods(&[http::Method::GET]), noop_body()).unwrap();
        r.register("/files/*", methods(&[http::Method::GET]), noop_body()).unwrap();

        let m1 = r.route(&http::Method::GET, "/files/report.txt").unwrap();
        assert!(m1.params.is_empty(), "literal child must win over dynamic/wildcard");

        let m2 = r.route(&http::Method::GET, "/files/other.txt").unwrap();
        assert_eq!(m2.params[0].value, "other.txt");

        let m3 = r.route(&http::Method::GET, "/files/a/b/c").unwrap();
        assert_eq!(m3.params[0].value, "a/b/c");
    }

    #[test]
    fn head_falls_back_to_get() {
        let mut r = Router::new();
        r.register("/x", methods(&[http::Method::GET]), noop_body()).unwrap();
        let m = r.route(&http::Method::HEAD, "/x").unwrap();
        assert!(m.handler.is_some());
    }

    #[test]
    fn method_not_allowed_is_flagged() {
        let mut r = Router::new();
        r.register("/x", methods(&[http::Method::GET]), noop_body()).unwrap();
        let m = r.route(&http::Method::POST, "/x").unwrap();
        assert!(m.handler.is_none());
        assert!(m.method_not_allowed);
    }

    #[test]
    fn trailing_slash_strict_requires_exact_variant() {
        let mut r = Router::new();
        r.register("/a", methods(&[http::Method::GET]), noop_body()).unwrap();
        r.trailing_slash_policy = TrailingSlashPolicy::Strict;
        assert!(r.route(&http::Method::GET, "/a/").is_none());
    }

    #[test]
    fn trailing_slash_redirect_signals_add_slash() {
        let mut r = Router::new();
        r.trailing_slash_policy = TrailingSlashPolicy::Redirect;
        // Registered only with a trailing slash; a bare request should be
        // told to add one.
        r.register("/a/", methods(&[http::Method::GET]), noop_body()).unwrap();
        let m = r.route(&http::Method::GET, "/a").unwrap();
        assert!(m.handler.is_none());
        assert_eq!(m.redirect, Some(RedirectIndicator::AddSlash));
    }

    #[test]
    fn trailing_slash_redirect_signals_remove_slash() {
        let mut r = Router::new();
        r.trailing_slash_policy = TrailingSlashPolicy::Redirect;
        // Registered only without a trailing slash; a slashed request
        // should be told to remove it.
        r.register("/a", methods(&[http::Method::GET]), noop_body()).unwrap();
        let m = r.route(&http::Method::GET, "/a/").unwrap();
        assert!(m.handler.is_none());
        assert_eq!(m.redirect, Some(RedirectIndicator::RemoveSlash));
    }

    #[test]
    fn conflicting_handler_kind_is_rejected() {
        let mut r = Router::new();
        r.register("/a", methods(&[http::Method::GET]), noop_body()).unwrap();
        let err = r.register("/a", methods(&[http::Method::GET]), streaming_body()).unwrap_err();
        assert!(matches!(err, PatternError::HandlerConflict(_)));
    }

    #[test]
    fn allowed_methods_union_without_head_synthesis() {
        let mut r = Router::new();
        r.register("/a", methods(&[http::Method::GET]), noop_body()).unwrap();
        r.register("/a", methods(&[http::Method::POST]), noop_body()).unwrap();
        let allowed = r.allowed_methods("/a");
        assert!(allowed.contains(&http::Method::GET));
        assert!(allowed.contains(&http::Method::POST));
        assert!(!allowed.contains(&http::Method::HEAD));
    }

    #[test]
    fn route_handle_before_runs_ahead_of_global_and_can_short_circuit() {
        let mut r = Router::new();
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let go = order.clone();
        r.add_request_middleware(Arc::new(move |_req| {
            go.lock().unwrap().push("global");
            MiddlewareOutcome::Continue
        }));
        let ro = order.clone();
        r.register("/a", methods(&[http::Method::GET]), noop_body())
            .unwrap()
            .before(Arc::new(move |_req| {
                ro.lock().unwrap().push("route");
                MiddlewareOutcome::Continue
            }));
        let m = r.route(&http::Method::GET, "/a").unwrap();
        assert_eq!(m.pre_middleware.len(), 2);
        for mw in &m.pre_middleware {
            let mut req = sample_request();
            assert!(matches!(mw(&mut req), MiddlewareOutcome::Continue));
        }
        assert_eq!(*order.lock().unwrap(), vec!["global", "route"]);
    }

    #[test]
    fn route_handle_after_runs_ahead_of_global_post_middleware() {
        let mut r = Router::new();
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let go = order.clone();
        r.add_response_middleware(Arc::new(move |_req, _resp| {
            go.lock().unwrap().push("global");
        }));
        let ro = order.clone();
        r.register("/a", methods(&[http::Method::GET]), noop_body())
            .unwrap()
            .after(Arc::new(move |_req, _resp| {
                ro.lock().unwrap().push("route");
            }));
        let m = r.route(&http::Method::GET, "/a").unwrap();
        let req = sample_request();
        let mut resp = Response::new();
        for mw in &m.post_middleware {
            mw(&req, &mut resp);
        }
        assert_eq!(*order.lock().unwrap(), vec!["route", "global"]);
    }

    #[test]
    fn route_handle_cors_and_websocket_attach_to_the_route() {
        let mut r = Router::new();
        let policy = Arc::new(crate::cors::CorsPolicy::new().allow_origin("https://x.example"));
        r.register("/ws", methods(&[http::Method::GET]), noop_body())
            .unwrap()
            .cors(policy)
            .websocket(WsEndpoint {
                supported_protocols: crate::concat::ConcatList::new(),
                deflate_params: None,
            });
        let m = r.route(&http::Method::GET, "/ws").unwrap();
        assert!(m.cors.is_some());
        assert!(m.ws_endpoint.is_some());
    }

    fn sample_request() -> Request {
        Request {
            method: http::Method::GET,
            uri: "/".parse().unwrap(),
            version: http::Version::HTTP_11,
            headers: crate::headers::HeaderIndex::new(),
            body: crate::buf::Payload::Empty,
            params: Vec::new(),
        }
    }
}
