//! Single-threaded connection event loop (§4.I).
//!
//! One [`Reactor`] owns one `mio::Poll`, one listening socket, and the
//! connection map for everything accepted from it. A host process wanting
//! more parallelism runs several reactors, each on its own thread, over a
//! `SO_REUSEPORT` listener (see [`fanout`]).

mod connection;
mod fanout;

pub use connection::{Connection, ShouldClose};
pub use fanout::spawn_fanout;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, RawWaker, RawWakerVTable};
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll as MioPoll, Token, Waker};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::config::{Config, MutableConfig};
use crate::cors::{CorsPolicy, PreflightOutcome};
use crate::encoding::{self, Coding, DecodeGuards};
use crate::error::Error;
use crate::http1::{self, BodyFraming, ChunkedStatus, ExpectAction, ParseStatus};
use crate::request::{PathParam, Request};
use crate::response::{Response, StreamingWriter};
use crate::router::{self, HandlerBody, RedirectIndicator, ResponseMiddleware, Router, StreamingHandlerFn};
use crate::transport::{PlainTransport, Transport};

const LISTENER_TOKEN: Token = Token(0);
const WAKE_TOKEN: Token = Token(1);
const FIRST_CONN_TOKEN: usize = 2;

/// One of the four states a reactor moves through over its lifetime (§3
/// "Lifecycle state").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Running,
    Draining,
    Stopping,
}

/// Mutable state handed to a posted update closure; closures mutate through
/// this view rather than the whole [`Reactor`] so a hot-update cannot reach
/// into connection state (§4.I "Config and router hot-updates").
pub struct UpdateContext<'a> {
    pub mutable: &'a mut MutableConfig,
    pub router: &'a mut Arc<Router>,
}

pub type UpdateClosure = Box<dyn FnOnce(&mut UpdateContext<'_>) + Send>;

pub struct Reactor {
    poll: MioPoll,
    listener: TcpListener,
    waker: Arc<Waker>,
    connections: FxHashMap<Token, Connection>,
    next_token: usize,
    router: Arc<Router>,
    config: Config,
    lifecycle: Lifecycle,
    drain_deadline: Option<Instant>,
    pending_updates: Arc<Mutex<Vec<UpdateClosure>>>,
    decode_guards: DecodeGuards,
    pending_async: Vec<PendingAsync>,
    #[cfg(feature = "tls")]
    tls_config: Option<Arc<rustls::ServerConfig>>,
}

/// A [`HandlerKind::Async`](crate::router::HandlerKind::Async) call still
/// awaiting its future, held across event-loop ticks (§1 "coroutine-style...
/// handlers").
///
/// Polled once per tick from [`Reactor::poll_pending_async`] with a no-op
/// waker: this is a busy-poll scheduler, not a real reactor integration —
/// a future that only becomes ready on external I/O readiness (as opposed
/// to one that's simply CPU-bound or waiting on a timer already elapsed)
/// will not be woken early, only re-polled on the next tick.
struct PendingAsync {
    token: Token,
    request: Request,
    cors: Option<Arc<CorsPolicy>>,
    post_middleware: Vec<ResponseMiddleware>,
    future: Pin<Box<dyn Future<Output = Response> + Send>>,
}

fn noop_raw_waker() -> RawWaker {
    fn no_op(_: *const ()) {}
    fn clone_waker(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_waker, no_op, no_op, no_op);
    RawWaker::new(std::ptr::null(), &VTABLE)
}

fn noop_waker() -> std::task::Waker {
    unsafe { std::task::Waker::from_raw(noop_raw_waker()) }
}

/// A handle other threads use to post updates and request a wakeup, without
/// touching reactor-owned state directly.
#[derive(Clone)]
pub struct ReactorHandle {
    waker: Arc<Waker>,
    pending_updates: Arc<Mutex<Vec<UpdateClosure>>>,
}

impl ReactorHandle {
    pub fn post_update(&self, update: UpdateClosure) -> io::Result<()> {
        self.pending_updates.lock().unwrap().push(update);
        self.waker.wake()
    }
}

impl Reactor {
    pub fn new(addr: SocketAddr, router: Arc<Router>, config: Config) -> io::Result<Self> {
        Self::from_listener(TcpListener::bind(addr)?, router, config)
    }

    /// Builds a reactor around an already-bound listener, letting callers
    /// (e.g. [`spawn_fanout`]) hand in a `SO_REUSEPORT` socket prepared with
    /// `socket2` instead of a plain bind.
    pub fn from_listener(mut listener: TcpListener, router: Arc<Router>, config: Config) -> io::Result<Self> {
        let poll = MioPoll::new()?;
        poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);

        #[cfg(feature = "tls")]
        let tls_config = None;

        Ok(Reactor {
            poll,
            listener,
            waker,
            connections: FxHashMap::default(),
            next_token: FIRST_CONN_TOKEN,
            router,
            config,
            lifecycle: Lifecycle::Idle,
            drain_deadline: None,
            pending_updates: Arc::new(Mutex::new(Vec::new())),
            decode_guards: DecodeGuards::default(),
            pending_async: Vec::new(),
            #[cfg(feature = "tls")]
            tls_config,
        })
    }

    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, tls_config: Arc<rustls::ServerConfig>) -> Self {
        self.tls_config = Some(tls_config);
        self
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle { waker: self.waker.clone(), pending_updates: self.pending_updates.clone() }
    }

    /// The address actually bound, useful when constructed with port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Translates SIGINT into a drain with the configured default deadline
    /// (§4.I "Lifecycle"). The host process is responsible for invoking this
    /// from its own signal handling; no signal crate is wired in here.
    pub fn handle_sigint(&mut self) {
        let deadline = self.config.mutable.default_close_deadline;
        self.begin_drain(deadline);
    }

    pub fn begin_drain(&mut self, deadline: Duration) {
        if self.lifecycle == Lifecycle::Stopping {
            return;
        }
        let _ = self.poll.registry().deregister(&mut self.listener);
        self.lifecycle = Lifecycle::Draining;
        self.drain_deadline = Some(Instant::now() + deadline);
        for conn in self.connections.values_mut() {
            if conn.out_buf.is_empty() && conn.should_close == ShouldClose::None {
                conn.should_close = ShouldClose::Drain;
            }
        }
    }

    pub fn stop_immediate(&mut self) {
        self.lifecycle = Lifecycle::Stopping;
        self.connections.clear();
    }

    /// Runs the event loop until [`Lifecycle::Stopping`] is reached with no
    /// connections left.
    pub fn run(&mut self) -> io::Result<()> {
        self.lifecycle = Lifecycle::Running;
        let mut events = Events::with_capacity(1024);
        loop {
            if self.lifecycle == Lifecycle::Stopping && self.connections.is_empty() {
                return Ok(());
            }
            self.drain_pending_updates();
            self.check_drain_deadline();

            let timeout = Some(self.config.mutable.poll_interval);
            match self.poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let tokens: Vec<(Token, bool, bool)> =
                events.iter().map(|e| (e.token(), e.is_readable(), e.is_writable())).collect();

            for (token, readable, writable) in tokens {
                match token {
                    LISTENER_TOKEN => self.accept_all()?,
                    WAKE_TOKEN => {}
                    token => {
                        if readable {
                            self.handle_readable(token);
                        }
                        if writable {
                            self.handle_writable(token);
                        }
                        self.sync_interest(token);
                    }
                }
            }

            self.poll_pending_async();
            self.idle_sweep();
            self.reap_closed();
        }
    }

    fn drain_pending_updates(&mut self) {
        let updates: Vec<UpdateClosure> = std::mem::take(&mut *self.pending_updates.lock().unwrap());
        for update in updates {
            let mut ctx = UpdateContext { mutable: &mut self.config.mutable, router: &mut self.router };
            update(&mut ctx);
        }
    }

    fn check_drain_deadline(&mut self) {
        if self.lifecycle != Lifecycle::Draining {
            return;
        }
        let expired = self.drain_deadline.map(|d| Instant::now() >= d).unwrap_or(false);
        if expired || self.connections.is_empty() {
            self.lifecycle = Lifecycle::Stopping;
        }
    }

    fn accept_all(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => self.register_connection(stream)?,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn register_connection(&mut self, mut stream: TcpStream) -> io::Result<()> {
        stream.set_nodelay(true).ok();
        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll.registry().register(&mut stream, token, Interest::READABLE)?;

        let transport: Box<dyn Transport> = self.make_transport(stream)?;
        let conn = Connection::new(transport, Instant::now());
        self.connections.insert(token, conn);
        Ok(())
    }

    #[cfg(feature = "tls")]
    fn make_transport(&self, stream: TcpStream) -> io::Result<Box<dyn Transport>> {
        match &self.tls_config {
            Some(cfg) => {
                let tls = crate::transport::tls::TlsTransport::new(stream, cfg.clone())
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(Box::new(tls))
            }
            None => Ok(Box::new(PlainTransport::new(stream))),
        }
    }

    #[cfg(not(feature = "tls"))]
    fn make_transport(&self, stream: TcpStream) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(PlainTransport::new(stream)))
    }

    /// Adds or drops `WRITABLE` interest to match `waiting_writable`, so a
    /// connection that buffered a partial write gets polled for the next
    /// writable edge instead of sitting forever (§4.I "Write path").
    fn sync_interest(&mut self, token: Token) {
        let registry = self.poll.registry();
        let Some(conn) = self.connections.get_mut(&token) else { return };
        let interest = if conn.waiting_writable || conn.transport.handshake_pending() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        let _ = conn.transport.reregister(registry, token, interest);
    }

    fn handle_readable(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        let mut scratch = [0u8; 16 * 1024];
        loop {
            let outcome = conn.transport.read(&mut scratch);
            if outcome.bytes > 0 {
                conn.in_buf.append(&scratch[..outcome.bytes]);
                conn.last_activity = Instant::now();
            }
            match outcome.hint {
                crate::transport::Hint::Error => {
                    conn.should_close = ShouldClose::Immediate;
                    break;
                }
                crate::transport::Hint::WantRead | crate::transport::Hint::WantWrite => break,
                crate::transport::Hint::None => {
                    if outcome.bytes == 0 {
                        conn.should_close = ShouldClose::Immediate;
                        break;
                    }
                }
            }
        }

        self.drain_requests(token);
    }

    fn handle_writable(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        conn.flush();
    }

    /// Processes as many complete requests as are buffered, in arrival
    /// order, queueing each response before parsing the next (§5
    /// "Ordering" — no pipelining speculation).
    fn drain_requests(&mut self, token: Token) {
        loop {
            let should_stop = {
                let Some(conn) = self.connections.get_mut(&token) else { return };
                if conn.should_close == ShouldClose::Immediate {
                    return;
                }
                if conn.header_start.is_none() {
                    conn.header_start = Some(Instant::now());
                }
                let max_header_bytes = self.config.mutable.max_header_bytes;
                let max_uri_bytes = self.config.mutable.max_uri_bytes;
                let status = http1::parse_head(conn.in_buf.as_slice(), max_header_bytes, max_uri_bytes);
                match status {
                    ParseStatus::NeedMore => true,
                    ParseStatus::Ok(head) => {
                        conn.header_start = None;
                        let framing = http1::determine_framing(&head.headers);
                        match framing {
                            Ok(BodyFraming::None) => {
                                let consumed = head.consumed;
                                conn.continue_sent = false;
                                self.dispatch_one(token, head, Vec::new());
                                let Some(conn) = self.connections.get_mut(&token) else { return };
                                conn.in_buf.erase_front(consumed);
                                false
                            }
                            Ok(BodyFraming::ContentLength(n)) => {
                                let total = head.consumed + n as usize;
                                if conn.in_buf.len() < total {
                                    if !conn.continue_sent {
                                        match http1::expect_action(&head.headers, n > 0) {
                                            ExpectAction::Send100Continue => {
                                                conn.queue_data(http1::CONTINUE_100);
                                                conn.continue_sent = true;
                                            }
                                            ExpectAction::ExpectationFailed => {
                                                send_status_only(conn, 417);
                                                return;
                                            }
                                            ExpectAction::None => {}
                                        }
                                    }
                                    true
                                } else {
                                    let body = conn.in_buf.as_slice()[head.consumed..total].to_vec();
                                    conn.continue_sent = false;
                                    self.dispatch_one(token, head, body);
                                    let Some(conn) = self.connections.get_mut(&token) else { return };
                                    conn.in_buf.erase_front(total);
                                    false
                                }
                            }
                            Ok(BodyFraming::Chunked) => {
                                match http1::decode_chunked(&conn.in_buf.as_slice()[head.consumed..]) {
                                    Ok(ChunkedStatus::NeedMore) => true,
                                    Ok(ChunkedStatus::Done { body, trailers, consumed: body_consumed }) => {
                                        let total = head.consumed + body_consumed;
                                        let mut head = head;
                                        for (name, value) in trailers {
                                            head.headers.insert(&name, &value);
                                        }
                                        self.dispatch_one(token, head, body);
                                        let Some(conn) = self.connections.get_mut(&token) else { return };
                                        conn.in_buf.erase_front(total);
                                        false
                                    }
                                    Err(e) => {
                                        self.fail_connection(token, &e);
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                self.fail_connection(token, &e);
                                return;
                            }
                        }
                    }
                    ParseStatus::HeaderTooLarge | ParseStatus::Malformed | ParseStatus::UriTooLong
                    | ParseStatus::UnsupportedVersion => {
                        let code = http1::status_for_parse(&status).unwrap_or(400);
                        self.emit_simple_error(token, code);
                        return;
                    }
                }
            };
            if should_stop {
                break;
            }
            let max_requests = self.config.mutable.max_requests_per_connection;
            let Some(conn) = self.connections.get_mut(&token) else { return };
            if conn.requests_served >= max_requests {
                conn.should_close = ShouldClose::Drain;
                break;
            }
            if conn.should_close != ShouldClose::None {
                break;
            }
        }
    }

    fn dispatch_one(&mut self, token: Token, head: http1::ParsedHead, raw_body: Vec<u8>) {
        let mut headers = head.headers;
        let decoded_body = match encoding::decode_inbound(&mut headers, &raw_body, &self.decode_guards) {
            Ok(b) => b,
            Err(_) => {
                self.emit_simple_error(token, 400);
                return;
            }
        };

        let path = head.uri.path().to_string();
        let route_match = self.router.route(&head.method, &path);

        let params: Vec<PathParam> = route_match.as_ref().map(|m| m.params.clone()).unwrap_or_default();
        let mut request = Request {
            method: head.method.clone(),
            uri: head.uri,
            version: head.version,
            headers,
            body: decoded_body.into(),
            params,
        };

        let mut response = Response::new();

        if let Some(m) = &route_match {
            if let Some(cors) = &m.cors {
                let route_methods = self.router.allowed_methods(&path);
                let outcome = cors.handle_preflight(
                    &request.method,
                    &request.headers,
                    Some(&route_methods),
                    &mut response,
                );
                match outcome {
                    PreflightOutcome::Allowed => {
                        self.finish_response(token, &request, response);
                        return;
                    }
                    PreflightOutcome::OriginDenied
                    | PreflightOutcome::MethodDenied
                    | PreflightOutcome::HeadersDenied => {
                        response.status(403);
                        self.finish_response(token, &request, response);
                        return;
                    }
                    PreflightOutcome::NotPreflight => {}
                }
            }
        }

        match route_match {
            None => {
                response.status(404);
                self.finish_response(token, &request, response);
            }
            Some(m) if m.redirect.is_some() => {
                let location = match m.redirect {
                    Some(RedirectIndicator::AddSlash) => format!("{path}/"),
                    Some(RedirectIndicator::RemoveSlash) => path.trim_end_matches('/').to_string(),
                    None => unreachable!(),
                };
                response.status(301);
                response.add_header("location", &location);
                self.finish_response(token, &request, response);
            }
            Some(m) if m.method_not_allowed => {
                response.status(405);
                let allowed = self.router.allowed_methods(&path);
                response.add_header("allow", allowed.joined().as_str());
                self.finish_response(token, &request, response);
            }
            Some(m) => {
                if let Some(mut short_circuited) = router::run_request_chain(&mut request, &m.pre_middleware) {
                    if let Some(cors) = &m.cors {
                        cors.apply_to_response(&request.headers, &mut short_circuited);
                    }
                    router::run_response_chain(&request, &mut short_circuited, &m.post_middleware);
                    self.finish_response(token, &request, short_circuited);
                    return;
                }

                match m.handler {
                    Some(registered) => match registered.body {
                        HandlerBody::Normal(f) => {
                            let mut response =
                                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&request)))
                                    .unwrap_or_else(|_| {
                                        warn!("handler panicked");
                                        let mut r = Response::new();
                                        r.status(500);
                                        r
                                    });
                            if let Some(cors) = &m.cors {
                                cors.apply_to_response(&request.headers, &mut response);
                            }
                            router::run_response_chain(&request, &mut response, &m.post_middleware);
                            self.finish_response(token, &request, response);
                        }
                        HandlerBody::Streaming(f) => {
                            self.dispatch_streaming(token, &request, f, m.cors.clone());
                        }
                        HandlerBody::Async(f) => {
                            let future = f(&request);
                            let pending = PendingAsync {
                                token,
                                request,
                                cors: m.cors.clone(),
                                post_middleware: m.post_middleware.clone(),
                                future,
                            };
                            self.drive_async(pending);
                        }
                    },
                    None => {
                        response.status(404);
                        self.finish_response(token, &request, response);
                    }
                }
            }
        }
    }

    /// Drives one [`HandlerKind::Async`](crate::router::HandlerKind::Async)
    /// call: polls immediately, finishing the request right away if it's
    /// already ready, and otherwise parking it on [`Reactor::pending_async`]
    /// for [`Reactor::poll_pending_async`] to keep polling.
    fn drive_async(&mut self, mut pending: PendingAsync) {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match pending.future.as_mut().poll(&mut cx) {
            Poll::Ready(response) => self.finish_async(pending, response),
            Poll::Pending => self.pending_async.push(pending),
        }
    }

    /// Re-polls every still-pending async call once per event-loop tick
    /// (§1 "coroutine-style... handlers"). Not integrated with mio
    /// readiness: a future parked on external I/O only advances because
    /// this runs every tick, not because anything woke it.
    fn poll_pending_async(&mut self) {
        if self.pending_async.is_empty() {
            return;
        }
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        for mut pending in std::mem::take(&mut self.pending_async) {
            match pending.future.as_mut().poll(&mut cx) {
                Poll::Ready(response) => self.finish_async(pending, response),
                Poll::Pending => self.pending_async.push(pending),
            }
        }
    }

    fn finish_async(&mut self, pending: PendingAsync, mut response: Response) {
        if let Some(cors) = &pending.cors {
            cors.apply_to_response(&pending.request.headers, &mut response);
        }
        router::run_response_chain(&pending.request, &mut response, &pending.post_middleware);
        self.finish_response(pending.token, &pending.request, response);
    }

    /// Drives a [`HandlerKind::Streaming`](crate::router::HandlerKind::Streaming)
    /// handler straight through the connection, bypassing the buffered
    /// [`Response`]/[`finish_response`](Reactor::finish_response) path
    /// entirely (§4.G "Streaming writer"). Response middleware does not run
    /// here: by the time the handler returns, the head and every chunk are
    /// already on the wire, so there is nothing left for a header-mutating
    /// hook to amend. Outbound content-coding likewise does not apply to a
    /// streamed body.
    fn dispatch_streaming(
        &mut self,
        token: Token,
        request: &Request,
        handler: StreamingHandlerFn,
        cors: Option<Arc<CorsPolicy>>,
    ) {
        let mut probe = Response::new();
        if let Some(cors) = &cors {
            cors.apply_to_response(&request.headers, &mut probe);
        }

        let Some(conn) = self.connections.get(&token) else { return };
        let client_wants_close = request
            .headers
            .get("connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(request.version == http::Version::HTTP_10);
        let server_draining = conn.should_close != ShouldClose::None
            || matches!(self.lifecycle, Lifecycle::Draining | Lifecycle::Stopping);
        let keep_alive = !client_wants_close && !server_draining;

        let mut writer = StreamingWriter::new(probe.status_code(), None, probe.headers().clone(), keep_alive);

        let Some(conn) = self.connections.get_mut(&token) else { return };
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler(request, &mut writer, conn);
        }))
        .is_err()
        {
            warn!("streaming handler panicked");
        }
        writer.end(conn);

        conn.requests_served += 1;
        if !keep_alive {
            conn.should_close = ShouldClose::Drain;
        }
    }

    fn finish_response(&mut self, token: Token, request: &Request, mut response: Response) {
        apply_outbound_encoding(request, &mut response);

        let Some(conn) = self.connections.get_mut(&token) else { return };

        let client_wants_close = request
            .headers
            .get("connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(request.version == http::Version::HTTP_10);
        let server_draining = conn.should_close != ShouldClose::None
            || matches!(self.lifecycle, Lifecycle::Draining | Lifecycle::Stopping);
        let keep_alive = !client_wants_close && !server_draining;

        let suppress_body = request.method == http::Method::HEAD;

        let head_bytes = response.finalize(keep_alive, false);
        conn.queue_data(&head_bytes);
        if !suppress_body {
            let body = response.body().view().to_vec();
            if !body.is_empty() {
                conn.queue_data(&body);
            }
        }
        conn.requests_served += 1;
        if !keep_alive {
            conn.should_close = ShouldClose::Drain;
        }
    }

    fn emit_simple_error(&mut self, token: Token, status: u16) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        send_status_only(conn, status);
        conn.should_close = ShouldClose::Drain;
    }

    fn fail_connection(&mut self, token: Token, err: &Error) {
        let status = http1::status_for_error(err);
        warn!(status, error = %err, "closing connection after protocol error");
        self.emit_simple_error(token, status);
    }

    /// Evicts connections past idle/header timeout or over the outbound
    /// buffer cap (§4.I "Idle sweep").
    fn idle_sweep(&mut self) {
        let now = Instant::now();
        let idle_timeout = self.config.mutable.idle_timeout;
        let header_timeout = self.config.mutable.header_timeout;
        let max_outbound = self.config.mutable.max_outbound_buffer_bytes;

        for conn in self.connections.values_mut() {
            if conn.is_idle() && now.duration_since(conn.last_activity) > idle_timeout {
                conn.should_close = ShouldClose::Immediate;
                continue;
            }
            if let Some(start) = conn.header_start {
                if now.duration_since(start) > header_timeout {
                    conn.should_close = ShouldClose::Immediate;
                    continue;
                }
            }
            if conn.out_buf.len() > max_outbound {
                conn.should_close = ShouldClose::Immediate;
            }
        }
    }

    fn reap_closed(&mut self) {
        let to_drop: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, c)| {
                c.should_close == ShouldClose::Immediate
                    || (c.should_close == ShouldClose::Drain && c.out_buf.is_empty() && !c.waiting_writable)
            })
            .map(|(t, _)| *t)
            .collect();
        for token in to_drop {
            if let Some(conn) = self.connections.remove(&token) {
                debug!(requests = conn.requests_served, "connection closed");
            }
        }
    }
}

/// Queues a bare, bodyless status response (parse failures, 417 expectation
/// failures — cases with no [`Request`] worth building).
fn send_status_only(conn: &mut Connection, status: u16) {
    let mut resp = Response::new();
    resp.status(status);
    resp.set_body(crate::buf::Payload::Empty);
    let bytes = resp.finalize(false, false);
    conn.queue_data(&bytes);
}

/// Negotiates and applies outbound content-coding to a response body not
/// already carrying an explicit `Content-Encoding` (§4.J "Outbound").
/// File-backed bodies are left alone: their length is pinned to the file
/// range and compressing them would require streaming support this core
/// doesn't provide.
fn apply_outbound_encoding(request: &Request, response: &mut Response) {
    if response.header("content-encoding").is_some() || response.body().is_file() {
        return;
    }
    match encoding::negotiate_outbound(&request.headers) {
        None => {
            if !response.body().is_empty() {
                response.status(406);
                response.set_body(crate::buf::Payload::Empty);
            }
        }
        Some(Coding::Identity) => {}
        Some(coding) => {
            if response.body().is_empty() {
                return;
            }
            let raw = response.body().view().to_vec();
            if let Some(compressed) = compress_body(coding, &raw) {
                response.set_body(crate::buf::Payload::from(compressed));
                if let Some(token) = coding.header_value() {
                    response.add_header("content-encoding", token);
                }
            }
            response.merge_vary_token("Accept-Encoding");
        }
    }
}

fn compress_body(coding: Coding, data: &[u8]) -> Option<Vec<u8>> {
    use std::io::Write;
    match coding {
        Coding::Gzip => {
            let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(data).ok()?;
            enc.finish().ok()
        }
        Coding::Deflate => {
            let mut enc = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(data).ok()?;
            enc.finish().ok()
        }
        Coding::Identity => None,
    }
}
