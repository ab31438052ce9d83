//! End-to-end scenarios over a live reactor and real TCP sockets (`spec.md`
//! §8's literal S1-S5; S6, the HPACK RFC 7541 C.2.1 sample, is covered as a
//! unit test in `hpack::mod`).

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use tidepool::config::{Config, ImmutableConfig};
use tidepool::cors::CorsPolicy;
use tidepool::method::MethodSet;
use tidepool::reactor::Reactor;
use tidepool::response::Response;
use tidepool::Request;
use tidepool::router::{HandlerBody, Router};

fn immutable(port: u16) -> ImmutableConfig {
    ImmutableConfig {
        port,
        bind_address: "127.0.0.1".parse().unwrap(),
        reuse_port: false,
        #[cfg(feature = "tls")]
        tls: None,
    }
}

fn methods(ms: &[http::Method]) -> MethodSet {
    let mut s = MethodSet::new();
    for m in ms {
        s.insert(m);
    }
    s
}

/// Builds a router, starts a reactor on an ephemeral port in a background
/// thread, and returns the address it's listening on.
fn start_server(router: Router) -> SocketAddr {
    let config = Config::new(immutable(0));
    let mut reactor = Reactor::new("127.0.0.1:0".parse().unwrap(), Arc::new(router), config).unwrap();
    let addr = reactor.local_addr().unwrap();
    std::thread::spawn(move || {
        reactor.run().unwrap();
    });
    addr
}

fn send_and_read(addr: SocketAddr, request: &[u8], read_timeout: Duration) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(read_timeout)).unwrap();
    stream.write_all(request).unwrap();
    let mut out = Vec::new();
    let mut scratch = [0u8; 4096];
    loop {
        match stream.read(&mut scratch) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&scratch[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => panic!("read error: {e}"),
        }
    }
    out
}

fn text_handler(body: &'static str) -> HandlerBody {
    HandlerBody::Normal(Arc::new(move |_req: &Request| -> Response {
        let mut r = Response::new();
        r.set_body(tidepool::buf::Payload::from(body));
        r
    }))
}

/// S1 - pipelined GET with keep-alive, then a second request asking to close.
#[test]
fn s1_pipelined_keep_alive_then_close() {
    let mut router = Router::new();
    router.register("/a", methods(&[http::Method::GET]), text_handler("A")).unwrap();
    router.register("/b", methods(&[http::Method::GET]), text_handler("B")).unwrap();
    let addr = start_server(router);

    let req = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
    let resp = send_and_read(addr, req, Duration::from_secs(2));
    let text = String::from_utf8_lossy(&resp);

    let first_idx = text.find("HTTP/1.1 200").expect("first response");
    let second_idx = text[first_idx + 1..].find("HTTP/1.1 200").expect("second response") + first_idx + 1;
    assert!(second_idx > first_idx);

    let first_segment = &text[..second_idx];
    assert!(first_segment.contains("Connection: keep-alive"));
    assert!(first_segment.ends_with('A') || first_segment.contains("\r\n\r\nA"));

    let second_segment = &text[second_idx..];
    assert!(second_segment.contains("Connection: close"));
    assert!(second_segment.contains("\r\n\r\nB"));
}

/// S2 - chunked request body, handler echoes it back.
#[test]
fn s2_chunked_request_is_echoed() {
    let mut router = Router::new();
    let handler = HandlerBody::Normal(Arc::new(|req: &Request| -> Response {
        let mut r = Response::new();
        r.set_body(tidepool::buf::Payload::from(req.body.view().to_vec()));
        r
    }));
    router.register("/e", methods(&[http::Method::POST]), handler).unwrap();
    let addr = start_server(router);

    let req = b"POST /e HTTP/1.1\r\nHost:x\r\nConnection: close\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
    let resp = send_and_read(addr, req, Duration::from_secs(2));
    let text = String::from_utf8_lossy(&resp);
    assert!(text.ends_with("Wikipedia"), "response was: {text:?}");
}

/// S3 - Expect: 100-continue with a body arriving after the interim response.
#[test]
fn s3_expect_continue_then_body() {
    let mut router = Router::new();
    let handler = HandlerBody::Normal(Arc::new(|_req: &Request| -> Response {
        let mut r = Response::new();
        r.set_body(tidepool::buf::Payload::from("ok"));
        r
    }));
    router.register("/big", methods(&[http::Method::POST]), handler).unwrap();
    let addr = start_server(router);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
        .write_all(b"POST /big HTTP/1.1\r\nHost:x\r\nConnection: close\r\nContent-Length: 1\r\nExpect: 100-continue\r\n\r\n")
        .unwrap();

    let mut scratch = [0u8; 256];
    let n = stream.read(&mut scratch).unwrap();
    let interim = String::from_utf8_lossy(&scratch[..n]).to_string();
    assert!(interim.starts_with("HTTP/1.1 100 Continue"), "got: {interim:?}");

    stream.write_all(b"X").unwrap();
    let mut rest = Vec::new();
    loop {
        match stream.read(&mut scratch) {
            Ok(0) => break,
            Ok(n) => rest.extend_from_slice(&scratch[..n]),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => break,
            Err(e) => panic!("read error: {e}"),
        }
    }
    let final_resp = String::from_utf8_lossy(&rest);
    assert!(final_resp.starts_with("HTTP/1.1 200"), "got: {final_resp:?}");
    assert!(final_resp.ends_with("ok"));
}

/// S4 - wildcard vs. pattern precedence.
#[test]
fn s4_router_wildcard_and_pattern_precedence() {
    let mut router = Router::new();
    router
        .register("/files/*", methods(&[http::Method::GET]), text_handler("W"))
        .unwrap();
    let handler = HandlerBody::Normal(Arc::new(|req: &Request| -> Response {
        let mut r = Response::new();
        r.status(201);
        let id = req.param("id").unwrap_or("").to_string();
        r.set_body(tidepool::buf::Payload::from(format!("P:{id}")));
        r
    }));
    router
        .register("/files/prefix{id}end", methods(&[http::Method::GET]), handler)
        .unwrap();
    let addr = start_server(router);

    let resp = send_and_read(
        addr,
        b"GET /files/prefixABCend HTTP/1.1\r\nHost:x\r\nConnection: close\r\n\r\n",
        Duration::from_secs(2),
    );
    let text = String::from_utf8_lossy(&resp);
    assert!(text.starts_with("HTTP/1.1 201"), "got: {text:?}");
    assert!(text.ends_with("P:ABC"));

    let resp2 = send_and_read(
        addr,
        b"GET /files/any/thing HTTP/1.1\r\nHost:x\r\nConnection: close\r\n\r\n",
        Duration::from_secs(2),
    );
    let text2 = String::from_utf8_lossy(&resp2);
    assert!(text2.starts_with("HTTP/1.1 200"), "got: {text2:?}");
    assert!(text2.ends_with('W'));
}

/// S5 - CORS preflight success.
#[test]
fn s5_cors_preflight_success() {
    let mut router = Router::new();
    router.register("/r", methods(&[http::Method::GET, http::Method::POST]), text_handler("ok")).unwrap();
    let policy = CorsPolicy::new()
        .allow_origin("https://x.example")
        .allow_methods(&[http::Method::GET, http::Method::POST])
        .allow_request_header("X-T")
        .max_age(Duration::from_secs(600));
    router.set_cors("/r", Arc::new(policy)).unwrap();
    let addr = start_server(router);

    let req = b"OPTIONS /r HTTP/1.1\r\nHost:h\r\nConnection: close\r\nOrigin: https://x.example\r\nAccess-Control-Request-Method: POST\r\nAccess-Control-Request-Headers: X-T\r\n\r\n";
    let resp = send_and_read(addr, req, Duration::from_secs(2));
    let text = String::from_utf8_lossy(&resp);

    assert!(text.starts_with("HTTP/1.1 204"), "got: {text:?}");
    assert!(text.contains("Access-Control-Allow-Origin: https://x.example"));
    assert!(text.contains("Access-Control-Allow-Methods: GET, POST"));
    assert!(text.contains("Access-Control-Allow-Headers: X-T"));
    assert!(text.contains("Access-Control-Max-Age: 600"));
    assert!(text.contains("Vary: Origin"));
}
