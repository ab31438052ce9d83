//! Request/response middleware chains (§4.E "Middleware").
//!
//! A route's effective chain is the router's global middleware plus the
//! route's own, already merged and ordered by [`Router::register`] /
//! [`Router::route`]: pre-handler hooks run global-then-route so a
//! router-wide policy always gets first refusal; post-handler hooks run
//! route-then-global so a route's own amendments land before anything
//! router-wide is layered on top.

use crate::request::Request;
use crate::response::Response;
use std::sync::Arc;

/// Outcome of one request-middleware hook.
pub enum MiddlewareOutcome {
    Continue,
    /// Skip the handler (and any later pre-middleware) and respond with
    /// this directly.
    ShortCircuit(Response),
}

/// Runs before the matched handler. May mutate the request in place and may
/// short-circuit the chain.
pub type RequestMiddleware = Arc<dyn Fn(&mut Request) -> MiddlewareOutcome + Send + Sync>;

/// Runs after the handler produced a response (or a pre-middleware
/// short-circuited it) to amend headers or body. Cannot itself short-circuit.
pub type ResponseMiddleware = Arc<dyn Fn(&Request, &mut Response) + Send + Sync>;

/// Runs `chain` in order, stopping at the first short circuit. A hook that
/// panics is treated as a short circuit to `500` (mirroring the handler
/// panic handling in the dispatch path).
pub fn run_request_chain(request: &mut Request, chain: &[RequestMiddleware]) -> Option<Response> {
    for mw in chain {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| mw(request)))
            .unwrap_or_else(|_| {
                tracing::warn!("request middleware panicked");
                let mut r = Response::new();
                r.status(500);
                MiddlewareOutcome::ShortCircuit(r)
            });
        if let MiddlewareOutcome::ShortCircuit(response) = outcome {
            return Some(response);
        }
    }
    None
}

/// Runs every hook in `chain` in order. A panicking hook is logged and
/// skipped; the response built so far is left as-is and the chain continues.
pub fn run_response_chain(request: &Request, response: &mut Response, chain: &[ResponseMiddleware]) {
    for mw in chain {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| mw(request, response))).is_err() {
            tracing::warn!("response middleware panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderIndex;
    use crate::buf::Payload;

    fn sample_request() -> Request {
        Request {
            method: http::Method::GET,
            uri: "/".parse().unwrap(),
            version: http::Version::HTTP_11,
            headers: HeaderIndex::new(),
            body: Payload::Empty,
            params: Vec::new(),
        }
    }

    #[test]
    fn request_chain_runs_in_order_until_short_circuit() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let chain: Vec<RequestMiddleware> = vec![
            Arc::new(move |_req| {
                o1.lock().unwrap().push(1);
                MiddlewareOutcome::Continue
            }),
            Arc::new(move |_req| {
                o2.lock().unwrap().push(2);
                let mut r = Response::new();
                r.status(403);
                MiddlewareOutcome::ShortCircuit(r)
            }),
        ];
        let mut req = sample_request();
        let result = run_request_chain(&mut req, &chain);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        assert_eq!(result.unwrap().status_code(), 403);
    }

    #[test]
    fn request_chain_continues_when_nothing_short_circuits() {
        let chain: Vec<RequestMiddleware> = vec![Arc::new(|_req| MiddlewareOutcome::Continue)];
        let mut req = sample_request();
        assert!(run_request_chain(&mut req, &chain).is_none());
    }

    #[test]
    fn request_middleware_panic_short_circuits_to_500() {
        let chain: Vec<RequestMiddleware> = vec![Arc::new(|_req| panic!("boom"))];
        let mut req = sample_request();
        let result = run_request_chain(&mut req, &chain);
        assert_eq!(result.unwrap().status_code(), 500);
    }

    #[test]
    fn response_chain_applies_all_hooks_in_order() {
        let chain: Vec<ResponseMiddleware> = vec![
            Arc::new(|_req, resp: &mut Response| {
                resp.add_header("x-a", "1");
            }),
            Arc::new(|_req, resp: &mut Response| {
                resp.add_header("x-b", "2");
            }),
        ];
        let req = sample_request();
        let mut resp = Response::new();
        run_response_chain(&req, &mut resp, &chain);
        assert_eq!(resp.header("x-a"), Some("1"));
        assert_eq!(resp.header("x-b"), Some("2"));
    }

    #[test]
    fn response_middleware_panic_is_swallowed() {
        let chain: Vec<ResponseMiddleware> = vec![
            Arc::new(|_req, _resp: &mut Response| panic!("boom")),
            Arc::new(|_req, resp: &mut Response| {
                resp.add_header("x-survived", "1");
            }),
        ];
        let req = sample_request();
        let mut resp = Response::new();
        run_response_chain(&req, &mut resp, &chain);
        assert_eq!(resp.header("x-survived"), Some("1"));
    }
}
