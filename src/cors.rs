//! CORS policy engine (§4.D): preflight evaluation and simple-request header
//! application.

use crate::concat::{CommaSpace, ConcatList};
use crate::headers::HeaderIndex;
use crate::method::MethodSet;
use crate::response::Response;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginMode {
    Any,
    Enumerated,
}

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origin_mode: OriginMode,
    allowed_origins: ConcatList<CommaSpace>,
    allow_credentials: bool,
    allow_private_network: bool,
    allow_any_request_headers: bool,
    allowed_methods: MethodSet,
    allowed_request_headers: ConcatList<CommaSpace>,
    exposed_headers: ConcatList<CommaSpace>,
    max_age: Option<Duration>,
    /// Bound on the number of echoed `Access-Control-Request-Headers`
    /// tokens when no explicit allow-list applies (open question in §9,
    /// resolved here — see DESIGN.md).
    pub max_echoed_request_headers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightOutcome {
    NotPreflight,
    Allowed,
    OriginDenied,
    MethodDenied,
    HeadersDenied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    NotCors,
    Applied,
    OriginDenied,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        CorsPolicy {
            origin_mode: OriginMode::Enumerated,
            allowed_origins: ConcatList::new(),
            allow_credentials: false,
            allow_private_network: false,
            allow_any_request_headers: false,
            allowed_methods: MethodSet::new(),
            allowed_request_headers: ConcatList::new(),
            exposed_headers: ConcatList::new(),
            max_age: None,
            max_echoed_request_headers: 64,
        }
    }
}

impl CorsPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_any_origin(mut self) -> Self {
        self.origin_mode = OriginMode::Any;
        self
    }

    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.origin_mode = OriginMode::Enumerated;
        self.allowed_origins.append(origin);
        self
    }

    pub fn allow_methods(mut self, methods: &[http::Method]) -> Self {
        for m in methods {
            self.allowed_methods.insert(m);
        }
        self
    }

    pub fn allow_request_header(mut self, name: &str) -> Self {
        self.allowed_request_headers.append(name);
        self
    }

    pub fn allow_any_request_header(mut self) -> Self {
        self.allow_any_request_headers = true;
        self
    }

    pub fn allow_credentials(mut self, yes: bool) -> Self {
        self.allow_credentials = yes;
        self
    }

    pub fn allow_private_network(mut self, yes: bool) -> Self {
        self.allow_private_network = yes;
        self
    }

    pub fn expose_header(mut self, name: &str) -> Self {
        self.exposed_headers.append(name);
        self
    }

    pub fn max_age(mut self, d: Duration) -> Self {
        self.max_age = Some(d);
        self
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        match self.origin_mode {
            OriginMode::Any => true,
            OriginMode::Enumerated => self.allowed_origins.contains(origin, false),
        }
    }

    fn mirror_origin(&self) -> bool {
        matches!(self.origin_mode, OriginMode::Enumerated) || self.allow_credentials
    }

    /// Classifies and, on success, fully assembles a 204 preflight response
    /// into `resp` (§4.D). `route_methods`, when given, further restricts
    /// the method check to the methods actually registered on the matched
    /// route.
    pub fn handle_preflight(
        &self,
        method: &http::Method,
        headers: &HeaderIndex,
        route_methods: Option<&MethodSet>,
        resp: &mut Response,
    ) -> PreflightOutcome {
        let is_preflight = *method == http::Method::OPTIONS
            && headers.contains("origin")
            && headers.contains("access-control-request-method");
        if !is_preflight {
            return PreflightOutcome::NotPreflight;
        }

        let origin = match headers.get("origin") {
            Some(o) if self.origin_allowed(o) => o.to_string(),
            _ => return PreflightOutcome::OriginDenied,
        };

        let requested_method = match headers.get("access-control-request-method") {
            Some(m) => m.to_string(),
            None => return PreflightOutcome::MethodDenied,
        };
        let req_method_parsed = match requested_method.parse::<http::Method>() {
            Ok(m) => m,
            Err(_) => return PreflightOutcome::MethodDenied,
        };
        if !self.allowed_methods.contains(&req_method_parsed) {
            return PreflightOutcome::MethodDenied;
        }
        if let Some(route) = route_methods {
            if !route.contains(&req_method_parsed) {
                return PreflightOutcome::MethodDenied;
            }
        }

        let mut echoed_headers: Option<Vec<String>> = None;
        if let Some(raw) = headers.get("access-control-request-headers") {
            let requested: Vec<&str> =
                raw.split(',').map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
            if !requested.is_empty() && !self.allow_any_request_headers {
                for tok in &requested {
                    if !self.allowed_request_headers.contains(tok, true) {
                        return PreflightOutcome::HeadersDenied;
                    }
                }
            }
            if !requested.is_empty() {
                let mut deduped = Vec::new();
                for tok in requested {
                    if !deduped.iter().any(|t: &String| t.eq_ignore_ascii_case(tok)) {
                        deduped.push(tok.to_string());
                    }
                    if deduped.len() >= self.max_echoed_request_headers {
                        break;
                    }
                }
                echoed_headers = Some(deduped);
            }
        }

        resp.status(204);
        if self.mirror_origin() {
            resp.add_header("Access-Control-Allow-Origin", &origin);
            resp.merge_vary_token("Origin");
        } else {
            resp.add_header("Access-Control-Allow-Origin", "*");
        }
        if self.allow_credentials {
            resp.add_header("Access-Control-Allow-Credentials", "true");
        }
        resp.add_header("Access-Control-Allow-Methods", self.allowed_methods.joined().as_str());

        if self.allow_any_request_headers {
            resp.add_header("Access-Control-Allow-Headers", "*");
        } else if !self.allowed_request_headers.is_empty() {
            resp.add_header("Access-Control-Allow-Headers", self.allowed_request_headers.as_str());
        } else if let Some(echoed) = echoed_headers {
            resp.add_header("Access-Control-Allow-Headers", &echoed.join(", "));
        }

        if self.allow_private_network {
            resp.add_header("Access-Control-Allow-Private-Network", "true");
        }
        if let Some(age) = self.max_age {
            resp.add_header("Access-Control-Max-Age", &age.as_secs().to_string());
        }

        PreflightOutcome::Allowed
    }

    /// Applies CORS headers to a simple (non-preflight) response (§4.D).
    pub fn apply_to_response(&self, headers: &HeaderIndex, resp: &mut Response) -> ApplyOutcome {
        let origin = match headers.get("origin") {
            Some(o) => o,
            None => return ApplyOutcome::NotCors,
        };
        if !self.origin_allowed(origin) {
            return ApplyOutcome::OriginDenied;
        }
        if self.mirror_origin() {
            resp.add_header("Access-Control-Allow-Origin", origin);
            resp.merge_vary_token("Origin");
        } else {
            resp.add_header("Access-Control-Allow-Origin", "*");
        }
        if self.allow_credentials {
            resp.add_header("Access-Control-Allow-Credentials", "true");
        }
        if !self.exposed_headers.is_empty() {
            resp.add_header("Access-Control-Expose-Headers", self.exposed_headers.as_str());
        }
        ApplyOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderView;
    use std::time::Duration;

    fn headers(pairs: &[(&str, &str)]) -> HeaderIndex {
        HeaderIndex::build(pairs.iter().map(|(n, v)| HeaderView { name: n, value: v }))
    }

    #[test]
    fn s5_preflight_success_scenario() {
        let policy = CorsPolicy::new()
            .allow_origin("https://x.example")
            .allow_methods(&[http::Method::GET, http::Method::POST])
            .allow_request_header("X-T")
            .max_age(Duration::from_secs(600));

        let h = headers(&[
            ("Host", "h"),
            ("Origin", "https://x.example"),
            ("Access-Control-Request-Method", "POST"),
            ("Access-Control-Request-Headers", "X-T"),
        ]);
        let mut resp = Response::new();
        let outcome = policy.handle_preflight(&http::Method::OPTIONS, &h, None, &mut resp);
        assert_eq!(outcome, PreflightOutcome::Allowed);
        assert_eq!(resp.status_code(), 204);
        assert_eq!(resp.header("Access-Control-Allow-Origin"), Some("https://x.example"));
        assert_eq!(resp.header("Access-Control-Allow-Methods"), Some("GET, POST"));
        assert_eq!(resp.header("Access-Control-Allow-Headers"), Some("X-T"));
        assert_eq!(resp.header("Access-Control-Max-Age"), Some("600"));
        assert_eq!(resp.header("Vary"), Some("Origin"));
    }

    #[test]
    fn origin_denied_when_not_enumerated() {
        let policy = CorsPolicy::new().allow_origin("https://ok.example");
        let h = headers(&[
            ("Origin", "https://evil.example"),
            ("Access-Control-Request-Method", "GET"),
        ]);
        let mut resp = Response::new();
        assert_eq!(
            policy.handle_preflight(&http::Method::OPTIONS, &h, None, &mut resp),
            PreflightOutcome::OriginDenied
        );
    }

    #[test]
    fn not_preflight_without_request_method_header() {
        let policy = CorsPolicy::new().allow_any_origin();
        let h = headers(&[("Origin", "https://x.example")]);
        let mut resp = Response::new();
        assert_eq!(
            policy.handle_preflight(&http::Method::OPTIONS, &h, None, &mut resp),
            PreflightOutcome::NotPreflight
        );
    }

    #[test]
    fn exposed_headers_not_emitted_on_preflight() {
        let policy = CorsPolicy::new()
            .allow_any_origin()
            .allow_methods(&[http::Method::GET])
            .expose_header("X-Total-Count");
        let h = headers(&[("Origin", "https://x.example"), ("Access-Control-Request-Method", "GET")]);
        let mut resp = Response::new();
        policy.handle_preflight(&http::Method::OPTIONS, &h, None, &mut resp);
        assert_eq!(resp.header("Access-Control-Expose-Headers"), None);
    }

    #[test]
    fn simple_request_applies_expose_headers() {
        let policy = CorsPolicy::new().allow_any_origin().expose_header("X-Total-Count");
        let h = headers(&[("Origin", "https://x.example")]);
        let mut resp = Response::new();
        assert_eq!(policy.apply_to_response(&h, &mut resp), ApplyOutcome::Applied);
        assert_eq!(resp.header("Access-Control-Expose-Headers"), Some("X-Total-Count"));
        assert_eq!(resp.header("Access-Control-Allow-Origin"), Some("*"));
    }
}
