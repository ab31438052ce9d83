//! Outbound content-coding negotiation against `Accept-Encoding` (§4.J
//! "Outbound").

use crate::headers::HeaderIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coding {
    Identity,
    Gzip,
    Deflate,
}

impl Coding {
    fn token(self) -> &'static str {
        match self {
            Coding::Identity => "identity",
            Coding::Gzip => "gzip",
            Coding::Deflate => "deflate",
        }
    }

    pub fn header_value(self) -> Option<&'static str> {
        match self {
            Coding::Identity => None,
            Coding::Gzip => Some("gzip"),
            Coding::Deflate => Some("deflate"),
        }
    }

    fn parse(token: &str) -> Option<Coding> {
        match token {
            "identity" => Some(Coding::Identity),
            "gzip" | "x-gzip" => Some(Coding::Gzip),
            "deflate" => Some(Coding::Deflate),
            _ => None,
        }
    }
}

/// Server preference order, most preferred first. Identity is listed last so
/// it only wins when nothing else is acceptable or the client gave it the
/// highest q-value.
const SERVER_PREFERENCE: &[Coding] = &[Coding::Gzip, Coding::Deflate, Coding::Identity];

struct Candidate {
    coding: Coding,
    q: f32,
}

fn parse_accept_encoding(value: &str) -> Vec<Candidate> {
    let mut out = Vec::new();
    for item in value.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let mut parts = item.split(';');
        let token = parts.next().unwrap_or("").trim();
        let mut q = 1.0f32;
        for param in parts {
            let param = param.trim();
            if let Some(v) = param.strip_prefix("q=") {
                q = v.trim().parse().unwrap_or(1.0);
            }
        }
        if token == "*" {
            // "*" matches anything not otherwise mentioned; represented with
            // a synthetic identity/gzip/deflate fan-out resolved by the
            // caller when no explicit entry exists for a coding.
            out.push(Candidate { coding: Coding::Gzip, q });
            out.push(Candidate { coding: Coding::Deflate, q });
            if q > 0.0 {
                out.push(Candidate { coding: Coding::Identity, q });
            }
            continue;
        }
        if let Some(coding) = Coding::parse(token) {
            out.push(Candidate { coding, q });
        }
    }
    out
}

/// Picks the outbound content-coding for a response, given the request's
/// `Accept-Encoding` header (or its absence, meaning "identity only").
///
/// Returns `None` when nothing is negotiable and identity itself was
/// explicitly forbidden (`identity;q=0` with no substitute) — callers must
/// answer 406 in that case.
pub fn negotiate_outbound(headers: &HeaderIndex) -> Option<Coding> {
    let raw = match headers.get("accept-encoding") {
        None => return Some(Coding::Identity),
        Some(v) => v,
    };
    let candidates = parse_accept_encoding(raw);
    if candidates.is_empty() {
        return Some(Coding::Identity);
    }

    let q_for = |coding: Coding| -> Option<f32> {
        candidates.iter().filter(|c| c.coding == coding).map(|c| c.q).fold(None, |acc, q| {
            Some(acc.map_or(q, |a: f32| a.max(q)))
        })
    };

    let mut best: Option<(Coding, f32)> = None;
    for &coding in SERVER_PREFERENCE {
        let q = match q_for(coding) {
            Some(q) => q,
            None if coding == Coding::Identity => 1.0,
            None => continue,
        };
        if q <= 0.0 {
            continue;
        }
        match best {
            Some((_, best_q)) if best_q >= q => {}
            _ => best = Some((coding, q)),
        }
    }

    if best.is_none() {
        let identity_forbidden = q_for(Coding::Identity).map(|q| q <= 0.0).unwrap_or(false);
        if identity_forbidden {
            return None;
        }
        return Some(Coding::Identity);
    }
    best.map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderView;

    fn headers(pairs: &[(&str, &str)]) -> HeaderIndex {
        HeaderIndex::build(pairs.iter().map(|(n, v)| HeaderView { name: n, value: v }))
    }

    #[test]
    fn no_header_means_identity() {
        let h = headers(&[]);
        assert_eq!(negotiate_outbound(&h), Some(Coding::Identity));
    }

    #[test]
    fn picks_highest_q_with_server_preference_tiebreak() {
        // identity defaults to q=1.0 when unlisted, so all three tie here;
        // the server preference order (gzip, deflate, identity) breaks it.
        let h = headers(&[("Accept-Encoding", "gzip;q=1.0, deflate;q=1.0")]);
        assert_eq!(negotiate_outbound(&h), Some(Coding::Gzip));
    }

    #[test]
    fn strict_q_ordering_wins_over_preference() {
        let h = headers(&[("Accept-Encoding", "deflate;q=1.0, gzip;q=0.2")]);
        assert_eq!(negotiate_outbound(&h), Some(Coding::Deflate));
    }

    #[test]
    fn identity_forbidden_with_nothing_else_acceptable_is_406() {
        let h = headers(&[("Accept-Encoding", "gzip;q=0, identity;q=0")]);
        assert_eq!(negotiate_outbound(&h), None);
    }

    #[test]
    fn wildcard_covers_unlisted_codings() {
        let h = headers(&[("Accept-Encoding", "*;q=0.8")]);
        assert_eq!(negotiate_outbound(&h), Some(Coding::Gzip));
    }
}
