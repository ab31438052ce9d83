//! Method set: a compact, allocation-free-for-the-common-case collection of
//! [`http::Method`] values, used by the router for per-route method
//! registration and by the CORS engine for allow-lists.

use crate::concat::{CommaSpace, ConcatList};

const STANDARD: [http::Method; 9] = [
    http::Method::GET,
    http::Method::HEAD,
    http::Method::POST,
    http::Method::PUT,
    http::Method::DELETE,
    http::Method::CONNECT,
    http::Method::OPTIONS,
    http::Method::TRACE,
    http::Method::PATCH,
];

fn standard_bit(m: &http::Method) -> Option<u16> {
    STANDARD.iter().position(|s| s == m).map(|i| 1u16 << i)
}

/// A set of HTTP methods. The nine IANA-registered "standard" methods are
/// tracked with a bitmask; anything else falls back to a small `Vec`.
#[derive(Debug, Clone, Default)]
pub struct MethodSet {
    mask: u16,
    extensions: Vec<http::Method>,
}

impl MethodSet {
    pub fn new() -> Self {
        MethodSet::default()
    }

    pub fn insert(&mut self, method: &http::Method) {
        match standard_bit(method) {
            Some(bit) => self.mask |= bit,
            None => {
                if !self.extensions.contains(method) {
                    self.extensions.push(method.clone());
                }
            }
        }
    }

    pub fn contains(&self, method: &http::Method) -> bool {
        match standard_bit(method) {
            Some(bit) => self.mask & bit != 0,
            None => self.extensions.contains(method),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0 && self.extensions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize + self.extensions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &http::Method> + '_ {
        STANDARD
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.mask & (1 << i) != 0)
            .map(|(_, m)| m)
            .chain(self.extensions.iter())
    }

    /// HEAD is implicitly allowed whenever GET is registered (§4.E).
    pub fn implied_head(&self) -> bool {
        self.contains(&http::Method::GET)
    }

    /// Renders as a comma-space separated list for `Allow` / CORS headers,
    /// in the IANA-registration order above, followed by extension methods
    /// in insertion order.
    pub fn joined(&self) -> ConcatList<CommaSpace> {
        let mut list = ConcatList::new();
        for m in self.iter() {
            list.append(m.as_str());
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let mut s = MethodSet::new();
        s.insert(&http::Method::GET);
        s.insert(&http::Method::POST);
        assert!(s.contains(&http::Method::GET));
        assert!(s.contains(&http::Method::POST));
        assert!(!s.contains(&http::Method::DELETE));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn extension_methods_dedup() {
        let custom = http::Method::from_bytes(b"PURGE").unwrap();
        let mut s = MethodSet::new();
        s.insert(&custom);
        s.insert(&custom);
        assert_eq!(s.len(), 1);
        assert!(s.contains(&custom));
    }

    #[test]
    fn joined_order_matches_registration() {
        let mut s = MethodSet::new();
        s.insert(&http::Method::POST);
        s.insert(&http::Method::GET);
        assert_eq!(s.joined().as_str(), "GET, POST");
    }

    #[test]
    fn get_implies_head() {
        let mut s = MethodSet::new();
        s.insert(&http::Method::GET);
        assert!(s.implied_head());
        assert!(!MethodSet::new().implied_head());
    }
}
