//! The runtime request value handed to handlers: the result of HTTP/1.1
//! parsing (§4.F) plus router-assigned path parameter captures (§4.E).

use crate::buf::Payload;
use crate::headers::HeaderIndex;

#[derive(Debug, Clone)]
pub struct PathParam {
    pub key: String,
    pub value: String,
}

#[derive(Debug)]
pub struct Request {
    pub method: http::Method,
    pub uri: http::Uri,
    pub version: http::Version,
    pub headers: HeaderIndex,
    pub body: Payload,
    pub params: Vec<PathParam>,
}

impl Request {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|p| p.key == key).map(|p| p.value.as_str())
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}
