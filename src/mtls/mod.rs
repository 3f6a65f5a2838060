//! Client identity over TLS.
//!
//! Two deployment topologies are supported:
//!
//! ```text
//! direct:     client ──TLS──▶ tls-frontend           (peer chain from the session)
//! forwarded:  client ──TLS──▶ proxy ──HTTP──▶ tls-frontend
//!                                  X-ClientCert: <PEM>  (chain rebuilt from the header)
//! ```
//!
//! Either way downstream handlers read the same [`PeerCertificateChain`]
//! request extension.
//!
//! # Modules
//!
//! - [`config`] — YAML configuration (`MtlsConfig`, `KeyStorePassword`)
//! - [`identity`] — parsed certificates (`ClientCertificate`, `PeerCertificateChain`)
//! - [`forwarded`] — `X-ClientCert` header decoding
//! - [`material`] — trust store and key store loading
//! - [`expiry`] — server certificate trust check and expiry warnings
//! - [`listener`] — listener configuration assembly
//!
//! # Quick start
//!
//! ```yaml
//! tls:
//!   enabled: true
//!   trust_store: "/etc/tls-frontend/trust.pem"
//!   key_store:   "/etc/tls-frontend/server.pem"
//!   key_store_password: "changeit"
//!   require_client_cert: false
//! ```

pub mod config;
pub mod expiry;
pub mod forwarded;
pub mod identity;
pub mod listener;
pub mod material;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{KeyStorePassword, MtlsConfig};
pub use expiry::{CertificateChecker, CertificateStatus, ExpiryScheduler, ExpiryWarning};
pub use forwarded::{ForwardedCertificateExtractor, HeaderEncoding, X_CLIENT_CERT_HEADER};
pub use identity::{ClientCertificate, PeerCertificateChain};
pub use listener::{ListenerConfig, TlsMaterial, build_listener, build_plain_listener};
pub use material::{KeyStore, TrustStore};
