//! TLS listener configuration types.
//!
//! Defines the YAML-deserialisable configuration for the HTTPS connector:
//! trust store and key store paths, the key store passphrase, client
//! authentication policy and the server certificate expiry policy.
//!
//! # Example YAML
//!
//! ```yaml
//! tls:
//!   enabled: true
//!   trust_store: "/etc/tls-frontend/trust.pem"
//!   key_store:   "/etc/tls-frontend/server.pem"
//!   key_store_password: "changeit"
//!   require_client_cert: true
//!   expiry_warning_threshold: 30d
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level TLS config
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level TLS configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MtlsConfig {
    /// Enable the HTTPS connector.
    ///
    /// When `false` (default) a plain HTTP listener is started and no store
    /// is loaded.  No other fields have effect.
    pub enabled: bool,

    /// Path to the trust store: one or more concatenated PEM certificates
    /// of trusted issuers.
    pub trust_store: String,

    /// Path to the key store: a PEM bundle holding the server certificate
    /// chain (leaf first) and its `ENCRYPTED PRIVATE KEY`.
    pub key_store: String,

    /// Passphrase protecting the key store's private key.
    pub key_store_password: KeyStorePassword,

    /// When `true`, clients without a certificate signed by a trust store
    /// issuer are rejected at the TLS handshake.
    ///
    /// When `false` (default), a client certificate is requested but
    /// anonymous clients are let through.
    pub require_client_cert: bool,

    /// Refuse to start when a server certificate fails trust validation.
    ///
    /// Off by default: an untrusted or expired server certificate only
    /// produces a warning.
    pub fail_on_untrusted_server_cert: bool,

    /// How long before `notAfter` an expiry warning is logged.
    #[serde(with = "humantime_serde")]
    pub expiry_warning_threshold: Duration,
}

impl Default for MtlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trust_store: String::new(),
            key_store: String::new(),
            key_store_password: KeyStorePassword::default(),
            require_client_cert: false,
            fail_on_untrusted_server_cert: false,
            expiry_warning_threshold: default_expiry_warning_threshold(),
        }
    }
}

fn default_expiry_warning_threshold() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}

// ─────────────────────────────────────────────────────────────────────────────
// Passphrase
// ─────────────────────────────────────────────────────────────────────────────

/// Key store passphrase.
///
/// `Debug` and `Display` are redacted so the value never reaches a log line.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyStorePassword(String);

impl KeyStorePassword {
    /// Wrap a passphrase.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw passphrase, for handing to the key store decoder only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether no passphrase was configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for KeyStorePassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyStorePassword([REDACTED])")
    }
}

impl fmt::Display for KeyStorePassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
