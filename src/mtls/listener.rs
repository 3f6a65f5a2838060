//! Listener configuration assembly.
//!
//! [`build_listener`] loads the trust and key stores, checks the server
//! certificate against the trust store, schedules its expiry warning and
//! builds the rustls server configuration.  [`build_plain_listener`] is the
//! no-TLS counterpart.
//!
//! The result is an immutable [`ListenerConfig`] handed to the server when it
//! binds.

use std::sync::Arc;

use rustls::ServerConfig;
use rustls::server::WebPkiClientVerifier;
use tracing::{Span, debug, info, info_span};

use crate::mtls::config::MtlsConfig;
use crate::mtls::expiry::{CertificateChecker, CertificateStatus, ExpiryScheduler};
use crate::mtls::material::{KeyStore, TrustStore, subject_names};
use crate::{Error, Result};

/// Default host for both listener kinds.
pub const DEFAULT_HOST: &str = "localhost";
/// Default HTTPS port.
pub const DEFAULT_TLS_PORT: u16 = 8443;
/// Default plain HTTP port.
pub const DEFAULT_PLAIN_PORT: u16 = 8080;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the network layer needs to bind one listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Host name or address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Reject clients without a trusted certificate at the handshake.
    pub require_client_auth: bool,
    /// TLS material, `None` for a plain listener.
    pub tls: Option<TlsMaterial>,
}

impl ListenerConfig {
    /// `host:port`, as passed to the socket binder.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the listener terminates TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }
}

/// Loaded stores plus the rustls configuration built from them.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    /// Trusted issuers.
    pub trust_store: Arc<TrustStore>,
    /// Server identity.
    pub key_store: Arc<KeyStore>,
    /// Ready-to-use server configuration.
    pub server_config: Arc<ServerConfig>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builders
// ─────────────────────────────────────────────────────────────────────────────

/// Build a TLS listener configuration.
///
/// # Errors
///
/// Fails when either store cannot be loaded, the key does not match the
/// certificate, or the server certificate is untrusted while
/// `fail_on_untrusted_server_cert` is set.  An untrusted certificate is only
/// a warning otherwise.
pub fn build_listener(
    host: &str,
    port: u16,
    config: &MtlsConfig,
    scheduler: &ExpiryScheduler,
) -> Result<ListenerConfig> {
    build_listener_in(host, port, config, scheduler, &info_span!("tls_connector"))
}

/// [`build_listener`], logging inside `span`.
pub fn build_listener_in(
    host: &str,
    port: u16,
    config: &MtlsConfig,
    scheduler: &ExpiryScheduler,
    span: &Span,
) -> Result<ListenerConfig> {
    let _guard = span.enter();

    let trust_store = TrustStore::load(&config.trust_store)?;
    debug!(
        path = %trust_store.path(),
        subjects = ?subject_names(trust_store.certificates()),
        "Trust store loaded"
    );

    let key_store = KeyStore::load(&config.key_store, &config.key_store_password)?;
    debug!(
        path = %key_store.path(),
        subjects = ?subject_names(key_store.chain()),
        "Key store loaded"
    );

    let checker =
        CertificateChecker::new(config.expiry_warning_threshold).with_span(span.clone());
    if let CertificateStatus::Untrusted { subject, reason } =
        checker.check_key_store(&trust_store, &key_store, scheduler)
    {
        if config.fail_on_untrusted_server_cert {
            return Err(Error::UntrustedServerCertificate { subject, reason });
        }
    }

    let server_config = build_server_config(&trust_store, &key_store, config.require_client_cert)?;

    info!(
        host = %host,
        port,
        require_client_auth = config.require_client_cert,
        "TLS listener configured"
    );

    Ok(ListenerConfig {
        host: host.to_string(),
        port,
        require_client_auth: config.require_client_cert,
        tls: Some(TlsMaterial {
            trust_store: Arc::new(trust_store),
            key_store: Arc::new(key_store),
            server_config: Arc::new(server_config),
        }),
    })
}

/// Build a plain HTTP listener configuration.
#[must_use]
pub fn build_plain_listener(host: &str, port: u16) -> ListenerConfig {
    ListenerConfig {
        host: host.to_string(),
        port,
        require_client_auth: false,
        tls: None,
    }
}

/// rustls server config: trust-store backed client verifier, the key store's
/// chain and key, HTTP/1.1 via ALPN.
fn build_server_config(
    trust_store: &TrustStore,
    key_store: &KeyStore,
    require_client_cert: bool,
) -> Result<ServerConfig> {
    let builder = WebPkiClientVerifier::builder(Arc::new(trust_store.roots().clone()));
    let builder = if require_client_cert {
        builder
    } else {
        builder.allow_unauthenticated()
    };
    let verifier = builder
        .build()
        .map_err(|e| Error::Config(format!("Failed to build client verifier: {e}")))?;

    let mut server_config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(key_store.chain().to_vec(), key_store.private_key())
        .map_err(|e| Error::KeyStore {
            path: key_store.path().to_string(),
            reason: format!("certificate and key do not match: {e}"),
        })?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(server_config)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
