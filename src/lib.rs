//! TLS front-end library
//!
//! Embedded HTTPS front-end that establishes client identity in two
//! deployment topologies:
//!
//! - **Direct mutual TLS**: the client certificate comes from this server's
//!   own handshake.
//! - **Reverse proxy**: TLS ends upstream and the proxy forwards the client
//!   certificate in the `X-ClientCert` header.
//!
//! Either way, handlers read a [`mtls::PeerCertificateChain`] request
//! extension.  At startup the server certificate is validated against the
//! trust store and an expiry warning is scheduled before it runs out.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod frontend;
pub mod mtls;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`.  `format` may be `"json"`.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
