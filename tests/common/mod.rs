//! Certificate and store fixtures shared by integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rcgen::{Certificate, KeyPair};

use tls_frontend::config::{Config, CustomizerKind};
use tls_frontend::mtls::{KeyStorePassword, MtlsConfig};

#[path = "../../src/mtls/testutil.rs"]
mod fixtures;

pub use fixtures::{TestCa as Ca, self_signed};

pub const PASSWORD: &str = "integration-secret";

/// `X-ClientCert` value as an nginx-style proxy sends it: newlines as spaces.
pub fn plain_header(cert: &Certificate) -> String {
    cert.pem().trim().replace("\r\n", " ").replace('\n', " ")
}

/// `X-ClientCert` value percent-encoded as a whole.
pub fn percent_header(cert: &Certificate) -> String {
    let pem = cert.pem().replace("\r\n", "\n");
    percent_encoding::utf8_percent_encode(&pem, percent_encoding::NON_ALPHANUMERIC)
        .to_string()
        .replace("%2D", "-")
}

/// Write `trust.pem` (the CA) and `server.pem` (server chain + key encrypted with [`PASSWORD`]).
pub fn write_stores(dir: &Path, ca: &Ca, server: &Certificate, key: &KeyPair) -> (PathBuf, PathBuf) {
    fixtures::write_stores(dir, &[&ca.cert], server, key, PASSWORD)
}

/// A TLS-enabled config on an ephemeral loopback port.
pub fn tls_config(trust: &Path, key_store: &Path, customizer: CustomizerKind) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = Some(0);
    config.server.customizer = customizer;
    config.tls = MtlsConfig {
        enabled: true,
        trust_store: trust.to_string_lossy().into_owned(),
        key_store: key_store.to_string_lossy().into_owned(),
        key_store_password: KeyStorePassword::new(PASSWORD),
        ..MtlsConfig::default()
    };
    config
}
