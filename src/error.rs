//! Error types for the TLS front-end

use std::io;

use thiserror::Error;

/// Result type alias for the TLS front-end
pub type Result<T> = std::result::Result<T, Error>;

/// Startup and serving errors.
///
/// Request-time failures (a malformed forwarded certificate, for example)
/// never surface as an `Error`; they are contained where they happen.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A store file could not be read
    #[error("Cannot read '{path}': {source}")]
    Read {
        /// Path of the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// The trust store is unusable
    #[error("Trust store '{path}': {reason}")]
    TrustStore {
        /// Path of the trust store
        path: String,
        /// What went wrong
        reason: String,
    },

    /// The key store is unusable
    #[error("Key store '{path}': {reason}")]
    KeyStore {
        /// Path of the key store
        path: String,
        /// What went wrong
        reason: String,
    },

    /// The key store's private key could not be decrypted (usually a wrong passphrase)
    #[error("Key store '{path}': cannot decrypt private key: {source}")]
    KeyStoreDecrypt {
        /// Path of the key store
        path: String,
        /// Underlying PKCS#8 error
        #[source]
        source: pkcs8::Error,
    },

    /// A server certificate failed trust validation and strict mode is on
    #[error("Server certificate '{subject}' is not trusted: {reason}")]
    UntrustedServerCertificate {
        /// Subject of the offending certificate
        subject: String,
        /// Validation failure
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
