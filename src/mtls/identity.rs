//! Client certificate identity.
//!
//! [`ClientCertificate`] is a parsed, immutable X.509 certificate recovered
//! either from a TLS session or from a forwarded request header.
//! [`PeerCertificateChain`] is the request attribute downstream handlers
//! read, regardless of where TLS was terminated.

use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Client certificate
// ─────────────────────────────────────────────────────────────────────────────

/// A DER-backed X.509 certificate with the fields used for logging and
/// authorization pre-extracted.
///
/// Equality is defined on the DER bytes only.
#[derive(Debug, Clone)]
pub struct ClientCertificate {
    der: CertificateDer<'static>,
    subject: String,
    common_name: Option<String>,
    serial: String,
}

impl ClientCertificate {
    /// Parse a DER-encoded certificate.
    ///
    /// Trailing bytes after the certificate structure are rejected.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the bytes are not a well-formed X.509
    /// certificate.
    pub fn from_der(der: CertificateDer<'static>) -> Result<Self> {
        let (rest, cert) = X509Certificate::from_der(der.as_ref())
            .map_err(|e| Error::Config(format!("Failed to parse certificate: {e}")))?;
        if !rest.is_empty() {
            return Err(Error::Config(format!(
                "{} trailing bytes after certificate",
                rest.len()
            )));
        }

        let subject = cert.subject().to_string();
        let common_name = extract_cn(&cert);
        let serial = cert.raw_serial_as_string();

        Ok(Self {
            der,
            subject,
            common_name,
            serial,
        })
    }

    /// DER encoding of the certificate.
    #[must_use]
    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// RFC 4514 rendering of the subject DN.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Subject Common Name, if any.
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// Serial number as colon-separated hex.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }
}

impl PartialEq for ClientCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for ClientCertificate {}

fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

// ─────────────────────────────────────────────────────────────────────────────
// Peer certificate chain request attribute
// ─────────────────────────────────────────────────────────────────────────────

/// The peer certificate chain attached to a request, leaf first.
///
/// Inserted into request extensions by the request customizer; cheap to
/// clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificateChain(Arc<[ClientCertificate]>);

impl PeerCertificateChain {
    /// A chain made of exactly one certificate.
    #[must_use]
    pub fn single(cert: ClientCertificate) -> Self {
        Self(Arc::from(vec![cert]))
    }

    /// Build a chain from DER certificates, leaf first.
    ///
    /// Returns `None` for an empty input.
    ///
    /// # Errors
    ///
    /// Returns an error if any certificate fails to parse.
    pub fn from_der_chain(chain: &[CertificateDer<'_>]) -> Result<Option<Self>> {
        if chain.is_empty() {
            return Ok(None);
        }
        let certs = chain
            .iter()
            .map(|der| ClientCertificate::from_der(der.clone().into_owned()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Self(Arc::from(certs))))
    }

    /// The end-entity certificate.
    #[must_use]
    pub fn leaf(&self) -> &ClientCertificate {
        // Both constructors guarantee at least one element
        &self.0[0]
    }

    /// Number of certificates in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the chain is empty; never true for a constructed chain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the chain, leaf first.
    pub fn iter(&self) -> impl Iterator<Item = &ClientCertificate> {
        self.0.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
