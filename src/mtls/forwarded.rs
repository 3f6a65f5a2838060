//! Client certificates forwarded by a TLS-terminating reverse proxy.
//!
//! When TLS ends at an upstream proxy, the proxy passes the client
//! certificate to us in the `X-ClientCert` header.  Headers cannot carry
//! raw newlines, so proxies use one of two encodings:
//!
//! | Encoding | Begin marker | End marker | Body |
//! |----------|--------------|------------|------|
//! | [`HeaderEncoding::Plain`] | `-----BEGIN CERTIFICATE-----` | `-----END CERTIFICATE-----` | newlines collapsed to spaces |
//! | [`HeaderEncoding::PercentEncoded`] | `-----BEGIN%20CERTIFICATE-----%0A` | `%0A-----END%20CERTIFICATE-----%0A` | percent-encoded PEM |
//!
//! The header is attacker-influenceable.  Every failure path yields `None`
//! ("no client identity asserted") and the request carries on to whatever
//! authorization applies to anonymous callers.
//!
//! No chain validation is performed here: the proxy is trusted to have
//! verified the client during its own handshake.

use axum::http::HeaderMap;
use percent_encoding::percent_decode_str;
use rustls_pemfile::Item;
use tracing::{Span, debug, warn};

use crate::mtls::identity::ClientCertificate;

/// Name of the forwarded client certificate header.
pub const X_CLIENT_CERT_HEADER: &str = "X-ClientCert";

const CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const CERT_END: &str = "-----END CERTIFICATE-----";
const URL_ENCODED_CERT_BEGIN: &str = "-----BEGIN%20CERTIFICATE-----%0A";
const URL_ENCODED_CERT_END: &str = "%0A-----END%20CERTIFICATE-----%0A";

// ─────────────────────────────────────────────────────────────────────────────
// Header encodings
// ─────────────────────────────────────────────────────────────────────────────

/// The header encodings we understand, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEncoding {
    /// Literal PEM with internal newlines replaced by spaces.
    Plain,
    /// PEM percent-encoded as a whole (`%20` spaces, `%0A` newlines).
    PercentEncoded,
}

impl HeaderEncoding {
    /// Strategies in detection order.
    pub const ALL: [Self; 2] = [Self::Plain, Self::PercentEncoded];

    /// Marker the header value must start with.
    #[must_use]
    pub fn begin_marker(self) -> &'static str {
        match self {
            Self::Plain => CERT_BEGIN,
            Self::PercentEncoded => URL_ENCODED_CERT_BEGIN,
        }
    }

    /// Marker the header value must end with.
    #[must_use]
    pub fn end_marker(self) -> &'static str {
        match self {
            Self::Plain => CERT_END,
            Self::PercentEncoded => URL_ENCODED_CERT_END,
        }
    }

    /// Pick the encoding by begin marker.
    #[must_use]
    pub fn detect(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|enc| value.starts_with(enc.begin_marker()))
    }

    /// Rebuild PEM text from an enveloped header value.
    ///
    /// Returns `None` if percent-decoding yields invalid UTF-8.
    #[must_use]
    pub fn normalize(self, value: &str) -> Option<String> {
        match self {
            Self::Plain => {
                let body = value
                    .replace(CERT_BEGIN, "")
                    .replace(CERT_END, "")
                    .replace(' ', "\n");
                Some(format!("{CERT_BEGIN}{body}{CERT_END}"))
            }
            Self::PercentEncoded => percent_decode_str(value)
                .decode_utf8()
                .ok()
                .map(|decoded| decoded.trim().to_owned()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rejection reasons
// ─────────────────────────────────────────────────────────────────────────────

/// Why a forwarded certificate was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No `X-ClientCert` header.
    Missing,
    /// Header present but zero-length.
    Empty,
    /// Header value is not visible ASCII.
    NotText,
    /// Value starts with neither begin marker.
    UnknownBegin,
    /// Value does not end with the end marker matching its begin marker.
    MismatchedEnd(HeaderEncoding),
    /// Percent-decoding produced invalid UTF-8.
    BadPercentEncoding,
    /// PEM or X.509 decoding failed.
    Undecodable,
}

// ─────────────────────────────────────────────────────────────────────────────
// Extractor
// ─────────────────────────────────────────────────────────────────────────────

/// Recovers the client certificate from the `X-ClientCert` header.
///
/// Stateless apart from its logging span, so one instance serves every
/// request concurrently.
#[derive(Debug, Clone)]
pub struct ForwardedCertificateExtractor {
    span: Span,
}

impl Default for ForwardedCertificateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardedCertificateExtractor {
    /// Create an extractor logging under its own span.
    #[must_use]
    pub fn new() -> Self {
        Self::with_span(tracing::info_span!("forwarded_cert"))
    }

    /// Create an extractor logging under `span`.
    #[must_use]
    pub fn with_span(span: Span) -> Self {
        Self { span }
    }

    /// Recover the forwarded client certificate, or `None`.
    ///
    /// Never panics and never returns partially-parsed data.
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap) -> Option<ClientCertificate> {
        let _enter = self.span.enter();
        match self.try_extract(headers) {
            Ok(cert) => {
                debug!(subject = %cert.subject(), "Recovered forwarded client certificate");
                Some(cert)
            }
            Err(rejection) => {
                log_rejection(rejection);
                None
            }
        }
    }

    /// Like [`extract`](Self::extract) but reports the rejection reason.
    pub fn try_extract(&self, headers: &HeaderMap) -> Result<ClientCertificate, Rejection> {
        let value = headers
            .get(X_CLIENT_CERT_HEADER)
            .ok_or(Rejection::Missing)?;
        if value.is_empty() {
            return Err(Rejection::Empty);
        }
        let value = value.to_str().map_err(|_| Rejection::NotText)?;

        let encoding = HeaderEncoding::detect(value).ok_or(Rejection::UnknownBegin)?;
        if !value.ends_with(encoding.end_marker()) {
            return Err(Rejection::MismatchedEnd(encoding));
        }

        let pem = encoding
            .normalize(value)
            .ok_or(Rejection::BadPercentEncoding)?;

        decode_pem_certificate(&pem).ok_or(Rejection::Undecodable)
    }
}

fn log_rejection(rejection: Rejection) {
    match rejection {
        Rejection::Missing => warn!("No {X_CLIENT_CERT_HEADER} header found"),
        Rejection::Empty => warn!("{X_CLIENT_CERT_HEADER} header empty"),
        Rejection::NotText => warn!("{X_CLIENT_CERT_HEADER} header is not valid text"),
        Rejection::UnknownBegin => warn!(
            "{X_CLIENT_CERT_HEADER} header does not start with {CERT_BEGIN} or {URL_ENCODED_CERT_BEGIN}"
        ),
        Rejection::MismatchedEnd(encoding) => warn!(
            ?encoding,
            "{X_CLIENT_CERT_HEADER} header does not end with {}",
            encoding.end_marker()
        ),
        Rejection::BadPercentEncoding => {
            warn!("{X_CLIENT_CERT_HEADER} header is not valid percent-encoded UTF-8");
        }
        Rejection::Undecodable => {
            debug!("{X_CLIENT_CERT_HEADER} header does not hold a decodable certificate");
        }
    }
}

/// Decode the first PEM block of `pem` into a certificate.
///
/// The first block must be a certificate; anything else is rejected.
fn decode_pem_certificate(pem: &str) -> Option<ClientCertificate> {
    let mut reader = pem.as_bytes();
    match rustls_pemfile::read_one(&mut reader) {
        Ok(Some(Item::X509Certificate(der))) => ClientCertificate::from_der(der).ok(),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
