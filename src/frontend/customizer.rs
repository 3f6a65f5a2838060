//! Request customization: attach the client certificate chain.
//!
//! Runs as axum middleware before any handler.  The selected
//! [`RequestCustomizer`] decides where the chain comes from and inserts it
//! as a [`PeerCertificateChain`] extension.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::Extensions,
    middleware::Next,
    response::Response,
};
use tracing::trace;

use crate::config::CustomizerKind;
use crate::mtls::{ForwardedCertificateExtractor, PeerCertificateChain};

/// Facts about the TLS connection a request arrived on.
///
/// Inserted into every request by the TLS accept loop.
#[derive(Debug, Clone, Default)]
pub struct TlsSession {
    /// Chain the client presented during the handshake, if any.
    pub peer_certificates: Option<PeerCertificateChain>,
}

/// Where the client certificate chain comes from.
#[derive(Debug, Clone)]
pub enum RequestCustomizer {
    /// Attach nothing.
    None,
    /// Take the chain from this server's TLS session.
    DirectTls,
    /// Rebuild the certificate from the `X-ClientCert` header.
    ForwardedHeader(ForwardedCertificateExtractor),
}

impl RequestCustomizer {
    /// The customizer for a configured kind.
    #[must_use]
    pub fn from_kind(kind: CustomizerKind) -> Self {
        match kind {
            CustomizerKind::None => Self::None,
            CustomizerKind::DirectTls => Self::DirectTls,
            CustomizerKind::ForwardedHeader => {
                Self::ForwardedHeader(ForwardedCertificateExtractor::new())
            }
        }
    }

    /// Insert the [`PeerCertificateChain`] for `request`, if one is found.
    pub fn customize(&self, request: &mut Request<Body>) {
        let chain = match self {
            Self::None => None,
            Self::DirectTls => direct_chain(request.extensions()),
            Self::ForwardedHeader(extractor) => extractor
                .extract(request.headers())
                .map(PeerCertificateChain::single),
        };

        if let Some(chain) = chain {
            trace!(subject = %chain.leaf().subject(), "Client certificate attached");
            request.extensions_mut().insert(chain);
        }
    }
}

fn direct_chain(extensions: &Extensions) -> Option<PeerCertificateChain> {
    extensions
        .get::<TlsSession>()
        .and_then(|session| session.peer_certificates.clone())
}

/// Middleware applying the customizer to each request.
pub async fn customize_request(
    State(customizer): State<Arc<RequestCustomizer>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    customizer.customize(&mut request);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtls::ClientCertificate;
    use crate::mtls::testutil::self_signed;

    fn request_with_header(value: &str) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header("X-ClientCert", value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn forwarded_header_attaches_single_certificate() {
        // GIVEN: a plain-encoded certificate header
        let (cert, _) = self_signed("proxy-client");
        let header = cert.pem().trim().replace('\n', " ");
        let mut request = request_with_header(&header);

        // WHEN: customizing in forwarded-header mode
        RequestCustomizer::from_kind(CustomizerKind::ForwardedHeader).customize(&mut request);

        // THEN: a one-element chain holding exactly that certificate
        let chain = request.extensions().get::<PeerCertificateChain>().unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.leaf().der(), cert.der());
    }

    #[test]
    fn malformed_header_attaches_nothing() {
        let mut request = request_with_header("not a certificate");
        RequestCustomizer::from_kind(CustomizerKind::ForwardedHeader).customize(&mut request);
        assert!(request.extensions().get::<PeerCertificateChain>().is_none());
    }

    #[test]
    fn direct_tls_uses_session_chain_and_ignores_header() {
        // GIVEN: a TLS session chain and a forged header naming someone else
        let (session_cert, _) = self_signed("tls-client");
        let (forged, _) = self_signed("forged");
        let mut request = request_with_header(&forged.pem().trim().replace('\n', " "));
        let chain = PeerCertificateChain::single(
            ClientCertificate::from_der(session_cert.der().clone()).unwrap(),
        );
        request.extensions_mut().insert(TlsSession {
            peer_certificates: Some(chain),
        });

        // WHEN: customizing in direct mode
        RequestCustomizer::DirectTls.customize(&mut request);

        // THEN: the session's certificate wins
        let attached = request.extensions().get::<PeerCertificateChain>().unwrap();
        assert_eq!(attached.leaf().common_name(), Some("tls-client"));
    }

    #[test]
    fn none_never_attaches() {
        let (cert, _) = self_signed("ignored");
        let mut request = request_with_header(&cert.pem().trim().replace('\n', " "));
        RequestCustomizer::None.customize(&mut request);
        assert!(request.extensions().get::<PeerCertificateChain>().is_none());
    }
}
