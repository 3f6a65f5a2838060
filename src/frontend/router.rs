//! HTTP router and handlers

use std::sync::Arc;

use axum::{Extension, Json, Router, middleware, response::IntoResponse, routing::get};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::customizer::{RequestCustomizer, customize_request};
use crate::mtls::PeerCertificateChain;

/// Create the router
///
/// The customizer runs before the handlers, so every handler sees the
/// [`PeerCertificateChain`] extension when a client certificate is known.
pub fn create_router(customizer: Arc<RequestCustomizer>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/whoami", get(whoami_handler))
        .layer(middleware::from_fn_with_state(customizer, customize_request))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /whoami - the client identity as seen by application code
async fn whoami_handler(chain: Option<Extension<PeerCertificateChain>>) -> impl IntoResponse {
    let Some(Extension(chain)) = chain else {
        return Json(json!({ "authenticated": false, "subject": "anonymous" }));
    };

    let leaf = chain.leaf();
    Json(json!({
        "authenticated": true,
        "subject": leaf.subject(),
        "common_name": leaf.common_name(),
        "serial": leaf.serial(),
        "chain_length": chain.len(),
    }))
}
