//! HTTP front-end: router, request customization and the listeners

pub mod customizer;
mod router;
mod server;

pub use customizer::{RequestCustomizer, TlsSession, customize_request};
pub use router::create_router;
pub use server::Frontend;
