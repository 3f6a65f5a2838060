//! Front-end server

use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Router};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::customizer::{RequestCustomizer, TlsSession};
use super::router::create_router;
use crate::config::{Config, CustomizerKind};
use crate::mtls::{
    ExpiryScheduler, ListenerConfig, PeerCertificateChain, build_listener, build_plain_listener,
};
use crate::Result;

/// The TLS front-end server
pub struct Frontend {
    /// Bound listener parameters
    listener: ListenerConfig,
    /// Request customizer selection
    customizer: CustomizerKind,
    /// Expiry warnings for the server certificate
    scheduler: ExpiryScheduler,
    /// Stops the accept loop and the scheduler
    cancel: CancellationToken,
}

impl Frontend {
    /// Load TLS material (when enabled) and assemble the listener.
    ///
    /// Must be called inside a Tokio runtime: the expiry scheduler starts
    /// here.
    ///
    /// # Errors
    ///
    /// Any store loading failure, or an untrusted server certificate in
    /// strict mode.
    pub fn new(config: &Config) -> Result<Self> {
        let cancel = CancellationToken::new();
        let scheduler = ExpiryScheduler::spawn(cancel.child_token());

        let host = &config.server.host;
        let port = config.effective_port();
        let listener = if config.tls.enabled {
            build_listener(host, port, &config.tls, &scheduler)?
        } else {
            build_plain_listener(host, port)
        };

        if config.server.customizer == CustomizerKind::DirectTls && !listener.is_tls() {
            warn!("direct_tls customizer on a plain listener: no client certificate will ever be attached");
        }

        Ok(Self {
            listener,
            customizer: config.server.customizer,
            scheduler,
            cancel,
        })
    }

    /// The assembled listener configuration.
    #[must_use]
    pub fn listener(&self) -> &ListenerConfig {
        &self.listener
    }

    /// Token that stops the server when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop background work without serving (used by `check`).
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.scheduler.shutdown().await;
    }

    /// Bind the configured address and serve until Ctrl+C / SIGTERM.
    pub async fn run(self) -> Result<()> {
        let tcp = TcpListener::bind(self.listener.bind_address()).await?;
        tokio::spawn(shutdown_signal(self.cancel.clone()));
        self.serve(tcp).await
    }

    /// Serve on an already bound socket until the cancellation token fires.
    pub async fn serve(self, tcp: TcpListener) -> Result<()> {
        let router = create_router(Arc::new(RequestCustomizer::from_kind(self.customizer)));
        let local_addr = tcp.local_addr()?;

        info!(
            addr = %local_addr,
            tls = self.listener.is_tls(),
            require_client_auth = self.listener.require_client_auth,
            customizer = ?self.customizer,
            version = env!("CARGO_PKG_VERSION"),
            "Listening"
        );

        let acceptor = self
            .listener
            .tls
            .as_ref()
            .map(|tls| TlsAcceptor::from(Arc::clone(&tls.server_config)));
        serve_connections(tcp, acceptor, router, self.cancel.clone()).await;

        info!("Server stopped");
        self.cancel.cancel();
        self.scheduler.shutdown().await;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accept loop
// ─────────────────────────────────────────────────────────────────────────────

/// Upper bound on a TLS handshake; a silent client is dropped after this.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long open connections may finish in-flight requests after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

async fn serve_connections(
    tcp: TcpListener,
    acceptor: Option<TlsAcceptor>,
    router: Router,
    cancel: CancellationToken,
) {
    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = tcp.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let router = router.clone();
        let cancel = cancel.clone();
        connections.spawn(async move {
            let Some(acceptor) = acceptor else {
                serve_http(stream, router, &cancel, peer).await;
                return;
            };

            let tls = tokio::select! {
                () = cancel.cancelled() => return,
                handshake = timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)) => match handshake {
                    Ok(Ok(tls)) => tls,
                    Ok(Err(e)) => {
                        debug!(peer = %peer, error = %e, "TLS handshake failed");
                        return;
                    }
                    Err(_) => {
                        debug!(peer = %peer, "TLS handshake timed out");
                        return;
                    }
                },
            };

            let session = session_info(&tls);
            serve_http(tls, router.layer(Extension(session)), &cancel, peer).await;
        });
    }

    connections.close();
    connections.wait().await;
}

/// HTTP/1.1 on one connection. No `Server` or `Date` header is added.
async fn serve_http<S>(io: S, router: Router, cancel: &CancellationToken, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = TowerToHyperService::new(router);
    let mut conn = pin!(
        http1::Builder::new()
            .auto_date_header(false)
            .serve_connection(TokioIo::new(io), service)
    );

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = cancel.cancelled() => {
            conn.as_mut().graceful_shutdown();
            match timeout(SHUTDOWN_GRACE, conn.as_mut()).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(peer = %peer, "Connection still open after shutdown grace, dropping");
                    return;
                }
            }
        }
    };
    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "Connection closed with error");
    }
}

/// Peer certificate chain of an established TLS session.
fn session_info(tls: &TlsStream<tokio::net::TcpStream>) -> TlsSession {
    let (_, connection) = tls.get_ref();
    let peer_certificates = connection.peer_certificates().and_then(|certs| {
        PeerCertificateChain::from_der_chain(certs).unwrap_or_else(|e| {
            debug!(error = %e, "Unparsable peer certificate");
            None
        })
    });
    TlsSession { peer_certificates }
}

/// Shutdown signal handler
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
        () = cancel.cancelled() => return,
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
