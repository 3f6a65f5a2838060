//! Direct mutual TLS: listener assembly and live handshakes.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use common::{Ca, tls_config, write_stores};
use tls_frontend::Error;
use tls_frontend::config::{Config, CustomizerKind};
use tls_frontend::frontend::Frontend;
use tls_frontend::mtls::KeyStorePassword;

struct Running {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<tls_frontend::Result<()>>,
}

async fn start(config: &Config) -> Running {
    let frontend = Frontend::new(config).unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let cancel = frontend.cancellation_token();
    let task = tokio::spawn(frontend.serve(tcp));
    Running { addr, cancel, task }
}

fn client_config(ca: &Ca, identity: Option<(&rcgen::Certificate, &rcgen::KeyPair)>) -> ClientConfig {
    let mut roots = RootCertStore::empty();
    roots.add(ca.cert.der().clone()).unwrap();
    let builder = ClientConfig::builder().with_root_certificates(roots);
    match identity {
        Some((cert, key)) => builder
            .with_client_auth_cert(
                vec![cert.der().clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
            )
            .unwrap(),
        None => builder.with_no_client_auth(),
    }
}

/// GET /whoami over TLS, returning the raw HTTP response.
async fn get_whoami(addr: SocketAddr, config: ClientConfig) -> std::io::Result<String> {
    let connector = TlsConnector::from(Arc::new(config));
    let tcp = TcpStream::connect(addr).await?;
    let server_name = ServerName::try_from("server.test").unwrap();
    let mut tls = connector.connect(server_name, tcp).await?;

    tls.write_all(b"GET /whoami HTTP/1.1\r\nHost: server.test\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = Vec::new();
    tls.read_to_end(&mut response).await?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

#[tokio::test]
async fn client_certificate_from_handshake_reaches_handler() {
    // GIVEN: a TLS listener in direct mode and a client holding a CA-issued cert
    let dir = tempfile::tempdir().unwrap();
    let ca = Ca::new("Frontend CA");
    let (server, server_key) = ca.issue("server", 365);
    let (client, client_key) = ca.issue("carol", 30);
    let (trust, key_store) = write_stores(dir.path(), &ca, &server, &server_key);
    let running = start(&tls_config(&trust, &key_store, CustomizerKind::DirectTls)).await;

    // WHEN: the client calls /whoami
    let response = get_whoami(running.addr, client_config(&ca, Some((&client, &client_key))))
        .await
        .unwrap();

    // THEN: the handler sees the handshake identity
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"common_name\":\"carol\""), "{response}");

    running.cancel.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn anonymous_client_allowed_when_certificate_optional() {
    let dir = tempfile::tempdir().unwrap();
    let ca = Ca::new("Frontend CA");
    let (server, server_key) = ca.issue("server", 365);
    let (trust, key_store) = write_stores(dir.path(), &ca, &server, &server_key);
    let running = start(&tls_config(&trust, &key_store, CustomizerKind::DirectTls)).await;

    let response = get_whoami(running.addr, client_config(&ca, None)).await.unwrap();

    assert!(response.contains("\"subject\":\"anonymous\""), "{response}");
    running.cancel.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn anonymous_client_rejected_when_certificate_required() {
    // GIVEN: a listener requiring client certificates
    let dir = tempfile::tempdir().unwrap();
    let ca = Ca::new("Frontend CA");
    let (server, server_key) = ca.issue("server", 365);
    let (trust, key_store) = write_stores(dir.path(), &ca, &server, &server_key);
    let mut config = tls_config(&trust, &key_store, CustomizerKind::DirectTls);
    config.tls.require_client_cert = true;
    let running = start(&config).await;

    // WHEN: a client without a certificate connects
    let result = get_whoami(running.addr, client_config(&ca, None)).await;

    // THEN: no response is served
    assert!(
        !matches!(result, Ok(ref response) if response.starts_with("HTTP/1.1 200")),
        "{result:?}"
    );
    running.cancel.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn wrong_passphrase_prevents_startup() {
    let dir = tempfile::tempdir().unwrap();
    let ca = Ca::new("Frontend CA");
    let (server, server_key) = ca.issue("server", 365);
    let (trust, key_store) = write_stores(dir.path(), &ca, &server, &server_key);
    let mut config = tls_config(&trust, &key_store, CustomizerKind::None);
    config.tls.key_store_password = KeyStorePassword::new("not-the-passphrase");

    let result = Frontend::new(&config);

    assert!(matches!(result, Err(Error::KeyStoreDecrypt { .. })));
}

#[tokio::test]
async fn untrusted_server_certificate_is_lenient_unless_strict() {
    // GIVEN: a server cert issued by a CA the trust store does not contain
    let dir = tempfile::tempdir().unwrap();
    let trusted = Ca::new("Trusted CA");
    let other = Ca::new("Other CA");
    let (server, server_key) = other.issue("server", 365);
    let (trust, key_store) = write_stores(dir.path(), &trusted, &server, &server_key);
    let mut config = tls_config(&trust, &key_store, CustomizerKind::None);

    // THEN: lenient mode still builds the listener
    let frontend = Frontend::new(&config).unwrap();
    assert!(frontend.listener().is_tls());
    frontend.shutdown().await;

    // THEN: strict mode refuses to start
    config.tls.fail_on_untrusted_server_cert = true;
    let result = Frontend::new(&config);
    assert!(matches!(result, Err(Error::UntrustedServerCertificate { .. })));
}

#[tokio::test]
async fn plain_listener_serves_health_and_stops_on_cancel() {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    let running = start(&config).await;

    let mut tcp = TcpStream::connect(running.addr).await.unwrap();
    tcp.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    tcp.read_to_string(&mut response).await.unwrap();
    assert!(response.contains("\"status\":\"healthy\""), "{response}");

    running.cancel.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn silent_tls_client_does_not_block_shutdown() {
    // GIVEN: a TLS listener and a client that connects but never sends a ClientHello
    let dir = tempfile::tempdir().unwrap();
    let ca = Ca::new("Frontend CA");
    let (server, server_key) = ca.issue("server", 365);
    let (trust, key_store) = write_stores(dir.path(), &ca, &server, &server_key);
    let running = start(&tls_config(&trust, &key_store, CustomizerKind::DirectTls)).await;
    let _silent = TcpStream::connect(running.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // WHEN: the server is cancelled
    running.cancel.cancel();

    // THEN: serving returns without waiting for the handshake
    let stopped = tokio::time::timeout(Duration::from_secs(5), running.task).await;
    assert!(stopped.is_ok(), "server still running after cancellation");
    stopped.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn idle_plain_client_does_not_block_shutdown() {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    let running = start(&config).await;
    let _idle = TcpStream::connect(running.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    running.cancel.cancel();

    let stopped = tokio::time::timeout(Duration::from_secs(10), running.task).await;
    assert!(stopped.is_ok(), "server still running after cancellation");
    stopped.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn responses_carry_no_date_or_server_header() {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    let running = start(&config).await;

    let mut tcp = TcpStream::connect(running.addr).await.unwrap();
    tcp.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    tcp.read_to_string(&mut response).await.unwrap();

    let head = response.split("\r\n\r\n").next().unwrap().to_ascii_lowercase();
    assert!(head.starts_with("http/1.1 200"), "{response}");
    assert!(!head.contains("\r\ndate:"), "{head}");
    assert!(!head.contains("\r\nserver:"), "{head}");

    running.cancel.cancel();
    running.task.await.unwrap().unwrap();
}
