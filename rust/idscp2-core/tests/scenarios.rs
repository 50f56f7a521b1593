//! End-to-end scenarios wiring two `Idscp2Connection`s over a real loopback
//! TCP+TLS socket, exercising the happy-path handshake, a RAT driver
//! mismatch, and a failing attestation driver.

use std::sync::Arc;
use std::time::Duration;

use idscp2_core::{
    ConnectionCallbacks, ConnectionState, DriverSet, DummyDatProvider, DummyDatVerifier,
    Idscp2Config, Idscp2Connection, TokioClock,
};
use idscp2_rat::{dummy_driver_factory, DriverContext, DriverEvent, DriverRegistry, Prover, Verifier};
use idscp2_tls::{ClientCertVerify, PeerCertVerify, TlsConfig, TlsIdentity, TlsPrivateKey};
use rustls_pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn self_signed_identity(alias: &str) -> TlsIdentity {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    TlsIdentity {
        alias: alias.to_string(),
        cert_chain: vec![cert.der().clone()],
        key: TlsPrivateKey(key),
    }
}

/// Builds a mutually-authenticating client/server config pair: each side's
/// self-signed cert is the other side's sole trusted root, since IDSCP2
/// connections are mutually authenticated end to end.
fn config_pair(
    client_provers: &[&str],
    client_verifiers: &[&str],
    server_provers: &[&str],
    server_verifiers: &[&str],
) -> (Idscp2Config, Idscp2Config) {
    let client_identity = self_signed_identity("client");
    let server_identity = self_signed_identity("server");
    let client_root = client_identity.cert_chain[0].clone();
    let server_root = server_identity.cert_chain[0].clone();

    let mut client = Idscp2Config::default();
    client.tls = TlsConfig {
        identities: vec![client_identity],
        forced_alias: Some("client".to_string()),
        peer_cert_verify: PeerCertVerify::Insecure,
        client_cert_verify: ClientCertVerify::Ignore,
        root_cert: Some(server_root),
        alpn_protocols: Vec::new(),
    };
    client.supported_rat_provers = client_provers.iter().map(|s| s.to_string()).collect();
    client.supported_rat_verifiers = client_verifiers.iter().map(|s| s.to_string()).collect();
    client.handshake_timeout = Duration::from_secs(5);
    client.rat_timeout = Duration::from_secs(5);

    let mut server = Idscp2Config::default();
    server.tls = TlsConfig {
        identities: vec![server_identity],
        forced_alias: Some("server".to_string()),
        peer_cert_verify: PeerCertVerify::Insecure,
        client_cert_verify: ClientCertVerify::Require {
            roots: vec![client_root],
        },
        root_cert: None,
        alpn_protocols: Vec::new(),
    };
    server.supported_rat_provers = server_provers.iter().map(|s| s.to_string()).collect();
    server.supported_rat_verifiers = server_verifiers.iter().map(|s| s.to_string()).collect();
    server.handshake_timeout = Duration::from_secs(5);
    server.rat_timeout = Duration::from_secs(5);

    (client, server)
}

fn drivers_with(factory: Arc<idscp2_rat::DriverFn>) -> DriverSet {
    let prover: DriverRegistry<Prover> = DriverRegistry::new();
    prover.register("dummy", factory.clone()).unwrap();
    let verifier: DriverRegistry<Verifier> = DriverRegistry::new();
    verifier.register("dummy", factory).unwrap();
    DriverSet {
        prover: Arc::new(prover),
        verifier: Arc::new(verifier),
    }
}

fn dummy_drivers() -> DriverSet {
    drivers_with(Arc::new(dummy_driver_factory))
}

/// A driver that always reports failure without exchanging any messages.
fn failing_driver_factory(
    ctx: DriverContext,
    _inbound: mpsc::UnboundedReceiver<Vec<u8>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let _ = ctx.outbound.send(DriverEvent::Failed);
    })
}

struct Harness {
    connection: Idscp2Connection,
    messages: mpsc::UnboundedReceiver<Vec<u8>>,
    errors: mpsc::UnboundedReceiver<idscp2_core::Idscp2Error>,
    closed: mpsc::UnboundedReceiver<()>,
}

fn callbacks() -> (
    ConnectionCallbacks,
    mpsc::UnboundedReceiver<Vec<u8>>,
    mpsc::UnboundedReceiver<idscp2_core::Idscp2Error>,
    mpsc::UnboundedReceiver<()>,
) {
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    let (err_tx, err_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = mpsc::unbounded_channel();
    let cb = ConnectionCallbacks {
        on_message: Box::new(move |bytes| {
            let _ = msg_tx.send(bytes);
        }),
        on_error: Box::new(move |e| {
            let _ = err_tx.send(e);
        }),
        on_close: Box::new(move || {
            let _ = close_tx.send(());
        }),
    };
    (cb, msg_rx, err_rx, close_rx)
}

async fn wait_for_state(connection: &Idscp2Connection, target: ConnectionState) {
    timeout(WAIT, async {
        loop {
            if connection.state() == target {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {target:?}, saw {:?}", connection.state()));
}

/// Connects a client/server pair over a real loopback TCP+TLS socket and
/// spawns an `Idscp2Connection` on each side, using the given per-side
/// configs and driver sets.
async fn spawn_pair(
    client_config: Idscp2Config,
    server_config: Idscp2Config,
    client_drivers: DriverSet,
    server_drivers: DriverSet,
) -> (Harness, Harness) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_tls = server_config.tls.clone();
    let accept_task = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        idscp2_tls::accept_server(&server_tls, tcp).await.unwrap()
    });

    let tcp = TcpStream::connect(addr).await.unwrap();
    let sni = ServerName::try_from("localhost".to_string()).unwrap();
    let client_channel = idscp2_tls::connect_client(&client_config.tls, sni, tcp)
        .await
        .unwrap();
    let server_channel = accept_task.await.unwrap();

    let client_peer_hash = client_channel.peer_cert_hash().unwrap();
    let server_peer_hash = server_channel.peer_cert_hash().unwrap();

    let (client_cb, client_msgs, client_errs, client_closed) = callbacks();
    let (server_cb, server_msgs, server_errs, server_closed) = callbacks();

    let dat_provider: Arc<dyn idscp2_core::DatProvider> =
        Arc::new(DummyDatProvider::new(Duration::from_secs(60)));
    let dat_verifier: Arc<dyn idscp2_core::DatVerifier> =
        Arc::new(DummyDatVerifier::new(Duration::from_secs(60)));

    let client = Idscp2Connection::spawn(
        Arc::new(client_config),
        Arc::new(TokioClock),
        dat_provider.clone(),
        dat_verifier.clone(),
        client_peer_hash.clone(),
        server_peer_hash.clone(),
        client_channel,
        client_drivers,
        client_cb,
    );
    let server = Idscp2Connection::spawn(
        Arc::new(server_config),
        Arc::new(TokioClock),
        dat_provider,
        dat_verifier,
        server_peer_hash,
        client_peer_hash,
        server_channel,
        server_drivers,
        server_cb,
    );

    (
        Harness {
            connection: client,
            messages: client_msgs,
            errors: client_errs,
            closed: client_closed,
        },
        Harness {
            connection: server,
            messages: server_msgs,
            errors: server_errs,
            closed: server_closed,
        },
    )
}

#[tokio::test]
async fn handshake_succeeds_and_data_flows_both_ways() {
    let (client_config, server_config) =
        config_pair(&["dummy"], &["dummy"], &["dummy"], &["dummy"]);
    let (mut client, mut server) =
        spawn_pair(client_config, server_config, dummy_drivers(), dummy_drivers()).await;

    wait_for_state(&client.connection, ConnectionState::Established).await;
    wait_for_state(&server.connection, ConnectionState::Established).await;

    client
        .connection
        .send(b"hello from client".to_vec())
        .await
        .unwrap();
    let received = timeout(WAIT, server.messages.recv()).await.unwrap().unwrap();
    assert_eq!(received, b"hello from client");

    server
        .connection
        .send(b"hello from server".to_vec())
        .await
        .unwrap();
    let received = timeout(WAIT, client.messages.recv()).await.unwrap().unwrap();
    assert_eq!(received, b"hello from server");
}

#[tokio::test]
async fn mismatched_rat_drivers_close_both_sides() {
    let (client_config, server_config) =
        config_pair(&["dummy"], &["dummy"], &["other"], &["other"]);
    let (mut client, mut server) =
        spawn_pair(client_config, server_config, dummy_drivers(), dummy_drivers()).await;

    wait_for_state(&client.connection, ConnectionState::Closed).await;
    wait_for_state(&server.connection, ConnectionState::Closed).await;
    timeout(WAIT, client.closed.recv()).await.unwrap().unwrap();
    timeout(WAIT, server.closed.recv()).await.unwrap().unwrap();
    // Both sides independently reject the peer's HELLO, so both learn why
    // before onClose fires.
    let client_err = timeout(WAIT, client.errors.recv()).await.unwrap();
    assert!(matches!(client_err, Some(idscp2_core::Idscp2Error::NoMatchingRat)));
    let server_err = timeout(WAIT, server.errors.recv()).await.unwrap();
    assert!(matches!(server_err, Some(idscp2_core::Idscp2Error::NoMatchingRat)));
}

#[tokio::test]
async fn failing_prover_driver_tears_down_connection() {
    let (client_config, server_config) =
        config_pair(&["dummy"], &["dummy"], &["dummy"], &["dummy"]);
    let (mut client, mut server) = spawn_pair(
        client_config,
        server_config,
        drivers_with(Arc::new(failing_driver_factory)),
        dummy_drivers(),
    )
    .await;

    wait_for_state(&client.connection, ConnectionState::Closed).await;
    wait_for_state(&server.connection, ConnectionState::Closed).await;
    timeout(WAIT, client.closed.recv()).await.unwrap().unwrap();
    timeout(WAIT, server.closed.recv()).await.unwrap().unwrap();
    let client_err = timeout(WAIT, client.errors.recv()).await.unwrap();
    assert!(matches!(client_err, Some(idscp2_core::Idscp2Error::RatFailed)));
}
