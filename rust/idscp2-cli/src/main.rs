use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use idscp2_core::{
    Clock, ConnectionCallbacks, DatProvider, DatVerifier, DriverSet, DummyDatProvider,
    DummyDatVerifier, Idscp2Config, Idscp2Connection, TokioClock,
};
use idscp2_rat::{dummy_driver_factory, DriverRegistry};
use idscp2_tls::{ClientCertVerify, PeerCertVerify, TlsConfig, TlsIdentity, TlsPrivateKey};
use rustls_pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[clap(author, version, about = "IDSCP2 demo client/server")]
struct Args {
    #[clap(subcommand)]
    mode: Mode,

    /// PEM certificate chain for this endpoint's identity
    #[clap(long)]
    cert: PathBuf,

    /// PEM private key matching --cert
    #[clap(long)]
    key: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Listen for inbound connections
    Server {
        #[clap(long, default_value = "127.0.0.1:29292")]
        bind: SocketAddr,
    },
    /// Connect to a running server
    Client {
        #[clap(long, default_value = "127.0.0.1:29292")]
        connect: SocketAddr,
    },
}

fn load_identity(cert: &PathBuf, key: &PathBuf) -> Result<TlsIdentity, Box<dyn std::error::Error>> {
    let cert_bytes = std::fs::read(cert)?;
    let key_bytes = std::fs::read(key)?;
    let cert_chain: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut cert_bytes.as_slice()).collect::<Result<_, _>>()?;
    let key = rustls_pemfile::private_key(&mut key_bytes.as_slice())?
        .ok_or("no private key found in --key file")?;
    Ok(TlsIdentity {
        alias: "demo".to_string(),
        cert_chain,
        key: TlsPrivateKey(key),
    })
}

fn demo_config(identity: TlsIdentity) -> Idscp2Config {
    let mut config = Idscp2Config::default();
    config.tls = TlsConfig {
        identities: vec![identity],
        forced_alias: Some("demo".to_string()),
        // Demo certs are self-signed with no shared root, so full WebPKI
        // verification would always fail; this binary exists to exercise
        // the FSM, not to demonstrate certificate validation policy.
        peer_cert_verify: PeerCertVerify::Insecure,
        client_cert_verify: ClientCertVerify::Ignore,
        root_cert: None,
        alpn_protocols: Vec::new(),
    };
    config
}

fn demo_drivers() -> DriverSet {
    let prover: DriverRegistry<idscp2_rat::Prover> = DriverRegistry::new();
    prover.register("dummy", Arc::new(dummy_driver_factory)).unwrap();
    let verifier: DriverRegistry<idscp2_rat::Verifier> = DriverRegistry::new();
    verifier.register("dummy", Arc::new(dummy_driver_factory)).unwrap();
    DriverSet {
        prover: Arc::new(prover),
        verifier: Arc::new(verifier),
    }
}

fn local_identity_hash(config: &Idscp2Config) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let cert = config.tls.identities[0].cert_chain.first().expect("identity has no cert");
    Sha256::digest(cert.as_ref()).to_vec()
}

fn demo_callbacks(role: &'static str) -> ConnectionCallbacks {
    ConnectionCallbacks {
        on_message: Box::new(move |bytes| {
            eprintln!("[{role}] received {} bytes: {:?}", bytes.len(), String::from_utf8_lossy(&bytes));
        }),
        on_error: Box::new(move |e| {
            eprintln!("[{role}] connection error: {e}");
        }),
        on_close: Box::new(move || {
            eprintln!("[{role}] connection closed");
        }),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let identity = load_identity(&args.cert, &args.key)?;
    let config = demo_config(identity);
    let dat_provider: Arc<dyn DatProvider> = Arc::new(DummyDatProvider::new(Duration::from_secs(3600)));
    let dat_verifier: Arc<dyn DatVerifier> = Arc::new(DummyDatVerifier::new(Duration::from_secs(3600)));
    let drivers = demo_drivers();

    match args.mode {
        Mode::Server { bind } => {
            let server = idscp2_server::Idscp2Server::bind(
                bind,
                config,
                dat_provider,
                dat_verifier,
                drivers,
            )
            .await?;
            eprintln!("listening on {}", server.local_addr());
            server
                .serve(
                    |peer| {
                        eprintln!("accepted connection from {peer}");
                        demo_callbacks("server")
                    },
                    |connection| {
                        tokio::spawn(async move {
                            let _ = connection.send(b"hello from server".to_vec()).await;
                        });
                    },
                )
                .await;
        }
        Mode::Client { connect } => {
            let local_cert_hash = local_identity_hash(&config);
            let tcp = TcpStream::connect(connect).await?;
            let sni = ServerName::try_from("idscp2-demo".to_string())?;
            let channel = idscp2_tls::connect_client(&config.tls, sni, tcp).await?;
            let peer_cert_hash = channel.peer_cert_hash()?;

            let connection = Idscp2Connection::spawn(
                Arc::new(config),
                Arc::new(TokioClock) as Arc<dyn Clock>,
                dat_provider,
                dat_verifier,
                local_cert_hash,
                peer_cert_hash,
                channel,
                drivers,
                demo_callbacks("client"),
            );

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            eprintln!("type a line to send it once the connection is established, or Ctrl-D to quit");
            while let Some(line) = lines.next_line().await? {
                if let Err(e) = connection.send(line.into_bytes()).await {
                    eprintln!("send failed: {e}");
                }
            }
            connection.close().await;
        }
    }

    Ok(())
}
