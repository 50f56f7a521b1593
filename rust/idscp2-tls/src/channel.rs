use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::{ClientConfig, ServerConfig};
use rustls_pki_types::ServerName;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::{ClientCertVerify, TlsConfig};
use crate::error::TlsError;
use crate::resolver::AliasCertResolver;
use crate::verifier::make_verifier;

/// A TLS-secured byte stream, client- or server-side. The FSM and frame
/// reader only ever see this type, never `tokio_rustls`'s own stream types,
/// so the rest of the crate stays transport-agnostic.
pub enum SecureChannel {
    Client(tokio_rustls::client::TlsStream<TcpStream>),
    Server(tokio_rustls::server::TlsStream<TcpStream>),
}

impl SecureChannel {
    /// The SHA-256 digest of the peer's end-entity certificate, used to
    /// populate the `cert_hash` field of the `HELLO` message.
    pub fn peer_cert_hash(&self) -> Result<Vec<u8>, TlsError> {
        let certs = match self {
            SecureChannel::Client(s) => s.get_ref().1.peer_certificates(),
            SecureChannel::Server(s) => s.get_ref().1.peer_certificates(),
        };
        let cert = certs
            .and_then(|c| c.first())
            .ok_or(TlsError::MissingPeerCertificate)?;
        Ok(Sha256::digest(cert.as_ref()).to_vec())
    }
}

impl AsyncRead for SecureChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SecureChannel::Client(s) => Pin::new(s).poll_read(cx, buf),
            SecureChannel::Server(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SecureChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SecureChannel::Client(s) => Pin::new(s).poll_write(cx, buf),
            SecureChannel::Server(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SecureChannel::Client(s) => Pin::new(s).poll_flush(cx),
            SecureChannel::Server(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SecureChannel::Client(s) => Pin::new(s).poll_shutdown(cx),
            SecureChannel::Server(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Upgrades an already-connected TCP stream to TLS as the connecting party.
pub async fn connect_client(
    config: &TlsConfig,
    sni: ServerName<'static>,
    tcp: TcpStream,
) -> Result<SecureChannel, TlsError> {
    let provider = rustls::crypto::ring::default_provider();
    let verifier = make_verifier(config.peer_cert_verify, &config.root_cert)?;
    let resolver = AliasCertResolver::new(&config.identities, config.forced_alias.clone(), &provider)?;

    let mut client_config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_client_cert_resolver(Arc::new(resolver));
    client_config.alpn_protocols = config.alpn_protocols.clone();

    let connector = TlsConnector::from(Arc::new(client_config));
    let stream = connector.connect(sni, tcp).await?;
    Ok(SecureChannel::Client(stream))
}

/// Accepts a TCP connection and performs the TLS handshake as the listening
/// party, optionally requiring a client certificate per `client_cert_verify`.
pub async fn accept_server(config: &TlsConfig, tcp: TcpStream) -> Result<SecureChannel, TlsError> {
    let provider = rustls::crypto::ring::default_provider();
    let resolver = AliasCertResolver::new(&config.identities, config.forced_alias.clone(), &provider)?;

    let builder = ServerConfig::builder();
    let mut server_config = match &config.client_cert_verify {
        ClientCertVerify::Ignore => builder
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(resolver)),
        ClientCertVerify::Optional { roots } | ClientCertVerify::Require { roots } => {
            let mut store = rustls::RootCertStore::empty();
            let (loaded, ignored) = store.add_parsable_certificates(roots.iter().cloned());
            if loaded == 0 || ignored > 0 {
                return Err(TlsError::InvalidCertOrKey(
                    "client verification roots could not be parsed".into(),
                ));
            }
            let mut client_verifier_builder = rustls::server::WebPkiClientVerifier::builder(store.into());
            if matches!(config.client_cert_verify, ClientCertVerify::Optional { .. }) {
                client_verifier_builder = client_verifier_builder.allow_unauthenticated();
            }
            builder
                .with_client_cert_verifier(
                    client_verifier_builder
                        .build()
                        .map_err(|e| TlsError::InvalidCertOrKey(e.to_string()))?,
                )
                .with_cert_resolver(Arc::new(resolver))
        }
    };
    server_config.alpn_protocols = config.alpn_protocols.clone();

    let acceptor = TlsAcceptor::from(Arc::new(server_config));
    let stream = acceptor.accept(tcp).await?;
    Ok(SecureChannel::Server(stream))
}
