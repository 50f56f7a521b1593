//! The IDSCP2 listener: accepts TCP connections, upgrades each to TLS, and
//! wires the result into a fresh FSM worker. A plain `async fn` accept loop,
//! since this workspace has exactly one TLS backend (rustls) and no
//! pluggable-backend problem to solve.

mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use idscp2_core::{
    Clock, ConnectionCallbacks, DatProvider, DatVerifier, DriverSet, Idscp2Config,
    Idscp2Connection, TokioClock,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub use error::ServerError;

/// A bound IDSCP2 listener. `serve` runs the accept loop until the listener
/// itself errors or the process shuts down; a single peer's setup failure
/// (TCP/TLS/cert-hash trouble) is logged and the loop continues, per
/// "per-connection errors do not terminate the listener".
pub struct Idscp2Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<Idscp2Config>,
    clock: Arc<dyn Clock>,
    dat_provider: Arc<dyn DatProvider>,
    dat_verifier: Arc<dyn DatVerifier>,
    drivers: DriverSet,
}

impl Idscp2Server {
    pub async fn bind(
        addr: SocketAddr,
        config: Idscp2Config,
        dat_provider: Arc<dyn DatProvider>,
        dat_verifier: Arc<dyn DatVerifier>,
        drivers: DriverSet,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;
        info!(%local_addr, "idscp2 listener bound");
        Ok(Self {
            listener,
            local_addr,
            config: Arc::new(config),
            clock: Arc::new(TokioClock),
            dat_provider,
            dat_verifier,
            drivers,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop. `callbacks_factory` is invoked once per
    /// accepted peer to build that connection's single-registration
    /// callbacks; `on_connection` is then invoked with the spawned handle,
    /// mirroring "spawn the FSM worker -> invoke on_connection".
    pub async fn serve<CB, OC>(self, callbacks_factory: CB, mut on_connection: OC) -> !
    where
        CB: Fn(SocketAddr) -> ConnectionCallbacks + Send + Sync + 'static,
        OC: FnMut(Idscp2Connection) + Send,
    {
        loop {
            let (tcp, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed, retrying");
                    continue;
                }
            };

            let tls_config = self.config.tls.clone();
            let channel = match idscp2_tls::accept_server(&tls_config, tcp).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(%peer_addr, error = %e, "tls handshake failed");
                    continue;
                }
            };

            let peer_cert_hash = match channel.peer_cert_hash() {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(%peer_addr, error = %e, "no peer certificate presented");
                    continue;
                }
            };
            // The listener's own identity hash: the first configured
            // identity, or the forced alias if one is set. A real deployment
            // with exactly one server identity makes this unambiguous.
            let local_cert_hash = match self.local_identity_hash() {
                Some(hash) => hash,
                None => {
                    error!("no local TLS identity configured, cannot accept connections");
                    continue;
                }
            };

            let callbacks = callbacks_factory(peer_addr);
            let connection = Idscp2Connection::spawn(
                self.config.clone(),
                self.clock.clone(),
                self.dat_provider.clone(),
                self.dat_verifier.clone(),
                local_cert_hash,
                peer_cert_hash,
                channel,
                self.drivers.clone(),
                callbacks,
            );
            on_connection(connection);
        }
    }

    fn local_identity_hash(&self) -> Option<Vec<u8>> {
        use sha2::{Digest, Sha256};
        let alias = self.config.tls.forced_alias.as_deref();
        let identity = match alias {
            Some(alias) => self
                .config
                .tls
                .identities
                .iter()
                .find(|id| id.alias == alias),
            None => self.config.tls.identities.first(),
        }?;
        let cert = identity.cert_chain.first()?;
        Some(Sha256::digest(cert.as_ref()).to_vec())
    }
}
