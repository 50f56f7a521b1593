use std::sync::Arc;

use idscp2_tls::SecureChannel;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use crate::clock::Clock;
use crate::config::Idscp2Config;
use crate::dat::{DatProvider, DatVerifier};
use crate::error::Idscp2Error;
use crate::fsm::worker::{ConnectionCallbacks, DriverSet};
use crate::fsm::{ConnectionState, FsmCore, FsmEvent};

/// A cheap, `Clone`-able handle onto a running connection's FSM worker —
/// an `Arc`-backed `mpsc::Sender<FsmEvent>` plus a `watch::Receiver` for the
/// fast, lock-free `NotEstablished` check `send` needs.
#[derive(Clone)]
pub struct Idscp2Connection {
    events: mpsc::Sender<FsmEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl Idscp2Connection {
    /// Builds a connection whose FSM starts in `STATE_CLOSED`, spawns its
    /// worker task, and immediately synthesizes the `START` event — the
    /// shared construction path used by both the client connector and the
    /// server's accept loop.
    pub fn spawn(
        config: Arc<Idscp2Config>,
        clock: Arc<dyn Clock>,
        dat_provider: Arc<dyn DatProvider>,
        dat_verifier: Arc<dyn DatVerifier>,
        local_cert_hash: Vec<u8>,
        peer_cert_hash: Vec<u8>,
        channel: SecureChannel,
        drivers: DriverSet,
        callbacks: ConnectionCallbacks,
    ) -> Self {
        let core = FsmCore::new(
            config.clone(),
            clock.clone(),
            dat_provider,
            dat_verifier,
            local_cert_hash,
            peer_cert_hash,
        );
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);

        let start_tx = events_tx.clone();
        tokio::spawn(crate::fsm::worker::run(
            core,
            channel,
            drivers,
            clock,
            callbacks,
            events_tx.clone(),
            events_rx,
            state_tx,
        ));
        tokio::spawn(async move {
            let _ = start_tx.send(FsmEvent::Start).await;
        });

        Self {
            events: events_tx,
            state: state_rx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Sends a user payload. Fails immediately with `NotEstablished` outside
    /// `STATE_ESTABLISHED` rather than implicitly queueing.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), Idscp2Error> {
        if !self.state().is_established() {
            return Err(Idscp2Error::NotEstablished);
        }
        self.events
            .send(FsmEvent::UserSend(payload))
            .await
            .map_err(|_| Idscp2Error::Closed)
    }

    pub async fn repeat_rat(&self) -> Result<(), Idscp2Error> {
        if self.state().is_closed() {
            return Err(Idscp2Error::Closed);
        }
        self.events
            .send(FsmEvent::UserRepeatRat)
            .await
            .map_err(|_| Idscp2Error::Closed)
    }

    pub async fn close(&self) {
        if self.events.send(FsmEvent::UserClose).await.is_err() {
            warn!("connection already closed");
        }
    }
}
