use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::RatError;

/// Marker type identifying the local, proving side of an attestation exchange.
#[derive(Debug, Clone, Copy)]
pub struct Prover;

/// Marker type identifying the remote-verifying side of an attestation exchange.
#[derive(Debug, Clone, Copy)]
pub struct Verifier;

/// What a running driver reports back to the FSM.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// An opaque blob to be carried inside a `RAT_PROVER`/`RAT_VERIFIER`
    /// message to the peer.
    Message(Vec<u8>),
    /// The attestation succeeded; the driver task is about to exit.
    Ok,
    /// The attestation failed; the driver task is about to exit.
    Failed,
}

/// Everything a driver needs to run one attestation exchange: identifying
/// material for the two peers and the outbound channel feeding its events
/// back to the owning connection's FSM.
pub struct DriverContext {
    pub local_cert_hash: Vec<u8>,
    pub peer_cert_hash: Vec<u8>,
    pub outbound: mpsc::UnboundedSender<DriverEvent>,
}

/// A driver implementation: given its context and a queue of messages
/// delegated to it from the peer, runs to completion and reports exactly one
/// `Ok` or `Failed` before returning.
pub type DriverFn =
    dyn Fn(DriverContext, mpsc::UnboundedReceiver<Vec<u8>>) -> JoinHandle<()> + Send + Sync;

/// A live driver task plus the bookkeeping needed to feed it delegated
/// messages and to tell stale notifications apart from current ones.
pub struct DriverHandle {
    pub(crate) generation: u64,
    pub(crate) inbound: mpsc::UnboundedSender<Vec<u8>>,
    pub(crate) join: JoinHandle<()>,
}

const STOP_GRACE: Duration = Duration::from_secs(2);

impl DriverHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forwards a delegated message from the peer into the running driver.
    pub fn deliver(&self, bytes: Vec<u8>) -> Result<(), RatError> {
        self.inbound.send(bytes).map_err(|_| RatError::ChannelClosed)
    }

    /// Drops the inbound half (driver implementations are expected to exit
    /// once it closes) and waits up to [`STOP_GRACE`] for the task to join.
    /// A task that blows past the grace period is logged and detached
    /// rather than awaited forever, per the cooperative-cancellation
    /// contract drivers are required to honor.
    pub async fn stop(self) {
        drop(self.inbound);
        match tokio::time::timeout(STOP_GRACE, self.join).await {
            Ok(Ok(())) => debug!("rat driver task stopped cleanly"),
            Ok(Err(e)) => warn!(error = %e, "rat driver task panicked"),
            Err(_) => warn!("rat driver task did not stop within grace period, detaching"),
        }
    }
}
