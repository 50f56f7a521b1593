use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::driver::{DriverContext, DriverEvent};

/// A reference attestation driver, usable as both prover and verifier: it
/// sends one opaque proof blob, waits for the peer's matching driver to send
/// one back, and then reports success. It performs no cryptographic
/// verification and exists so the FSM and its wiring can be exercised
/// end-to-end without a real attestation backend.
pub fn dummy_driver_factory(
    ctx: DriverContext,
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("dummy rat driver started");
        if ctx
            .outbound
            .send(DriverEvent::Message(b"dummy-attestation-proof".to_vec()))
            .is_err()
        {
            return;
        }

        match inbound.recv().await {
            Some(_peer_proof) => {
                let _ = ctx.outbound.send(DriverEvent::Ok);
            }
            None => {
                let _ = ctx.outbound.send(DriverEvent::Failed);
            }
        }
        debug!("dummy rat driver finished");
    })
}
