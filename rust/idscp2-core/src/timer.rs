use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{trace, warn};

use crate::clock::Clock;
use crate::fsm::event::{FsmEvent, TimerId};

/// One named, cancelable, restartable timer. Firing delivers a tagged
/// `FsmEvent::Timer` into the connection's event queue via a non-blocking
/// `try_send`: a full queue simply drops the fire rather than blocking the
/// timer task or displacing a wire event.
pub struct Timer {
    id: TimerId,
    cancel: Option<watch::Sender<()>>,
}

impl Timer {
    pub fn new(id: TimerId) -> Self {
        Self { id, cancel: None }
    }

    pub fn is_armed(&self) -> bool {
        self.cancel.is_some()
    }

    /// Cancels any existing timer under this name and arms a new one.
    pub fn restart(
        &mut self,
        duration: Duration,
        events: mpsc::Sender<FsmEvent>,
        clock: Arc<dyn Clock>,
    ) {
        self.cancel();
        let (cancel_tx, mut cancel_rx) = watch::channel(());
        let id = self.id;
        tokio::spawn(async move {
            let _ = clock.now();
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    trace!(?id, "timer fired");
                    if events.try_send(FsmEvent::Timer(id)).is_err() {
                        warn!(?id, "fsm event queue full or closed, dropping timer fire");
                    }
                }
                _ = cancel_rx.changed() => {
                    trace!(?id, "timer canceled before firing");
                }
            }
        });
        self.cancel = Some(cancel_tx);
    }

    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}
