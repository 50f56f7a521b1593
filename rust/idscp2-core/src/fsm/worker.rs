use std::sync::Arc;

use idscp2_proto::{FrameReader, Message};
use idscp2_rat::{DriverContext, DriverEvent, DriverRegistry, Prover, Verifier};
use idscp2_tls::SecureChannel;
use tokio::io::{split, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace, warn};

use super::action::Action;
use super::event::{FsmEvent, TimerId};
use super::state::ConnectionState;
use super::transition::FsmCore;
use crate::clock::Clock;
use crate::error::Idscp2Error;
use crate::timer::Timer;

/// User-supplied, single-registration callbacks (not a pub/sub bus — one
/// registration of each kind at construction time).
pub struct ConnectionCallbacks {
    pub on_message: Box<dyn FnMut(Vec<u8>) + Send>,
    pub on_error: Box<dyn FnMut(Idscp2Error) + Send>,
    pub on_close: Box<dyn FnMut() + Send>,
}

/// The two process-wide driver registries a connection draws its prover and
/// verifier implementations from.
#[derive(Clone)]
pub struct DriverSet {
    pub prover: Arc<DriverRegistry<Prover>>,
    pub verifier: Arc<DriverRegistry<Verifier>>,
}

struct Timers {
    handshake: Timer,
    dat: Timer,
    rat: Timer,
    #[allow(dead_code)]
    ack: Timer,
}

impl Timers {
    fn new() -> Self {
        Self {
            handshake: Timer::new(TimerId::Handshake),
            dat: Timer::new(TimerId::Dat),
            rat: Timer::new(TimerId::Rat),
            ack: Timer::new(TimerId::Ack),
        }
    }

    fn get_mut(&mut self, id: TimerId) -> &mut Timer {
        match id {
            TimerId::Handshake => &mut self.handshake,
            TimerId::Dat => &mut self.dat,
            TimerId::Rat => &mut self.rat,
            TimerId::Ack => &mut self.ack,
        }
    }

    fn cancel_all(&mut self) {
        self.handshake.cancel();
        self.dat.cancel();
        self.rat.cancel();
        self.ack.cancel();
    }
}

const FRAME_READ_CHUNK: usize = 16 * 1024;

/// Runs one connection's FSM worker to completion: spawns the transport
/// reader task, then drains the event queue one event at a time, executing
/// every action `FsmCore::dispatch` returns before dequeuing the next event.
/// The handle owns a background task rather than the other way around,
/// since IDSCP2 requires genuinely concurrent reader/driver/timer tasks.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    mut core: FsmCore,
    channel: SecureChannel,
    drivers: DriverSet,
    clock: Arc<dyn Clock>,
    mut callbacks: ConnectionCallbacks,
    events_tx: mpsc::Sender<FsmEvent>,
    mut events_rx: mpsc::Receiver<FsmEvent>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let max_frame_bytes = core.config.max_frame_bytes;
    let (mut read_half, mut write_half) = split(channel);

    let reader_tx = events_tx.clone();
    tokio::spawn(async move {
        let mut frame_reader = FrameReader::new(max_frame_bytes);
        let mut buf = vec![0u8; FRAME_READ_CHUNK];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    let _ = reader_tx.send(FsmEvent::TransportEof).await;
                    break;
                }
                Ok(n) => match frame_reader.push(&buf[..n]) {
                    Ok(messages) => {
                        for msg in messages {
                            if reader_tx.send(FsmEvent::Wire(msg)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = reader_tx
                            .send(FsmEvent::TransportError(e.to_string()))
                            .await;
                        break;
                    }
                },
                Err(e) => {
                    let _ = reader_tx
                        .send(FsmEvent::TransportError(e.to_string()))
                        .await;
                    break;
                }
            }
        }
    });

    let mut timers = Timers::new();
    let mut prover_handle = None;
    let mut verifier_handle = None;

    while let Some(event) = events_rx.recv().await {
        let actions = core.dispatch(event);
        let _ = state_tx.send(core.state);

        for action in actions {
            execute_action(
                action,
                &mut core,
                &drivers,
                &clock,
                &mut timers,
                &mut prover_handle,
                &mut verifier_handle,
                &mut write_half,
                &mut callbacks,
                &events_tx,
            )
            .await;
        }

        if core.state == ConnectionState::Closed {
            break;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn execute_action<W: AsyncWriteExt + Unpin>(
    action: Action,
    core: &mut FsmCore,
    drivers: &DriverSet,
    clock: &Arc<dyn Clock>,
    timers: &mut Timers,
    prover_handle: &mut Option<idscp2_rat::DriverHandle>,
    verifier_handle: &mut Option<idscp2_rat::DriverHandle>,
    write_half: &mut W,
    callbacks: &mut ConnectionCallbacks,
    events_tx: &mpsc::Sender<FsmEvent>,
) {
    match action {
        Action::SendFrame(msg) => {
            let frame = idscp2_proto::encode(&msg);
            if let Err(e) = write_half.write_all(&frame).await {
                warn!(error = %e, "failed to write frame, treating as transport error");
                let _ = events_tx
                    .send(FsmEvent::TransportError(e.to_string()))
                    .await;
            }
        }
        Action::StartTimer { id, duration } => {
            timers
                .get_mut(id)
                .restart(duration, events_tx.clone(), clock.clone());
        }
        Action::CancelTimer(id) => timers.get_mut(id).cancel(),
        Action::CancelAllTimers => timers.cancel_all(),
        Action::StartProverDriver { driver_id } => {
            core.prover_generation += 1;
            let generation = core.prover_generation;
            let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel();
            let ctx = DriverContext {
                local_cert_hash: core.local_cert_hash.clone(),
                peer_cert_hash: core.peer_cert_hash.clone(),
                outbound: outbound_tx,
            };
            match drivers.prover.start(&driver_id, ctx) {
                Ok(handle) => {
                    debug!(driver_id, generation, "prover driver started");
                    *prover_handle = Some(handle);
                    let forward_tx = events_tx.clone();
                    tokio::spawn(async move {
                        while let Some(event) = outbound_rx.recv().await {
                            if forward_tx
                                .send(FsmEvent::FromRatProver { generation, event })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(driver_id, error = %e, "failed to start prover driver");
                    let _ = events_tx
                        .send(FsmEvent::FromRatProver {
                            generation,
                            event: DriverEvent::Failed,
                        })
                        .await;
                }
            }
        }
        Action::StartVerifierDriver { driver_id } => {
            core.verifier_generation += 1;
            let generation = core.verifier_generation;
            let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel();
            let ctx = DriverContext {
                local_cert_hash: core.local_cert_hash.clone(),
                peer_cert_hash: core.peer_cert_hash.clone(),
                outbound: outbound_tx,
            };
            match drivers.verifier.start(&driver_id, ctx) {
                Ok(handle) => {
                    debug!(driver_id, generation, "verifier driver started");
                    *verifier_handle = Some(handle);
                    let forward_tx = events_tx.clone();
                    tokio::spawn(async move {
                        while let Some(event) = outbound_rx.recv().await {
                            if forward_tx
                                .send(FsmEvent::FromRatVerifier { generation, event })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(driver_id, error = %e, "failed to start verifier driver");
                    let _ = events_tx
                        .send(FsmEvent::FromRatVerifier {
                            generation,
                            event: DriverEvent::Failed,
                        })
                        .await;
                }
            }
        }
        Action::StopProverDriver => {
            if let Some(handle) = prover_handle.take() {
                handle.stop().await;
            }
        }
        Action::StopVerifierDriver => {
            if let Some(handle) = verifier_handle.take() {
                handle.stop().await;
            }
        }
        Action::DeliverToProver(bytes) => {
            if let Some(handle) = prover_handle.as_ref() {
                if handle.deliver(bytes).is_err() {
                    debug!("prover driver channel closed, dropping delegated message");
                }
            } else {
                debug!("no active prover driver, dropping delegated message");
            }
        }
        Action::DeliverToVerifier(bytes) => {
            if let Some(handle) = verifier_handle.as_ref() {
                if handle.deliver(bytes).is_err() {
                    debug!("verifier driver channel closed, dropping delegated message");
                }
            } else {
                debug!("no active verifier driver, dropping delegated message");
            }
        }
        Action::EmitUserMessage(bytes) => {
            invoke_guarded(|| (callbacks.on_message)(bytes), "onMessage");
        }
        Action::EmitUserError(e) => {
            invoke_guarded(|| (callbacks.on_error)(e), "onError");
        }
        Action::CloseChannel => {
            let _ = write_half.shutdown().await;
        }
        Action::EmitUserClose => {
            invoke_guarded(|| (callbacks.on_close)(), "onClose");
        }
    }
}

/// Catches and logs a panicking user callback rather than letting it
/// unwind through the FSM worker: a panicking `on_message`/`on_error`/
/// `on_close` is logged and otherwise ignored, it never affects FSM state.
fn invoke_guarded<F: FnOnce()>(f: F, name: &str) {
    trace!(callback = name, "invoking user callback");
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(callback = name, panic = msg, "user callback panicked");
    }
}
