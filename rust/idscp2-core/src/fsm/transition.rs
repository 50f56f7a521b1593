use std::sync::Arc;
use std::time::Duration;

use idscp2_proto::{CloseCode, Message};
use idscp2_rat::DriverEvent;
use tokio::time::Instant;
use tracing::trace;

use super::action::Action;
use super::event::{FsmEvent, TimerId};
use super::state::ConnectionState;
use crate::clock::Clock;
use crate::config::Idscp2Config;
use crate::dat::{DatProvider, DatStatus, DatVerifier};
use crate::error::Idscp2Error;

/// The pure, connection-scoped half of the FSM: everything `dispatch` needs
/// to decide the next state and the actions for the worker to carry out,
/// with no channel, socket or task handle in sight.
pub struct FsmCore {
    pub state: ConnectionState,
    pub config: Arc<Idscp2Config>,
    pub clock: Arc<dyn Clock>,
    pub dat_provider: Arc<dyn DatProvider>,
    pub dat_verifier: Arc<dyn DatVerifier>,

    pub local_cert_hash: Vec<u8>,
    pub peer_cert_hash: Vec<u8>,

    pub local_dat: Option<DatStatus>,
    pub peer_dat_valid_until: Option<Instant>,

    pub chosen_prover_id: Option<String>,
    pub chosen_verifier_id: Option<String>,

    pub rat_prover_done: bool,
    pub rat_verifier_done: bool,

    pub prover_generation: u64,
    pub verifier_generation: u64,
}

impl FsmCore {
    pub fn new(
        config: Arc<Idscp2Config>,
        clock: Arc<dyn Clock>,
        dat_provider: Arc<dyn DatProvider>,
        dat_verifier: Arc<dyn DatVerifier>,
        local_cert_hash: Vec<u8>,
        peer_cert_hash: Vec<u8>,
    ) -> Self {
        Self {
            state: ConnectionState::Closed,
            config,
            clock,
            dat_provider,
            dat_verifier,
            local_cert_hash,
            peer_cert_hash,
            local_dat: None,
            peer_dat_valid_until: None,
            chosen_prover_id: None,
            chosen_verifier_id: None,
            rat_prover_done: false,
            rat_verifier_done: false,
            prover_generation: 0,
            verifier_generation: 0,
        }
    }

    /// Advances the FSM by exactly one event, returning the actions the
    /// worker must execute before the next event is dequeued. Transitions
    /// are atomic in the sense that this function runs to completion and
    /// returns a complete action list for one event — the worker is what
    /// makes that atomic with respect to other events, by not dequeuing the
    /// next one until it has executed all of these.
    pub fn dispatch(&mut self, event: FsmEvent) -> Vec<Action> {
        trace!(state = ?self.state, event = ?DebugEvent(&event), "fsm dispatch");

        // CLOSE / EOF / TLS error / user close win over in-flight state from
        // any state: a CLOSE frame received from the peer always wins over
        // in-flight state attempts.
        match &event {
            FsmEvent::Wire(Message::Close { reason, .. }) => {
                trace!(reason, "peer sent close frame");
                return self.shutdown(None, Some(Idscp2Error::PeerClosed));
            }
            FsmEvent::TransportEof => {
                return self.shutdown(None, Some(Idscp2Error::PeerClosed));
            }
            FsmEvent::TransportError(e) => {
                return self.shutdown(None, Some(Idscp2Error::TlsError(e.clone())));
            }
            FsmEvent::UserClose => {
                return self.shutdown(
                    Some(Message::Close {
                        code: CloseCode::UserRequested,
                        reason: "closed by local user".into(),
                    }),
                    None,
                );
            }
            _ => {}
        }

        if self.state == ConnectionState::Closed {
            // Frames (and everything else) arriving in STATE_CLOSED are
            // silently dropped, except the synthetic Start.
            return match event {
                FsmEvent::Start => self.enter_wait_for_hello(),
                _ => Vec::new(),
            };
        }

        match self.state {
            ConnectionState::Closed => unreachable!("handled above"),
            ConnectionState::WaitForHello => self.dispatch_wait_for_hello(event),
            ConnectionState::WaitForRat
            | ConnectionState::WaitForRatProver
            | ConnectionState::WaitForRatVerifier
            | ConnectionState::WaitForDatAndRat
            | ConnectionState::WaitForDatAndRatVerifier => self.dispatch_rat_phase(event),
            ConnectionState::Established => self.dispatch_established(event),
        }
    }

    fn enter_wait_for_hello(&mut self) -> Vec<Action> {
        self.state = ConnectionState::WaitForHello;
        let (dat_token, validity) = self.dat_provider.issue();
        self.local_dat = Some(DatStatus {
            token: dat_token.clone(),
            valid_until: self.clock.now() + validity,
        });
        vec![
            Action::SendFrame(Message::Hello {
                supported_provers: self.config.supported_rat_provers.clone(),
                supported_verifiers: self.config.supported_rat_verifiers.clone(),
                cert_hash: self.local_cert_hash.clone(),
                dat: dat_token,
            }),
            Action::StartTimer {
                id: TimerId::Handshake,
                duration: self.config.handshake_timeout,
            },
        ]
    }

    fn dispatch_wait_for_hello(&mut self, event: FsmEvent) -> Vec<Action> {
        match event {
            FsmEvent::Wire(Message::Hello {
                supported_provers,
                supported_verifiers,
                dat,
                ..
            }) => {
                let chosen_prover =
                    Idscp2Config::negotiate(&self.config.supported_rat_provers, &supported_verifiers)
                        .map(str::to_string);
                let chosen_verifier =
                    Idscp2Config::negotiate(&self.config.supported_rat_verifiers, &supported_provers)
                        .map(str::to_string);

                let (Some(chosen_prover), Some(chosen_verifier)) = (chosen_prover, chosen_verifier)
                else {
                    return self.shutdown(
                        Some(Message::Close {
                            code: CloseCode::NoMatchingRatDriver,
                            reason: "no mutually supported RAT driver".into(),
                        }),
                        Some(Idscp2Error::NoMatchingRat),
                    );
                };

                match self.dat_verifier.verify(&dat, &self.peer_cert_hash) {
                    Ok(validity) => {
                        self.peer_dat_valid_until = Some(self.clock.now() + validity);
                    }
                    Err(e) => {
                        return self.shutdown(
                            Some(Message::Close {
                                code: CloseCode::Error,
                                reason: format!("peer DAT rejected: {e}"),
                            }),
                            Some(e),
                        );
                    }
                }

                self.chosen_prover_id = Some(chosen_prover.clone());
                self.chosen_verifier_id = Some(chosen_verifier.clone());
                self.rat_prover_done = false;
                self.rat_verifier_done = false;
                self.state = ConnectionState::WaitForRat;

                let dat_duration = self.duration_until(self.peer_dat_valid_until.unwrap());
                vec![
                    Action::CancelTimer(TimerId::Handshake),
                    // Prover started before verifier: an arbitrary but fixed
                    // order, kept deterministic for testability.
                    Action::StartProverDriver {
                        driver_id: chosen_prover,
                    },
                    Action::StartVerifierDriver {
                        driver_id: chosen_verifier,
                    },
                    Action::StartTimer {
                        id: TimerId::Rat,
                        duration: self.config.rat_timeout,
                    },
                    Action::StartTimer {
                        id: TimerId::Dat,
                        duration: dat_duration,
                    },
                ]
            }
            FsmEvent::Timer(TimerId::Handshake) => self.shutdown(
                Some(Message::Close {
                    code: CloseCode::Timeout,
                    reason: "handshake timed out".into(),
                }),
                Some(Idscp2Error::HandshakeTimeout),
            ),
            _ => Vec::new(),
        }
    }

    fn dispatch_rat_phase(&mut self, event: FsmEvent) -> Vec<Action> {
        match event {
            FsmEvent::Wire(Message::RatProver { data }) => {
                if self.rat_verifier_done {
                    Vec::new()
                } else {
                    vec![Action::DeliverToVerifier(data)]
                }
            }
            FsmEvent::Wire(Message::RatVerifier { data }) => {
                if self.rat_prover_done {
                    Vec::new()
                } else {
                    vec![Action::DeliverToProver(data)]
                }
            }
            FsmEvent::Wire(Message::Dat { token }) => self.handle_dat_refresh_reply(token),
            FsmEvent::FromRatProver { generation, event } => {
                self.handle_prover_event(generation, event)
            }
            FsmEvent::FromRatVerifier { generation, event } => {
                self.handle_verifier_event(generation, event)
            }
            FsmEvent::Timer(TimerId::Rat) => self.shutdown(
                Some(Message::Close {
                    code: CloseCode::RatNegotiationFailed,
                    reason: "rat negotiation timed out".into(),
                }),
                Some(Idscp2Error::RatFailed),
            ),
            FsmEvent::UserSend(_) => vec![Action::EmitUserError(Idscp2Error::NotEstablished)],
            _ => Vec::new(),
        }
    }

    fn dispatch_established(&mut self, event: FsmEvent) -> Vec<Action> {
        match event {
            FsmEvent::Wire(Message::IdscpData { payload }) => vec![Action::EmitUserMessage(payload)],
            FsmEvent::UserSend(payload) => vec![Action::SendFrame(Message::IdscpData { payload })],
            FsmEvent::Wire(Message::ReRat) | FsmEvent::UserRepeatRat | FsmEvent::Timer(TimerId::Rat) => {
                self.restart_rat(ConnectionState::WaitForRat)
            }
            // The peer's dat timer fired tracking our DAT: reissue a fresh
            // one, hand it over, and restart only the prover (it is the side
            // that presents our DAT-backed identity to the peer's verifier).
            FsmEvent::Wire(Message::DatExpired) => self.handle_dat_expired_request(),
            // Our own dat timer fired tracking the peer's DAT: ask them to
            // refresh it. No driver restarts yet — that happens once their
            // `Message::Dat` reply arrives.
            FsmEvent::Timer(TimerId::Dat) => {
                self.state = ConnectionState::WaitForDatAndRat;
                vec![Action::SendFrame(Message::DatExpired)]
            }
            _ => Vec::new(),
        }
    }

    fn restart_rat(&mut self, next: ConnectionState) -> Vec<Action> {
        self.rat_prover_done = false;
        self.rat_verifier_done = false;
        self.state = next;
        let prover_id = self.chosen_prover_id.clone().expect("chosen after hello");
        let verifier_id = self.chosen_verifier_id.clone().expect("chosen after hello");
        vec![
            Action::StartProverDriver {
                driver_id: prover_id,
            },
            Action::StartVerifierDriver {
                driver_id: verifier_id,
            },
        ]
    }

    /// The peer is asking us to refresh the DAT it holds for us. Reissues a
    /// fresh local DAT, hands it over, and restarts only the prover, since
    /// the verifier side isn't involved in presenting our own identity.
    fn handle_dat_expired_request(&mut self) -> Vec<Action> {
        let (token, validity) = self.dat_provider.issue();
        self.local_dat = Some(DatStatus {
            token: token.clone(),
            valid_until: self.clock.now() + validity,
        });
        self.rat_prover_done = false;
        self.state = ConnectionState::WaitForDatAndRatVerifier;
        let prover_id = self.chosen_prover_id.clone().expect("chosen after hello");
        vec![
            Action::SendFrame(Message::Dat { token }),
            Action::StopProverDriver,
            Action::StartProverDriver {
                driver_id: prover_id,
            },
        ]
    }

    /// The peer replied to our earlier `DAT_EXPIRED` with its freshly
    /// reissued DAT. Re-verify it, restart the dat timer against the new
    /// validity, and restart only the verifier — it's the side that
    /// validates the peer's DAT-backed attestation.
    fn handle_dat_refresh_reply(&mut self, token: Vec<u8>) -> Vec<Action> {
        match self.dat_verifier.verify(&token, &self.peer_cert_hash) {
            Ok(validity) => {
                let valid_until = self.clock.now() + validity;
                self.peer_dat_valid_until = Some(valid_until);
                self.rat_verifier_done = false;
                self.state = ConnectionState::WaitForDatAndRatVerifier;
                let verifier_id = self.chosen_verifier_id.clone().expect("chosen after hello");
                vec![
                    Action::StartTimer {
                        id: TimerId::Dat,
                        duration: self.duration_until(valid_until),
                    },
                    Action::StopVerifierDriver,
                    Action::StartVerifierDriver {
                        driver_id: verifier_id,
                    },
                ]
            }
            Err(e) => self.shutdown(
                Some(Message::Close {
                    code: CloseCode::Error,
                    reason: format!("peer dat refresh rejected: {e}"),
                }),
                Some(e),
            ),
        }
    }

    fn handle_prover_event(&mut self, generation: u64, event: DriverEvent) -> Vec<Action> {
        if generation != self.prover_generation {
            trace!(generation, current = self.prover_generation, "stale prover event dropped");
            return Vec::new();
        }
        match event {
            DriverEvent::Message(bytes) => vec![Action::SendFrame(Message::RatProver { data: bytes })],
            DriverEvent::Ok => {
                self.rat_prover_done = true;
                let mut actions = vec![Action::StopProverDriver];
                if self.state == ConnectionState::WaitForDatAndRatVerifier {
                    // DAT-refresh round we initiated ourselves: the verifier
                    // was never touched, so the prover finishing is the
                    // whole story.
                    self.state = ConnectionState::Established;
                    self.rat_prover_done = false;
                } else if self.rat_verifier_done {
                    actions.extend(self.maybe_establish());
                } else {
                    self.state = ConnectionState::WaitForRatVerifier;
                }
                actions
            }
            DriverEvent::Failed => self.shutdown(
                Some(Message::Close {
                    code: CloseCode::RatNegotiationFailed,
                    reason: "prover attestation failed".into(),
                }),
                Some(Idscp2Error::RatFailed),
            ),
        }
    }

    fn handle_verifier_event(&mut self, generation: u64, event: DriverEvent) -> Vec<Action> {
        if generation != self.verifier_generation {
            trace!(generation, current = self.verifier_generation, "stale verifier event dropped");
            return Vec::new();
        }
        match event {
            DriverEvent::Message(bytes) => vec![Action::SendFrame(Message::RatVerifier { data: bytes })],
            DriverEvent::Ok => {
                self.rat_verifier_done = true;
                let mut actions = vec![Action::StopVerifierDriver];
                if self.state == ConnectionState::WaitForDatAndRatVerifier {
                    self.state = ConnectionState::Established;
                    self.rat_verifier_done = false;
                } else if self.rat_prover_done {
                    actions.extend(self.maybe_establish());
                } else {
                    self.state = ConnectionState::WaitForRatProver;
                }
                actions
            }
            DriverEvent::Failed => self.shutdown(
                Some(Message::Close {
                    code: CloseCode::RatNegotiationFailed,
                    reason: "verifier attestation failed".into(),
                }),
                Some(Idscp2Error::RatFailed),
            ),
        }
    }

    fn maybe_establish(&mut self) -> Vec<Action> {
        if !(self.rat_prover_done && self.rat_verifier_done) {
            return Vec::new();
        }
        self.state = ConnectionState::Established;
        self.rat_prover_done = false;
        self.rat_verifier_done = false;
        vec![Action::StartTimer {
            id: TimerId::Rat,
            duration: self.config.rat_refresh_interval,
        }]
    }

    fn duration_until(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.clock.now())
    }

    /// Unified shutdown reachable from any state: cancel every timer, stop
    /// both drivers, emit a CLOSE frame if the channel is still writable,
    /// tell the caller why (unless this is a plain user-requested close),
    /// close the channel, transition to `STATE_CLOSED`, and invoke
    /// `onClose` exactly once.
    fn shutdown(&mut self, close_frame: Option<Message>, error: Option<Idscp2Error>) -> Vec<Action> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        if let Some(ref e) = error {
            trace!(reason = %e, "fsm shutting down");
        }
        self.state = ConnectionState::Closed;
        self.rat_prover_done = false;
        self.rat_verifier_done = false;

        let mut actions = vec![Action::CancelAllTimers, Action::StopProverDriver, Action::StopVerifierDriver];
        if let Some(frame) = close_frame {
            actions.push(Action::SendFrame(frame));
        }
        actions.push(Action::CloseChannel);
        if let Some(e) = error {
            actions.push(Action::EmitUserError(e));
        }
        actions.push(Action::EmitUserClose);
        actions
    }
}

struct DebugEvent<'a>(&'a FsmEvent);

impl std::fmt::Debug for DebugEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            FsmEvent::Wire(m) => write!(f, "Wire({})", m.kind_str()),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::{DummyDatProvider, DummyDatVerifier};
    use pretty_assertions::assert_eq;

    fn core() -> FsmCore {
        FsmCore::new(
            Arc::new(Idscp2Config::default()),
            Arc::new(crate::clock::TokioClock),
            Arc::new(DummyDatProvider::new(Duration::from_secs(60))),
            Arc::new(DummyDatVerifier::new(Duration::from_secs(60))),
            vec![0xaa],
            vec![0xbb],
        )
    }

    #[test]
    fn negotiate_prefers_local_order() {
        let local = vec!["tpm2.0".to_string(), "dummy".to_string()];
        let peer = vec!["dummy".to_string(), "tpm2.0".to_string()];
        assert_eq!(Idscp2Config::negotiate(&local, &peer), Some("tpm2.0"));
    }

    #[test]
    fn negotiate_empty_intersection() {
        let local = vec!["tpm2.0".to_string()];
        let peer = vec!["sgx".to_string()];
        assert_eq!(Idscp2Config::negotiate(&local, &peer), None);
    }

    #[tokio::test]
    async fn start_enters_wait_for_hello() {
        let mut c = core();
        let actions = c.dispatch(FsmEvent::Start);
        assert_eq!(c.state, ConnectionState::WaitForHello);
        assert!(matches!(actions[0], Action::SendFrame(Message::Hello { .. })));
        assert!(matches!(
            actions[1],
            Action::StartTimer {
                id: TimerId::Handshake,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn hello_with_matching_driver_enters_wait_for_rat() {
        let mut c = core();
        c.dispatch(FsmEvent::Start);
        let actions = c.dispatch(FsmEvent::Wire(Message::Hello {
            supported_provers: vec!["dummy".into()],
            supported_verifiers: vec!["dummy".into()],
            cert_hash: vec![0xbb],
            dat: b"peer-dat".to_vec(),
        }));
        assert_eq!(c.state, ConnectionState::WaitForRat);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartProverDriver { driver_id } if driver_id == "dummy")));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartVerifierDriver { driver_id } if driver_id == "dummy")));
    }

    #[tokio::test]
    async fn hello_with_no_matching_driver_closes() {
        let mut c = core();
        c.config = Arc::new(Idscp2Config {
            supported_rat_provers: vec!["dummy".into()],
            supported_rat_verifiers: vec!["dummy".into()],
            ..Idscp2Config::default()
        });
        c.dispatch(FsmEvent::Start);
        let actions = c.dispatch(FsmEvent::Wire(Message::Hello {
            supported_provers: vec!["other".into()],
            supported_verifiers: vec!["other".into()],
            cert_hash: vec![0xbb],
            dat: b"peer-dat".to_vec(),
        }));
        assert_eq!(c.state, ConnectionState::Closed);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SendFrame(Message::Close {
                code: CloseCode::NoMatchingRatDriver,
                ..
            })
        )));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EmitUserError(Idscp2Error::NoMatchingRat)
        )));
        assert!(actions.iter().any(|a| matches!(a, Action::EmitUserClose)));
    }

    #[tokio::test]
    async fn established_delivers_idscp_data_to_user() {
        let mut c = core();
        c.state = ConnectionState::Established;
        let actions = c.dispatch(FsmEvent::Wire(Message::IdscpData {
            payload: b"hello".to_vec(),
        }));
        assert!(matches!(&actions[0], Action::EmitUserMessage(p) if p == b"hello"));
    }

    #[tokio::test]
    async fn user_send_outside_established_is_rejected() {
        let mut c = core();
        c.state = ConnectionState::WaitForRat;
        let actions = c.dispatch(FsmEvent::UserSend(b"too early".to_vec()));
        assert!(matches!(
            actions[0],
            Action::EmitUserError(Idscp2Error::NotEstablished)
        ));
    }

    #[tokio::test]
    async fn transport_eof_runs_unified_shutdown() {
        let mut c = core();
        c.state = ConnectionState::WaitForRat;
        let actions = c.dispatch(FsmEvent::TransportEof);
        assert_eq!(c.state, ConnectionState::Closed);
        assert!(actions.iter().any(|a| matches!(a, Action::CancelAllTimers)));
        assert!(actions.iter().any(|a| matches!(a, Action::StopProverDriver)));
        assert!(actions.iter().any(|a| matches!(a, Action::StopVerifierDriver)));
        assert!(actions.iter().any(|a| matches!(a, Action::CloseChannel)));
        assert!(actions.iter().any(|a| matches!(a, Action::EmitUserClose)));
        assert!(!actions.iter().any(|a| matches!(a, Action::SendFrame(_))));
    }

    #[tokio::test]
    async fn both_rat_sides_done_establishes_connection() {
        let mut c = core();
        c.state = ConnectionState::WaitForRat;
        c.chosen_prover_id = Some("dummy".into());
        c.chosen_verifier_id = Some("dummy".into());
        c.prover_generation = 1;
        c.verifier_generation = 1;

        c.dispatch(FsmEvent::FromRatProver {
            generation: 1,
            event: DriverEvent::Ok,
        });
        assert_eq!(c.state, ConnectionState::WaitForRatVerifier);
        let actions = c.dispatch(FsmEvent::FromRatVerifier {
            generation: 1,
            event: DriverEvent::Ok,
        });
        assert_eq!(c.state, ConnectionState::Established);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartTimer { id: TimerId::Rat, .. })));
    }

    #[tokio::test]
    async fn verifier_done_first_enters_wait_for_rat_prover() {
        let mut c = core();
        c.state = ConnectionState::WaitForRat;
        c.chosen_prover_id = Some("dummy".into());
        c.chosen_verifier_id = Some("dummy".into());
        c.prover_generation = 1;
        c.verifier_generation = 1;

        c.dispatch(FsmEvent::FromRatVerifier {
            generation: 1,
            event: DriverEvent::Ok,
        });
        assert_eq!(c.state, ConnectionState::WaitForRatProver);
    }

    #[tokio::test]
    async fn dat_expired_reply_restarts_only_verifier() {
        let mut c = core();
        c.state = ConnectionState::Established;
        c.chosen_prover_id = Some("dummy".into());
        c.chosen_verifier_id = Some("dummy".into());

        let actions = c.dispatch(FsmEvent::Timer(TimerId::Dat));
        assert_eq!(c.state, ConnectionState::WaitForDatAndRat);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SendFrame(Message::DatExpired))));

        let actions = c.dispatch(FsmEvent::Wire(Message::Dat {
            token: b"fresh-peer-dat".to_vec(),
        }));
        assert_eq!(c.state, ConnectionState::WaitForDatAndRatVerifier);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartTimer { id: TimerId::Dat, .. })));
        assert!(actions.iter().any(|a| matches!(a, Action::StopVerifierDriver)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartVerifierDriver { driver_id } if driver_id == "dummy")));
        assert!(!actions.iter().any(|a| matches!(a, Action::StartProverDriver { .. })));

        c.verifier_generation = 1;
        let actions = c.dispatch(FsmEvent::FromRatVerifier {
            generation: 1,
            event: DriverEvent::Ok,
        });
        assert_eq!(c.state, ConnectionState::Established);
        assert!(actions.iter().any(|a| matches!(a, Action::StopVerifierDriver)));
    }

    #[tokio::test]
    async fn dat_expired_request_restarts_only_prover() {
        let mut c = core();
        c.state = ConnectionState::Established;
        c.chosen_prover_id = Some("dummy".into());
        c.chosen_verifier_id = Some("dummy".into());

        let actions = c.dispatch(FsmEvent::Wire(Message::DatExpired));
        assert_eq!(c.state, ConnectionState::WaitForDatAndRatVerifier);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SendFrame(Message::Dat { .. }))));
        assert!(actions.iter().any(|a| matches!(a, Action::StopProverDriver)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartProverDriver { driver_id } if driver_id == "dummy")));
        assert!(!actions.iter().any(|a| matches!(a, Action::StartVerifierDriver { .. })));
        assert!(c.local_dat.is_some());

        c.prover_generation = 1;
        let actions = c.dispatch(FsmEvent::FromRatProver {
            generation: 1,
            event: DriverEvent::Ok,
        });
        assert_eq!(c.state, ConnectionState::Established);
        assert!(actions.iter().any(|a| matches!(a, Action::StopProverDriver)));
    }

    #[tokio::test]
    async fn prover_failure_emits_user_error_before_close() {
        let mut c = core();
        c.state = ConnectionState::WaitForRat;
        c.chosen_prover_id = Some("dummy".into());
        c.chosen_verifier_id = Some("dummy".into());

        let actions = c.dispatch(FsmEvent::FromRatProver {
            generation: 0,
            event: DriverEvent::Failed,
        });
        assert_eq!(c.state, ConnectionState::Closed);
        let err_pos = actions
            .iter()
            .position(|a| matches!(a, Action::EmitUserError(Idscp2Error::RatFailed)))
            .expect("onError not emitted");
        let close_pos = actions
            .iter()
            .position(|a| matches!(a, Action::EmitUserClose))
            .expect("onClose not emitted");
        assert!(err_pos < close_pos);
    }

    #[tokio::test]
    async fn user_close_does_not_emit_user_error() {
        let mut c = core();
        c.state = ConnectionState::Established;
        let actions = c.dispatch(FsmEvent::UserClose);
        assert!(!actions.iter().any(|a| matches!(a, Action::EmitUserError(_))));
        assert!(actions.iter().any(|a| matches!(a, Action::EmitUserClose)));
    }

    #[tokio::test]
    async fn stale_driver_generation_is_ignored() {
        let mut c = core();
        c.state = ConnectionState::WaitForRat;
        c.prover_generation = 2;
        let actions = c.dispatch(FsmEvent::FromRatProver {
            generation: 1,
            event: DriverEvent::Ok,
        });
        assert!(actions.is_empty());
        assert!(!c.rat_prover_done);
    }
}
