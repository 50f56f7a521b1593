use idscp2_proto::Message;
use idscp2_rat::DriverEvent;

/// The four named timers the FSM can arm. `Ack` is carried as a named slot
/// but has no wired transition yet — it is never armed; it exists only so a
/// future ack sub-protocol has a place to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    Handshake,
    Dat,
    Rat,
    Ack,
}

/// The full event alphabet the FSM dispatch function consumes — the
/// `ConnectionDrive` analogue. Constructed by the worker out of wire
/// messages, driver notifications, timer fires, and user/transport events,
/// then handed to the pure `dispatch` function one at a time.
#[derive(Debug)]
pub enum FsmEvent {
    /// Synthetic event that kicks a freshly constructed, `STATE_CLOSED` FSM
    /// into `STATE_WAIT_FOR_HELLO`.
    Start,
    Wire(Message),
    FromRatProver { generation: u64, event: DriverEvent },
    FromRatVerifier { generation: u64, event: DriverEvent },
    Timer(TimerId),
    UserSend(Vec<u8>),
    UserRepeatRat,
    UserClose,
    TransportEof,
    TransportError(String),
}
