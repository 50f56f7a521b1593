use std::time::Duration;

use idscp2_proto::Message;

use super::event::TimerId;
use crate::error::Idscp2Error;

/// A structured command emitted by the pure `dispatch` function and carried
/// out by the worker — the `ConnectionEvent` analogue. Keeping the
/// transition table free of I/O is what makes it unit-testable without a
/// live channel or driver.
#[derive(Debug)]
pub enum Action {
    SendFrame(Message),
    StartTimer { id: TimerId, duration: Duration },
    CancelTimer(TimerId),
    CancelAllTimers,
    StartProverDriver { driver_id: String },
    StartVerifierDriver { driver_id: String },
    StopProverDriver,
    StopVerifierDriver,
    DeliverToProver(Vec<u8>),
    DeliverToVerifier(Vec<u8>),
    EmitUserMessage(Vec<u8>),
    EmitUserError(Idscp2Error),
    CloseChannel,
    /// The worker must invoke the user's `onClose` callback exactly once,
    /// after every other teardown action for this transition has run.
    EmitUserClose,
}
