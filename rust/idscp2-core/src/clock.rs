use tokio::time::Instant;

/// A monotonic time source injected into the timer service. Swapping in a
/// test clock lets the FSM be driven deterministically without real sleeps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The production clock: just asks Tokio, which is itself
/// `tokio::time::pause`/`advance`-aware, so tests can use [`TokioClock`] too
/// as long as they run under a paused runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
