use thiserror::Error;

#[derive(Error, Debug)]
pub enum RatError {
    #[error("no driver registered under id {0:?}")]
    UnknownDriver(String),
    #[error("a driver is already registered under id {0:?}")]
    AlreadyRegistered(String),
    #[error("driver task's inbound channel is closed")]
    ChannelClosed,
    #[error("driver task did not stop within the grace period")]
    StopTimedOut,
}
