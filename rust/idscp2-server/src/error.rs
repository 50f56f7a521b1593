use thiserror::Error;

/// Failures that can occur while binding the listener itself. Per-connection
/// setup failures (a peer's TLS handshake failing, say) are logged and
/// skipped rather than surfaced here — see `Idscp2Server::serve`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
}
