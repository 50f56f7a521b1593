use thiserror::Error;

/// Error kinds observable at the connection API.
#[derive(Error, Debug, Clone)]
pub enum Idscp2Error {
    #[error("send attempted outside STATE_ESTABLISHED")]
    NotEstablished,
    #[error("connection is closed")]
    Closed,
    #[error("no mutually supported RAT driver")]
    NoMatchingRat,
    #[error("remote attestation failed")]
    RatFailed,
    #[error("peer DAT was rejected: {0}")]
    DatInvalid(String),
    #[error("handshake did not complete before the configured timeout")]
    HandshakeTimeout,
    #[error("TLS error: {0}")]
    TlsError(String),
    #[error("malformed frame received: {0}")]
    MalformedFrame(String),
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("internal driver error: {0}")]
    InternalDriverError(String),
}

impl From<idscp2_proto::ProtoError> for Idscp2Error {
    fn from(e: idscp2_proto::ProtoError) -> Self {
        Idscp2Error::MalformedFrame(e.to_string())
    }
}

impl From<idscp2_tls::TlsError> for Idscp2Error {
    fn from(e: idscp2_tls::TlsError) -> Self {
        Idscp2Error::TlsError(e.to_string())
    }
}

impl From<idscp2_rat::RatError> for Idscp2Error {
    fn from(e: idscp2_rat::RatError) -> Self {
        Idscp2Error::InternalDriverError(e.to_string())
    }
}
