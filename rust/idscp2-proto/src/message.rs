/// The reason a `CLOSE` message was sent, carried alongside the human-readable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    NoMatchingRatDriver,
    Timeout,
    RatNegotiationFailed,
    UserRequested,
    Error,
}

impl CloseCode {
    pub(crate) fn to_wire(self) -> u16 {
        match self {
            CloseCode::NoMatchingRatDriver => 1,
            CloseCode::Timeout => 2,
            CloseCode::RatNegotiationFailed => 3,
            CloseCode::UserRequested => 4,
            CloseCode::Error => 5,
        }
    }

    pub(crate) fn from_wire(v: u16) -> Option<Self> {
        Some(match v {
            1 => CloseCode::NoMatchingRatDriver,
            2 => CloseCode::Timeout,
            3 => CloseCode::RatNegotiationFailed,
            4 => CloseCode::UserRequested,
            5 => CloseCode::Error,
            _ => return None,
        })
    }
}

/// A single IDSCP2 protocol message, as exchanged once the TLS channel is established.
///
/// Every variant round-trips through [`crate::codec::encode`] / [`crate::codec::decode_body`]
/// as exactly one frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello {
        supported_provers: Vec<String>,
        supported_verifiers: Vec<String>,
        cert_hash: Vec<u8>,
        dat: Vec<u8>,
    },
    Dat {
        token: Vec<u8>,
    },
    DatExpired,
    RatProver {
        data: Vec<u8>,
    },
    RatVerifier {
        data: Vec<u8>,
    },
    ReRat,
    IdscpData {
        payload: Vec<u8>,
    },
    Close {
        code: CloseCode,
        reason: String,
    },
}

impl Message {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Message::Hello { .. } => 0x01,
            Message::Dat { .. } => 0x02,
            Message::DatExpired => 0x03,
            Message::RatProver { .. } => 0x04,
            Message::RatVerifier { .. } => 0x05,
            Message::ReRat => 0x06,
            Message::IdscpData { .. } => 0x07,
            Message::Close { .. } => 0x08,
        }
    }

    /// A short, stable name for logging; never includes payload contents.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "HELLO",
            Message::Dat { .. } => "DAT",
            Message::DatExpired => "DAT_EXPIRED",
            Message::RatProver { .. } => "RAT_PROVER",
            Message::RatVerifier { .. } => "RAT_VERIFIER",
            Message::ReRat => "RE_RAT",
            Message::IdscpData { .. } => "IDSCP_DATA",
            Message::Close { .. } => "CLOSE",
        }
    }
}
