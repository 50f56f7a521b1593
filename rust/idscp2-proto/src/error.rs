use thiserror::Error;

/// Errors produced while decoding a single, already length-delimited frame body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("frame too short to contain a valid message")]
    Truncated,
    #[error("frame exceeds the configured maximum of {max} bytes")]
    FrameTooLarge { max: u32 },
    #[error("unknown message tag {tag:#04x}")]
    UnknownTag { tag: u8 },
    #[error("malformed field in message body: {reason}")]
    MalformedFrame { reason: &'static str },
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
}
