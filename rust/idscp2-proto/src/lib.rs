//! Wire codec for the IDSCP2 post-TLS message stream: the `Message` enum, its
//! length-prefixed binary encoding, and an incremental reader that reassembles
//! frames out of an arbitrarily chunked byte stream.

mod buffer;
mod codec;
mod error;
mod message;

pub use buffer::FrameReader;
pub use codec::{decode_body, encode, DEFAULT_MAX_FRAME_BYTES};
pub use error::ProtoError;
pub use message::{CloseCode, Message};
