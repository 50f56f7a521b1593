use std::collections::VecDeque;

use crate::codec::decode_body;
use crate::error::ProtoError;
use crate::message::Message;

const LENGTH_PREFIX_BYTES: usize = 4;

/// Incrementally reassembles length-prefixed frames out of a byte stream that may
/// arrive split at arbitrary boundaries (one `read()` may contain zero, one, or many
/// frames, and a frame may itself span several reads).
///
/// Mirrors the fast-path/slow-path split used for Postgres message buffering: when
/// the internal backlog is empty, frames are decoded directly out of the freshly
/// read slice without being copied anywhere; only the unconsumed tail (a frame that
/// arrived partially) is copied into the backlog.
pub struct FrameReader {
    backlog: VecDeque<u8>,
    max_frame_bytes: u32,
}

impl FrameReader {
    pub fn new(max_frame_bytes: u32) -> Self {
        Self {
            backlog: VecDeque::new(),
            max_frame_bytes,
        }
    }

    /// Feeds newly read bytes in and returns every message that is now fully
    /// framed, in arrival order. Bytes belonging to a not-yet-complete frame are
    /// retained internally for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Message>, ProtoError> {
        let mut out = Vec::new();

        if self.backlog.is_empty() {
            // Fast path: decode directly out of `bytes`, no copying, until a
            // frame is incomplete or the slice is exhausted.
            let mut offset = 0;
            while offset < bytes.len() {
                match self.try_decode_slice(&bytes[offset..])? {
                    Some((msg, consumed)) => {
                        out.push(msg);
                        offset += consumed;
                    }
                    None => {
                        self.backlog.extend(&bytes[offset..]);
                        return Ok(out);
                    }
                }
            }
            return Ok(out);
        }

        // Slow path: there's already a partial frame sitting in the backlog.
        self.backlog.extend(bytes);
        loop {
            match self.try_decode_backlog()? {
                Some(msg) => out.push(msg),
                None => break,
            }
        }
        Ok(out)
    }

    fn try_decode_slice(&self, slice: &[u8]) -> Result<Option<(Message, usize)>, ProtoError> {
        if slice.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }
        let len = u32::from_be_bytes(slice[..LENGTH_PREFIX_BYTES].try_into().unwrap());
        if len > self.max_frame_bytes {
            return Err(ProtoError::FrameTooLarge {
                max: self.max_frame_bytes,
            });
        }
        let total = LENGTH_PREFIX_BYTES + len as usize;
        if slice.len() < total {
            return Ok(None);
        }
        let body = &slice[LENGTH_PREFIX_BYTES..total];
        let msg = decode_body(body)?;
        Ok(Some((msg, total)))
    }

    fn try_decode_backlog(&mut self) -> Result<Option<Message>, ProtoError> {
        if self.backlog.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }
        let len_bytes: Vec<u8> = self.backlog.iter().take(LENGTH_PREFIX_BYTES).copied().collect();
        let len = u32::from_be_bytes(len_bytes.try_into().unwrap());
        if len > self.max_frame_bytes {
            return Err(ProtoError::FrameTooLarge {
                max: self.max_frame_bytes,
            });
        }
        let total = LENGTH_PREFIX_BYTES + len as usize;
        if self.backlog.len() < total {
            return Ok(None);
        }
        let body: Vec<u8> = self
            .backlog
            .iter()
            .skip(LENGTH_PREFIX_BYTES)
            .take(len as usize)
            .copied()
            .collect();
        let msg = decode_body(&body)?;
        self.backlog.drain(..total);
        Ok(Some(msg))
    }
}
