use crate::error::ProtoError;
use crate::message::{CloseCode, Message};

/// Default ceiling on a single frame body, matching the `max_frame_bytes` config knob.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 4 * 1024 * 1024;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(tag: u8) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.push(tag);
        Self { buf }
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(bytes);
    }

    fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    fn put_str_vec(&mut self, items: &[String]) {
        self.buf.extend_from_slice(&(items.len() as u16).to_be_bytes());
        for item in items {
            self.put_str(item);
        }
    }

    fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self { body, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        let end = self.pos.checked_add(n).ok_or(ProtoError::Truncated)?;
        let slice = self.body.get(self.pos..end).ok_or(ProtoError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, ProtoError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, ProtoError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn bytes(&mut self) -> Result<Vec<u8>, ProtoError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> Result<String, ProtoError> {
        String::from_utf8(self.bytes()?).map_err(|_| ProtoError::InvalidUtf8)
    }

    fn str_vec(&mut self) -> Result<Vec<String>, ProtoError> {
        let count = self.u16()?;
        (0..count).map(|_| self.string()).collect()
    }

    fn expect_empty(&self) -> Result<(), ProtoError> {
        if self.pos == self.body.len() {
            Ok(())
        } else {
            Err(ProtoError::MalformedFrame {
                reason: "trailing bytes after message body",
            })
        }
    }
}

/// Encodes a message into a complete frame: a 4-byte big-endian length prefix
/// followed by the tagged body. The length covers the body only.
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut w = Writer::new(msg.tag());
    match msg {
        Message::Hello {
            supported_provers,
            supported_verifiers,
            cert_hash,
            dat,
        } => {
            w.put_str_vec(supported_provers);
            w.put_str_vec(supported_verifiers);
            w.put_bytes(cert_hash);
            w.put_bytes(dat);
        }
        Message::Dat { token } => w.put_bytes(token),
        Message::DatExpired => {}
        Message::RatProver { data } => w.put_bytes(data),
        Message::RatVerifier { data } => w.put_bytes(data),
        Message::ReRat => {}
        Message::IdscpData { payload } => w.put_bytes(payload),
        Message::Close { code, reason } => {
            w.put_u16(code.to_wire());
            w.put_str(reason);
        }
    }
    let body = w.finish();
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Decodes a single frame body (the bytes after the 4-byte length prefix have
/// already been stripped off by the caller, typically [`crate::buffer::FrameReader`]).
pub fn decode_body(body: &[u8]) -> Result<Message, ProtoError> {
    if body.is_empty() {
        return Err(ProtoError::Truncated);
    }
    let tag = body[0];
    let mut r = Reader::new(&body[1..]);
    let msg = match tag {
        0x01 => {
            let supported_provers = r.str_vec()?;
            let supported_verifiers = r.str_vec()?;
            let cert_hash = r.bytes()?;
            let dat = r.bytes()?;
            Message::Hello {
                supported_provers,
                supported_verifiers,
                cert_hash,
                dat,
            }
        }
        0x02 => Message::Dat { token: r.bytes()? },
        0x03 => Message::DatExpired,
        0x04 => Message::RatProver { data: r.bytes()? },
        0x05 => Message::RatVerifier { data: r.bytes()? },
        0x06 => Message::ReRat,
        0x07 => Message::IdscpData {
            payload: r.bytes()?,
        },
        0x08 => {
            let raw_code = r.u16()?;
            let code = CloseCode::from_wire(raw_code).ok_or(ProtoError::MalformedFrame {
                reason: "unknown close code",
            })?;
            let reason = r.string()?;
            Message::Close { code, reason }
        }
        other => return Err(ProtoError::UnknownTag { tag: other }),
    };
    r.expect_empty()?;
    Ok(msg)
}
