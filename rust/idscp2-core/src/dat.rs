use std::time::Duration;

use tokio::time::Instant;

use crate::error::Idscp2Error;

/// Tracks one side's DAT (Dynamic Attribute Token) and the deadline past
/// which it must be refreshed.
#[derive(Debug, Clone)]
pub struct DatStatus {
    pub token: Vec<u8>,
    pub valid_until: Instant,
}

impl DatStatus {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.valid_until
    }
}

/// Produces a local DAT and declares how long it is valid for. A real
/// implementation delegates to an external attribute-token authority; out
/// of scope here.
pub trait DatProvider: Send + Sync {
    fn issue(&self) -> (Vec<u8>, Duration);
}

/// Validates a peer-presented DAT against the peer's certificate hash,
/// returning the validity duration on success.
pub trait DatVerifier: Send + Sync {
    fn verify(&self, token: &[u8], peer_cert_hash: &[u8]) -> Result<Duration, Idscp2Error>;
}

/// Issues a fixed token with a configured validity; a reference fixture for
/// demos and tests, analogous to `TestDaps` in the `ids-worker-idscp2-rust`
/// reference's driver test suite.
#[derive(Debug, Clone)]
pub struct DummyDatProvider {
    pub token: Vec<u8>,
    pub validity: Duration,
}

impl DummyDatProvider {
    pub fn new(validity: Duration) -> Self {
        Self {
            token: b"dummy-dat-token".to_vec(),
            validity,
        }
    }
}

impl DatProvider for DummyDatProvider {
    fn issue(&self) -> (Vec<u8>, Duration) {
        (self.token.clone(), self.validity)
    }
}

/// Accepts any non-empty token with a fixed validity.
#[derive(Debug, Clone)]
pub struct DummyDatVerifier {
    pub validity: Duration,
}

impl DummyDatVerifier {
    pub fn new(validity: Duration) -> Self {
        Self { validity }
    }
}

impl DatVerifier for DummyDatVerifier {
    fn verify(&self, token: &[u8], _peer_cert_hash: &[u8]) -> Result<Duration, Idscp2Error> {
        if token.is_empty() {
            return Err(Idscp2Error::DatInvalid("empty DAT token".into()));
        }
        Ok(self.validity)
    }
}
