use std::time::Duration;

use idscp2_tls::TlsConfig;

/// Every item of the IDSCP2 configuration surface, built directly by calling
/// code rather than parsed from a file — there is no config file format in
/// scope here, a plain struct filled in by the embedding application.
#[derive(Debug, Clone)]
pub struct Idscp2Config {
    pub handshake_timeout: Duration,
    pub rat_timeout: Duration,
    pub rat_refresh_interval: Duration,
    pub dat_validity: Duration,
    pub max_frame_bytes: u32,
    /// Ordered by local preference, most preferred first.
    pub supported_rat_provers: Vec<String>,
    /// Ordered by local preference, most preferred first.
    pub supported_rat_verifiers: Vec<String>,
    pub tls: TlsConfig,
    pub event_queue_capacity: usize,
}

impl Default for Idscp2Config {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(5_000),
            rat_timeout: Duration::from_millis(20_000),
            rat_refresh_interval: Duration::from_millis(600_000),
            dat_validity: Duration::from_secs(3600),
            max_frame_bytes: idscp2_proto::DEFAULT_MAX_FRAME_BYTES,
            supported_rat_provers: vec!["dummy".to_string()],
            supported_rat_verifiers: vec!["dummy".to_string()],
            tls: TlsConfig {
                identities: Vec::new(),
                forced_alias: None,
                peer_cert_verify: Default::default(),
                client_cert_verify: idscp2_tls::ClientCertVerify::Ignore,
                root_cert: None,
                alpn_protocols: Vec::new(),
            },
            event_queue_capacity: 64,
        }
    }
}

impl Idscp2Config {
    /// Picks the mutually preferred id out of two locally/peer-ordered
    /// preference lists; local order wins when both sides offer the same set.
    pub fn negotiate<'a>(local_order: &'a [String], peer: &[String]) -> Option<&'a str> {
        local_order
            .iter()
            .find(|candidate| peer.iter().any(|p| p == *candidate))
            .map(|s| s.as_str())
    }
}
