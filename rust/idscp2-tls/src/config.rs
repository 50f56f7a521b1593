use derive_more::Debug;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

/// How a client verifies the server's certificate chain. `VerifyFull` is the
/// ordinary WebPKI path-and-hostname check; `IgnoreHostname` validates the
/// chain against the configured roots but skips the hostname/SAN comparison
/// (the permissive "accept any issuer in the cached-alias match" mode);
/// `Insecure` skips verification entirely and exists for test fixtures only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerCertVerify {
    Insecure,
    IgnoreHostname,
    #[default]
    VerifyFull,
}

/// How a server verifies the client's certificate during mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCertVerify {
    /// Do not request a client certificate at all.
    Ignore,
    /// Request a client certificate, but tolerate a handshake without one.
    Optional { roots: Vec<CertificateDer<'static>> },
    /// Require a client certificate and validate it against the given roots.
    Require { roots: Vec<CertificateDer<'static>> },
}

/// A named local identity (certificate chain + private key), keyed by an
/// alias so a single process can hold several identities and pick one
/// regardless of what TLS's own certificate-selection logic would otherwise
/// choose.
#[derive(Debug, Clone)]
pub struct TlsIdentity {
    pub alias: String,
    pub cert_chain: Vec<CertificateDer<'static>>,
    #[debug(skip)]
    pub key: TlsPrivateKey,
}

/// Wraps a private key so it never shows up in a `{:?}` dump.
#[derive(Clone)]
pub struct TlsPrivateKey(pub PrivateKeyDer<'static>);

impl std::fmt::Debug for TlsPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TlsPrivateKey(..)")
    }
}

/// Full TLS configuration for one IDSCP2 endpoint, shared by both the client
/// and server roles since IDSCP2 connections are mutually authenticated.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Identities available for presentation; `forced_alias` (when set) pins
    /// which one is always returned, realizing the "key-manager hook" that
    /// forces a single alias regardless of the peer's hints.
    pub identities: Vec<TlsIdentity>,
    pub forced_alias: Option<String>,
    pub peer_cert_verify: PeerCertVerify,
    pub client_cert_verify: ClientCertVerify,
    pub root_cert: Option<CertificateDer<'static>>,
    pub alpn_protocols: Vec<Vec<u8>>,
}
