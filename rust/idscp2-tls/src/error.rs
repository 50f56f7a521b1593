use thiserror::Error;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid certificate or key material: {0}")]
    InvalidCertOrKey(String),
    #[error("no certificate configured for alias {0:?}")]
    UnknownAlias(String),
    #[error("peer presented no certificate, but mutual authentication is required")]
    MissingPeerCertificate,
}
