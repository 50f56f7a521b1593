//! Mutual-TLS transport for IDSCP2: certificate/key configuration, the
//! permissive/strict peer verification modes, the alias-forcing key
//! resolver, and the `SecureChannel` the rest of the stack reads/writes.

mod channel;
mod config;
mod error;
mod resolver;
mod verifier;

pub use channel::{accept_server, connect_client, SecureChannel};
pub use config::{ClientCertVerify, PeerCertVerify, TlsConfig, TlsIdentity, TlsPrivateKey};
pub use error::TlsError;
