use std::collections::HashMap;
use std::sync::Arc;

use rustls::client::ResolvesClientCert;
use rustls::crypto::CryptoProvider;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::SignatureScheme;

use crate::config::TlsIdentity;
use crate::error::TlsError;

/// A certificate resolver that always hands back one pinned alias,
/// regardless of SNI or the peer's signature-scheme hints.
///
/// `rustls` has no notion of a platform keystore alias; this is the
/// "delegate to the platform default" hook from the key-manager design note,
/// realized as "fall through to whatever single identity is configured" when
/// no alias is forced, and "always return this one" when it is.
pub struct AliasCertResolver {
    keys: HashMap<String, Arc<CertifiedKey>>,
    forced_alias: Option<String>,
    default_alias: Option<String>,
}

impl AliasCertResolver {
    pub fn new(
        identities: &[TlsIdentity],
        forced_alias: Option<String>,
        provider: &CryptoProvider,
    ) -> Result<Self, TlsError> {
        let mut keys = HashMap::new();
        for identity in identities {
            let signing_key = provider
                .key_provider
                .load_private_key(identity.key.0.clone_key())
                .map_err(|e| TlsError::InvalidCertOrKey(e.to_string()))?;
            let certified = CertifiedKey::new(identity.cert_chain.clone(), signing_key);
            keys.insert(identity.alias.clone(), Arc::new(certified));
        }
        if let Some(alias) = &forced_alias {
            if !keys.contains_key(alias) {
                return Err(TlsError::UnknownAlias(alias.clone()));
            }
        }
        let default_alias = identities.first().map(|i| i.alias.clone());
        Ok(Self {
            keys,
            forced_alias,
            default_alias,
        })
    }

    fn resolve_key(&self) -> Option<Arc<CertifiedKey>> {
        let alias = self.forced_alias.as_ref().or(self.default_alias.as_ref())?;
        self.keys.get(alias).cloned()
    }
}

impl std::fmt::Debug for AliasCertResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasCertResolver")
            .field("aliases", &self.keys.keys().collect::<Vec<_>>())
            .field("forced_alias", &self.forced_alias)
            .finish()
    }
}

impl ResolvesServerCert for AliasCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.resolve_key()
    }
}

impl ResolvesClientCert for AliasCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sig_schemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        self.resolve_key()
    }

    fn has_certs(&self) -> bool {
        !self.keys.is_empty()
    }
}
