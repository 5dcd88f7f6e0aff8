//! Current + previous signing key pair
//!
//! Issuance always uses the current key; validation accepts current or
//! previous so a key rollover never invalidates in-flight tokens. The pair
//! is swapped atomically and reads are lock-free after installation.

use arc_swap::ArcSwap;
use jsonwebtoken::{DecodingKey, EncodingKey};
use payguard_core::{SigningKeyMaterial, SigningKeySet};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
struct KeyPair {
    current: SigningKeyMaterial,
    previous: Option<SigningKeyMaterial>,
}

/// Process-wide signing key pair
pub struct SigningKeys {
    pair: ArcSwap<KeyPair>,
}

impl SigningKeys {
    /// Bootstraps from the key set read off the vault.
    pub fn from_key_set(set: SigningKeySet) -> Self {
        Self {
            pair: ArcSwap::from_pointee(KeyPair {
                current: set.current,
                previous: set.previous,
            }),
        }
    }

    /// Installs a new current key, demoting the old current to previous.
    pub fn install_key(&self, new: SigningKeyMaterial) {
        let old = self.pair.load();
        info!(old_kid = %old.current.kid, new_kid = %new.kid, "installing signing key");
        self.pair.store(Arc::new(KeyPair {
            previous: Some(old.current.clone()),
            current: new,
        }));
    }

    /// Key id of the current key (stamped into issued headers).
    pub fn current_kid(&self) -> String {
        self.pair.load().current.kid.clone()
    }

    /// Encoding key for issuance.
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.pair.load().current.secret.expose().as_bytes())
    }

    /// Decoding keys in verification order: current first, then previous.
    pub fn decoding_keys(&self) -> Vec<(String, DecodingKey)> {
        let pair = self.pair.load();
        let mut keys = vec![(
            pair.current.kid.clone(),
            DecodingKey::from_secret(pair.current.secret.expose().as_bytes()),
        )];
        if let Some(previous) = &pair.previous {
            keys.push((
                previous.kid.clone(),
                DecodingKey::from_secret(previous.secret.expose().as_bytes()),
            ));
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_demotes_current_to_previous() {
        let keys = SigningKeys::from_key_set(SigningKeySet::single(SigningKeyMaterial::generate(
            "k1",
        )));
        assert_eq!(keys.current_kid(), "k1");
        assert_eq!(keys.decoding_keys().len(), 1);

        keys.install_key(SigningKeyMaterial::generate("k2"));
        assert_eq!(keys.current_kid(), "k2");

        let decoding: Vec<String> = keys.decoding_keys().into_iter().map(|(kid, _)| kid).collect();
        assert_eq!(decoding, vec!["k2", "k1"]);

        // A second install drops k1 entirely.
        keys.install_key(SigningKeyMaterial::generate("k3"));
        let decoding: Vec<String> = keys.decoding_keys().into_iter().map(|(kid, _)| kid).collect();
        assert_eq!(decoding, vec!["k3", "k2"]);
    }
}
