//! Property-based checks over the token engine.

use payguard_cache::{CacheLayer, MemoryCache};
use payguard_core::{CacheConfig, ClientId, SigningKeyMaterial, SigningKeySet, TokenConfig};
use payguard_token::{SigningKeys, TokenEngine};
use proptest::prelude::*;
use std::sync::Arc;

fn engine() -> TokenEngine {
    let keys =
        SigningKeys::from_key_set(SigningKeySet::single(SigningKeyMaterial::generate("k1")));
    let cache = CacheLayer::new(Arc::new(MemoryCache::new()), CacheConfig::default());
    TokenEngine::new(TokenConfig::default(), keys, cache)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn client_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,24}"
}

fn permissions_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z_]{1,16}", 1..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// An issued token validates and parses back to what was requested.
    #[test]
    fn issue_then_parse_round_trips(raw_id in client_id_strategy(), permissions in permissions_strategy()) {
        let rt = runtime();
        rt.block_on(async {
            let engine = engine();
            let client = ClientId::new(raw_id.clone()).unwrap();

            let token = engine.issue(&client, Some(permissions.clone())).await.unwrap();
            prop_assert!(engine.validate(&token.token_string).await);

            let parsed = engine.parse(&token.token_string).await.unwrap();
            prop_assert_eq!(parsed.client_id.as_str(), raw_id.as_str());
            prop_assert_eq!(parsed.token_id, token.token_id);

            // Issuance dedupes while preserving order; mirror that here.
            let mut expected: Vec<String> = Vec::new();
            for p in &permissions {
                if !expected.contains(p) {
                    expected.push(p.clone());
                }
            }
            prop_assert_eq!(parsed.permissions, expected);
            Ok(())
        })?;
    }

    /// Revocation kills exactly the revoked id, forever.
    #[test]
    fn revocation_is_permanent_and_scoped(raw_id in client_id_strategy()) {
        let rt = runtime();
        rt.block_on(async {
            let engine = engine();
            let client = ClientId::new(raw_id).unwrap();

            let doomed = engine.issue(&client, None).await.unwrap();
            let survivor = engine.issue(&client, None).await.unwrap();

            engine.revoke(&doomed.token_id).await;
            prop_assert!(!engine.validate(&doomed.token_string).await);
            prop_assert!(engine.validate(&survivor.token_string).await);

            // Still revoked after another revoke and more traffic.
            engine.revoke(&doomed.token_id).await;
            let fresh = engine.issue(&client, None).await.unwrap();
            prop_assert!(!engine.validate(&doomed.token_string).await);
            prop_assert!(engine.validate(&fresh.token_string).await);
            Ok(())
        })?;
    }

    /// Any single corrupted signature byte fails validation, regardless of
    /// where in the signature it sits.
    #[test]
    fn corrupted_signatures_never_validate(position_seed in 0usize..4096) {
        let rt = runtime();
        rt.block_on(async {
            let engine = engine();
            let client = ClientId::new("acme").unwrap();
            let token = engine.issue(&client, None).await.unwrap();

            let signature_start = token.token_string.rfind('.').unwrap() + 1;
            let signature_len = token.token_string.len() - signature_start;
            prop_assume!(signature_len > 0);
            let position = signature_start + (position_seed % signature_len);

            let mut bytes = token.token_string.clone().into_bytes();
            bytes[position] = if bytes[position] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            prop_assume!(tampered != token.token_string);

            prop_assert!(!engine.validate(&tampered).await);
            Ok(())
        })?;
    }

    /// Payload tampering invalidates the signature check.
    #[test]
    fn corrupted_payloads_never_validate(position_seed in 0usize..4096) {
        let rt = runtime();
        rt.block_on(async {
            let engine = engine();
            let client = ClientId::new("acme").unwrap();
            let token = engine.issue(&client, None).await.unwrap();

            let first_dot = token.token_string.find('.').unwrap();
            let second_dot = token.token_string.rfind('.').unwrap();
            prop_assume!(second_dot > first_dot + 1);
            let payload_len = second_dot - first_dot - 1;
            let position = first_dot + 1 + (position_seed % payload_len);

            let mut bytes = token.token_string.clone().into_bytes();
            bytes[position] = if bytes[position] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            prop_assume!(tampered != token.token_string);

            prop_assert!(!engine.validate(&tampered).await);
            Ok(())
        })?;
    }
}
