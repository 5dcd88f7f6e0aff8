//! Namespaced cache key construction
//!
//! One place builds every key so the `token:` / `token_id:` / `credential:`
//! / `revoked:` namespaces cannot drift between writers and invalidators.

use payguard_core::{ClientId, TokenId};

pub(crate) fn token_by_client(client_id: &ClientId) -> String {
    format!("token:{client_id}")
}

pub(crate) fn token_by_id(token_id: &TokenId) -> String {
    format!("token_id:{token_id}")
}

pub(crate) fn credential(client_id: &ClientId) -> String {
    format!("credential:{client_id}")
}

pub(crate) fn revoked(token_id: &TokenId) -> String {
    format!("revoked:{token_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_do_not_collide() {
        let client = ClientId::new("acme").unwrap();
        let token = TokenId::new("acme").unwrap();
        let keys = [
            token_by_client(&client),
            token_by_id(&token),
            credential(&client),
            revoked(&token),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
