//! API key material.
//!
//! Plaintext keys are `sg_` + 64 lowercase hex characters, shown exactly
//! once at generation. Storage holds only an argon2 PHC digest;
//! verification walks the active keys and checks the digest.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::RngCore;

use sg_domain::model::{AppState, Identity};
use sg_domain::{Error, Result};

/// Prefix every SentinelGate key carries.
pub const KEY_PREFIX: &str = "sg_";

/// Generate a fresh key. Returns `(plaintext, phc_hash)` — the plaintext
/// leaves this function exactly once and must not be stored.
pub fn generate_key() -> Result<(String, String)> {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let plaintext = format!("{KEY_PREFIX}{}", hex::encode(raw));

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| Error::Persistence(format!("hashing api key: {e}")))?
        .to_string();
    Ok((plaintext, hash))
}

/// Constant-cost verification of a presented key against a stored digest.
pub fn verify_key(plaintext: &str, phc_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Resolve a presented bearer token to its identity, if any active key
/// verifies.
pub fn resolve_identity(state: &AppState, token: &str) -> Option<Identity> {
    if !token.starts_with(KEY_PREFIX) {
        return None;
    }
    let now = chrono::Utc::now();
    state
        .api_keys
        .iter()
        .filter(|key| key.is_active(now))
        .find(|key| verify_key(token, &key.key_hash))
        .and_then(|key| state.identity(&key.identity_id).cloned())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sg_domain::model::ApiKey;

    #[test]
    fn generated_key_has_documented_format() {
        let (plaintext, hash) = generate_key().unwrap();
        assert!(plaintext.starts_with("sg_"));
        assert_eq!(plaintext.len(), 3 + 64);
        assert!(plaintext[3..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn verify_accepts_right_key_and_rejects_wrong() {
        let (plaintext, hash) = generate_key().unwrap();
        assert!(verify_key(&plaintext, &hash));
        assert!(!verify_key("sg_wrong", &hash));
        assert!(!verify_key(&plaintext, "not-a-phc-hash"));
    }

    #[test]
    fn resolve_identity_honors_revocation() {
        let (plaintext, hash) = generate_key().unwrap();
        let mut state = AppState::default_state();
        let identity = Identity::new("agent", vec!["user".into()]);
        let identity_id = identity.id.clone();
        state.add_identity(identity).unwrap();
        state.api_keys.push(ApiKey {
            id: "k1".into(),
            identity_id,
            name: "ci".into(),
            key_hash: hash,
            created_at: Utc::now(),
            expires_at: None,
            revoked: false,
        });

        assert_eq!(resolve_identity(&state, &plaintext).unwrap().name, "agent");
        state.api_keys[0].revoked = true;
        assert!(resolve_identity(&state, &plaintext).is_none());
    }

    #[test]
    fn resolve_rejects_foreign_prefix() {
        let state = AppState::default_state();
        assert!(resolve_identity(&state, "sk-something").is_none());
    }
}
