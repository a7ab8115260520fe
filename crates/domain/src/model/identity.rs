//! Identities and API keys.
//!
//! An `Identity` is who the gateway believes is acting; an `ApiKey` binds
//! a presented bearer token to one. Key material is stored only as a
//! password-hash KDF digest — the plaintext is emitted exactly once at
//! generation time and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    /// Case-sensitively unique across active identities.
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_only: bool,
}

impl Identity {
    pub fn new(name: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            roles,
            created_at: Utc::now(),
            read_only: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("identity name must not be empty".into()));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// API keys
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub identity_id: String,
    pub name: String,
    /// PHC-format argon2 digest of the plaintext key.
    pub key_hash: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
}

impl ApiKey {
    /// Usable means not revoked and not past expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// Public view of an API key — everything except the hash.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyView {
    pub id: String,
    pub identity_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

impl From<&ApiKey> for ApiKeyView {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id.clone(),
            identity_id: key.identity_id.clone(),
            name: key.name.clone(),
            created_at: key.created_at,
            expires_at: key.expires_at,
            revoked: key.revoked,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoked_key_is_inactive() {
        let mut key = ApiKey {
            id: "k1".into(),
            identity_id: "i1".into(),
            name: "ci".into(),
            key_hash: "$argon2id$...".into(),
            created_at: Utc::now(),
            expires_at: None,
            revoked: false,
        };
        assert!(key.is_active(Utc::now()));
        key.revoked = true;
        assert!(!key.is_active(Utc::now()));
    }

    #[test]
    fn expired_key_is_inactive() {
        let key = ApiKey {
            id: "k1".into(),
            identity_id: "i1".into(),
            name: "ci".into(),
            key_hash: String::new(),
            created_at: Utc::now(),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            revoked: false,
        };
        assert!(!key.is_active(Utc::now()));
    }

    #[test]
    fn view_omits_hash() {
        let key = ApiKey {
            id: "k1".into(),
            identity_id: "i1".into(),
            name: "ci".into(),
            key_hash: "secret-digest".into(),
            created_at: Utc::now(),
            expires_at: None,
            revoked: false,
        };
        let json = serde_json::to_string(&ApiKeyView::from(&key)).unwrap();
        assert!(!json.contains("secret-digest"));
    }
}
