//! Identity resolve stage — fills identity fields from the gateway's
//! identity table.
//!
//! Adapters present whatever they know (an id resolved from an API key,
//! or just a name). This stage completes the triple (id, name, roles)
//! from the table; an identity the gateway does not know passes through
//! as presented, with no roles granted.

use std::sync::Arc;

use async_trait::async_trait;

use sg_domain::model::Identity;
use sg_domain::{CanonicalAction, Decision, Result};

use super::{ChainContext, Interceptor};

pub struct IdentityResolve {
    identities: Arc<Vec<Identity>>,
}

impl IdentityResolve {
    pub fn new(identities: Arc<Vec<Identity>>) -> Self {
        Self { identities }
    }

    fn by_id(&self, id: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.id == id)
    }

    fn by_name(&self, name: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.name == name)
    }
}

#[async_trait]
impl Interceptor for IdentityResolve {
    fn name(&self) -> &'static str {
        "identity_resolve"
    }

    async fn intercept(
        &self,
        action: &mut CanonicalAction,
        _cx: &ChainContext,
    ) -> Result<Option<Decision>> {
        let known = if !action.identity_id.is_empty() {
            self.by_id(&action.identity_id)
        } else if !action.identity_name.is_empty() {
            self.by_name(&action.identity_name)
        } else {
            None
        };

        if let Some(identity) = known {
            action.identity_id = identity.id.clone();
            action.identity_name = identity.name.clone();
            // The table is authoritative for roles; presented roles are
            // never trusted for known identities.
            action.identity_roles = identity.roles.clone();
        } else if !action.identity_id.is_empty() || !action.identity_name.is_empty() {
            tracing::debug!(
                identity_id = %action.identity_id,
                identity_name = %action.identity_name,
                "unknown identity; passing through without roles"
            );
            action.identity_roles.clear();
        }
        Ok(None)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
