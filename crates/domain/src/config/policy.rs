use serde::{Deserialize, Serialize};

use crate::decision::DefaultPolicy;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Applied to a freshly created state file; thereafter the persisted
    /// value wins (it can be flipped live from the admin surface).
    #[serde(default)]
    pub default_policy: DefaultPolicy,
    /// Install the bundled read-only policy and outbound defaults into a
    /// fresh state file.
    #[serde(default = "d_true")]
    pub seed_defaults: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_policy: DefaultPolicy::Allow,
            seed_defaults: true,
        }
    }
}

fn d_true() -> bool {
    true
}
