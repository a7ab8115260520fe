use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_3710")]
    pub port: u16,
    /// The admin surface is loopback-anchored; binding elsewhere is
    /// flagged by config validation.
    #[serde(default = "d_host")]
    pub host: String,
    /// Per-client-IP fixed-window rate limit. `None` disables limiting.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3710,
            host: "127.0.0.1".into(),
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "d_120")]
    pub max_requests: u32,
    #[serde(default = "d_60")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 120,
            window_secs: 60,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_3710() -> u16 {
    3710
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_120() -> u32 {
    120
}
fn d_60() -> u64 {
    60
}
