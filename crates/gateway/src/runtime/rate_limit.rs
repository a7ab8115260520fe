//! Per-client-IP fixed-window rate limiting for the interceptor chain.
//!
//! Loopback clients are exempt — the limiter exists to slow down a
//! misbehaving non-local caller, and the admin surface is loopback-only
//! anyway. Windows are reset lazily on access; a periodic sweep drops
//! idle entries.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use sg_domain::config::RateLimitConfig;

struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    entries: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request; `true` means allowed.
    pub fn check(&self, ip: IpAddr) -> bool {
        if ip.is_loopback() {
            return true;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let window = entries.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        window.count += 1;
        window.count <= self.max_requests
    }

    /// Drop windows that ended at least one full window ago.
    pub fn sweep(&self) {
        let now = Instant::now();
        let horizon = self.window * 2;
        self.entries
            .lock()
            .retain(|_, w| now.duration_since(w.started) < horizon);
    }

    pub fn tracked(&self) -> usize {
        self.entries.lock().len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
