use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content scanning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a scan detection does to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Record findings, pass the request through.
    #[default]
    Monitor,
    /// Convert findings into a deny decision.
    Enforce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanningConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: ScanMode,
    /// Regex patterns applied to request content (arguments, URLs,
    /// commands). Defaults catch common credential shapes.
    #[serde(default = "d_request_patterns")]
    pub request_patterns: Vec<String>,
    /// Regex patterns applied to response content by the response-scan
    /// entry point.
    #[serde(default = "d_response_patterns")]
    pub response_patterns: Vec<String>,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ScanMode::Monitor,
            request_patterns: d_request_patterns(),
            response_patterns: d_response_patterns(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_request_patterns() -> Vec<String> {
    vec![
        // AWS access key ids
        r"AKIA[0-9A-Z]{16}".into(),
        // Private key material
        r"-----BEGIN [A-Z ]*PRIVATE KEY-----".into(),
        // Bearer-ish long tokens
        r"(?i)bearer\s+[a-z0-9_\-\.=]{40,}".into(),
    ]
}

fn d_response_patterns() -> Vec<String> {
    vec![
        // Prompt-injection staples smuggled back through tool output
        r"(?i)ignore (all )?previous instructions".into(),
        r"(?i)<\s*system\s*>".into(),
    ]
}
