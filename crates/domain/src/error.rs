/// Shared error type used across all SentinelGate crates.
///
/// Variants map one-to-one onto the gateway's externally visible failure
/// classes: the admin API translates them to HTTP statuses, the decision
/// plane treats `Eval` as "rule does not match" and never lets it escape
/// to a caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("expression compile: {0}")]
    Compile(String),

    #[error("expression eval: {0}")]
    Eval(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
