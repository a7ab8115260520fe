//! Shared domain types for SentinelGate: the canonical action, decisions,
//! the persisted state document and its model types, the common error
//! enum, and the TOML-backed configuration tree.

pub mod action;
pub mod config;
pub mod decision;
pub mod error;
pub mod model;

pub use action::{ActionType, CanonicalAction, Protocol};
pub use decision::{Decision, DefaultPolicy, RuleAction, TimeoutAction};
pub use error::{Error, Result};
