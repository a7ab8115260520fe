//! The SentinelGate policy engine: CEL rule conditions, immutable
//! rule-set snapshots with atomic publication, the ordered-match
//! evaluator, and outbound (egress) destination matching.

pub mod evaluate;
pub mod expr;
pub mod glob;
pub mod net;
pub mod outbound;
pub mod rules;

pub use evaluate::evaluate;
pub use expr::{compile, CompiledExpr, MAX_EVAL_TIME, MAX_EXPRESSION_LEN};
pub use glob::glob_match;
pub use outbound::{evaluate_outbound, Destination, EgressFinding, EgressVerdict};
pub use rules::{validate_policy, validate_rule, RuleDiagnostic, RuleSet, SharedRuleSet};
