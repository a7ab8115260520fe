pub mod approval;
pub mod audit;
pub mod baseline;
pub mod identity;
pub mod policy;
pub mod state;

pub use approval::{ApprovalStatus, PendingApproval};
pub use audit::AuditRecord;
pub use baseline::ToolBaseline;
pub use identity::{ApiKey, ApiKeyView, Identity};
pub use policy::{
    OutboundAction, OutboundMode, OutboundRule, OutboundTarget, Policy, Rule, TargetType,
};
pub use state::{
    AppState, ContentScanning, HttpGatewayTarget, TlsInspection, MAX_POLICY_EVALUATIONS,
    STATE_SCHEMA_VERSION,
};
