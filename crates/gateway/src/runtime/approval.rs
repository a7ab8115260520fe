//! Approval coordinator — pending human-approval requests with deadlines.
//!
//! A request that matches an `approval_required` rule parks here until an
//! admin signals approve/deny or the deadline passes. Exactly one
//! terminal transition ever happens per entry; racing signals lose with
//! a conflict. Waiters observe transitions through a per-entry watch
//! channel, so long-poll `await_decision` and the status-poll API see
//! the same state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use sg_domain::model::{ApprovalStatus, AuditRecord, PendingApproval};
use sg_domain::{CanonicalAction, Error, Result, TimeoutAction};

/// Audit row for an approval resolved while no request was waiting on it
/// (submit-and-poll callers, or callers that went away). Waited entries
/// are audited by the chain with full action context instead.
pub fn resolution_record(approval: &PendingApproval) -> AuditRecord {
    let (decision, allowed, reason) = match approval.status {
        ApprovalStatus::Approved => ("allow", true, "approved by admin".to_owned()),
        ApprovalStatus::Denied => (
            "deny",
            false,
            match &approval.reason {
                Some(reason) => format!("denied by admin: {reason}"),
                None => "denied by admin".to_owned(),
            },
        ),
        ApprovalStatus::Expired => {
            let timeout_secs = (approval.deadline - approval.created_at).num_seconds();
            match approval.timeout_action {
                TimeoutAction::Allow => (
                    "allow",
                    true,
                    format!("approval timed out after {timeout_secs}s; timeout action allow"),
                ),
                TimeoutAction::Deny => (
                    "deny",
                    false,
                    format!("approval timed out after {timeout_secs}s"),
                ),
            }
        }
        ApprovalStatus::Pending => ("deny", false, "approval still pending".to_owned()),
    };
    AuditRecord {
        timestamp: Utc::now(),
        request_id: approval.request_id.clone(),
        session_id: String::new(),
        identity_id: approval.identity_id.clone(),
        identity_name: approval.identity_name.clone(),
        tool_name: approval.action_name.clone(),
        decision: decision.to_owned(),
        allowed,
        reason,
        rule_id: String::new(),
        rule_name: String::new(),
        latency_us: 0,
        protocol: "mcp".to_owned(),
        framework: String::new(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Entry {
    approval: PendingApproval,
    tx: watch::Sender<ApprovalStatus>,
    /// True when a blocked request is (or will be) waiting on this entry
    /// and will audit the resolution itself. False for submit-and-poll
    /// entries, whose resolution is audited by whoever transitions them.
    caller_waits: bool,
}

/// Thread-safe store of approval entries. Lock hold time is O(1) per
/// signal; waiting happens outside the lock on the watch channel.
pub struct ApprovalCoordinator {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl Default for ApprovalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalCoordinator {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create a pending entry for an action gated by an approval rule.
    /// The deadline and timeout action are captured now; later rule
    /// edits do not affect this entry.
    pub fn create(
        &self,
        action: &CanonicalAction,
        deadline: DateTime<Utc>,
        timeout_action: TimeoutAction,
        caller_waits: bool,
    ) -> PendingApproval {
        let approval = PendingApproval {
            id: Uuid::new_v4(),
            request_id: action.request_id.clone(),
            action_name: action.action_name.clone(),
            identity_id: action.identity_id.clone(),
            identity_name: action.identity_name.clone(),
            status: ApprovalStatus::Pending,
            reason: None,
            created_at: Utc::now(),
            resolved_at: None,
            deadline,
            timeout_action,
        };
        let (tx, _rx) = watch::channel(ApprovalStatus::Pending);
        self.entries.lock().insert(
            approval.id,
            Entry {
                approval: approval.clone(),
                tx,
                caller_waits,
            },
        );
        approval
    }

    /// Whether a blocked caller owns auditing for this entry.
    pub fn caller_waits(&self, id: Uuid) -> bool {
        self.entries
            .lock()
            .get(&id)
            .map_or(false, |e| e.caller_waits)
    }

    /// Re-insert a mirrored entry found in the persisted state at boot.
    /// Entries already past their deadline expire on the next tick.
    pub fn restore(&self, approval: PendingApproval) {
        if approval.status.is_terminal() {
            return;
        }
        let (tx, _rx) = watch::channel(ApprovalStatus::Pending);
        self.entries.lock().insert(
            approval.id,
            Entry {
                approval,
                tx,
                caller_waits: false,
            },
        );
    }

    pub fn approve(&self, id: Uuid) -> Result<PendingApproval> {
        self.transition(id, ApprovalStatus::Approved, None)
    }

    pub fn deny(&self, id: Uuid, reason: Option<String>) -> Result<PendingApproval> {
        self.transition(id, ApprovalStatus::Denied, reason)
    }

    /// Expire one entry if still pending. Used by `await_decision` when
    /// its own deadline fires; idempotent against racing signals.
    fn expire(&self, id: Uuid) {
        let _ = self.transition(id, ApprovalStatus::Expired, None);
    }

    /// Transition all entries whose deadline has passed. Returns the
    /// newly expired entries so the caller can mirror them.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Vec<PendingApproval> {
        let mut expired = Vec::new();
        let mut entries = self.entries.lock();
        for entry in entries.values_mut() {
            if entry.approval.status == ApprovalStatus::Pending && entry.approval.deadline <= now {
                entry.approval.status = ApprovalStatus::Expired;
                entry.approval.resolved_at = Some(now);
                let _ = entry.tx.send_replace(ApprovalStatus::Expired);
                expired.push(entry.approval.clone());
            }
        }
        expired
    }

    /// Drop terminal entries resolved before `cutoff` (the state mirror
    /// keeps the durable history).
    pub fn prune_resolved(&self, cutoff: DateTime<Utc>) {
        self.entries.lock().retain(|_, entry| {
            !entry.approval.status.is_terminal()
                || entry.approval.resolved_at.map_or(true, |t| t > cutoff)
        });
    }

    pub fn get(&self, id: Uuid) -> Option<PendingApproval> {
        self.entries.lock().get(&id).map(|e| e.approval.clone())
    }

    pub fn find_by_request(&self, request_id: &str) -> Option<PendingApproval> {
        self.entries
            .lock()
            .values()
            .find(|e| e.approval.request_id == request_id)
            .map(|e| e.approval.clone())
    }

    pub fn list_pending(&self) -> Vec<PendingApproval> {
        let mut pending: Vec<PendingApproval> = self
            .entries
            .lock()
            .values()
            .filter(|e| e.approval.status == ApprovalStatus::Pending)
            .map(|e| e.approval.clone())
            .collect();
        pending.sort_by_key(|a| a.created_at);
        pending
    }

    /// Block until the entry reaches a terminal state.
    ///
    /// Returns immediately for already-terminal entries. If the deadline
    /// passes while waiting, the entry is expired here — deterministic
    /// even when the background ticker has not run yet.
    pub async fn await_decision(&self, id: Uuid) -> Result<PendingApproval> {
        let (mut rx, deadline) = {
            let entries = self.entries.lock();
            let entry = entries
                .get(&id)
                .ok_or_else(|| Error::NotFound(format!("approval {id}")))?;
            if entry.approval.status.is_terminal() {
                return Ok(entry.approval.clone());
            }
            (entry.tx.subscribe(), entry.approval.deadline)
        };

        loop {
            if rx.borrow().is_terminal() {
                break;
            }
            let remaining = (deadline - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender dropped without a terminal transition;
                        // treat as expired.
                        self.expire(id);
                        break;
                    }
                }
                () = tokio::time::sleep(remaining) => {
                    self.expire(id);
                    break;
                }
            }
        }

        self.get(id)
            .ok_or_else(|| Error::NotFound(format!("approval {id}")))
    }

    // ── internals ────────────────────────────────────────────────────

    fn transition(
        &self,
        id: Uuid,
        to: ApprovalStatus,
        reason: Option<String>,
    ) -> Result<PendingApproval> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("approval {id}")))?;
        if entry.approval.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "approval {id} already resolved as {}",
                entry.approval.status.as_str()
            )));
        }
        entry.approval.status = to;
        entry.approval.reason = reason;
        entry.approval.resolved_at = Some(Utc::now());
        let _ = entry.tx.send_replace(to);
        Ok(entry.approval.clone())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn action() -> CanonicalAction {
        let mut a = CanonicalAction::tool_call("delete_file", serde_json::Map::new());
        a.identity_name = "agent".into();
        a
    }

    fn coordinator_with_pending(timeout: Duration) -> (ApprovalCoordinator, Uuid) {
        let coordinator = ApprovalCoordinator::new();
        let approval = coordinator.create(&action(), Utc::now() + timeout, TimeoutAction::Deny, true);
        let id = approval.id;
        (coordinator, id)
    }

    #[tokio::test]
    async fn approve_wakes_waiter() {
        let (coordinator, id) = coordinator_with_pending(Duration::seconds(30));
        let coordinator = std::sync::Arc::new(coordinator);

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.await_decision(id).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        coordinator.approve(id).unwrap();

        let resolved = waiter.await.unwrap().unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Approved);
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn deny_carries_reason() {
        let (coordinator, id) = coordinator_with_pending(Duration::seconds(30));
        coordinator.deny(id, Some("too risky".into())).unwrap();
        let resolved = coordinator.await_decision(id).await.unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Denied);
        assert_eq!(resolved.reason.as_deref(), Some("too risky"));
    }

    #[tokio::test]
    async fn second_signal_conflicts() {
        let (coordinator, id) = coordinator_with_pending(Duration::seconds(30));
        coordinator.approve(id).unwrap();
        assert!(matches!(
            coordinator.deny(id, None),
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn await_expires_at_deadline_without_ticker() {
        let (coordinator, id) = coordinator_with_pending(Duration::milliseconds(50));
        let resolved = coordinator.await_decision(id).await.unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Expired);
    }

    #[tokio::test]
    async fn await_on_freshly_expired_entry_is_deterministic() {
        let (coordinator, id) = coordinator_with_pending(Duration::milliseconds(-1));
        let expired = coordinator.expire_due(Utc::now());
        assert_eq!(expired.len(), 1);
        let resolved = coordinator.await_decision(id).await.unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Expired);
    }

    #[tokio::test]
    async fn signal_on_expired_entry_conflicts() {
        let (coordinator, id) = coordinator_with_pending(Duration::milliseconds(-1));
        coordinator.expire_due(Utc::now());
        assert!(matches!(coordinator.approve(id), Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn signal_on_unknown_entry_is_not_found() {
        let coordinator = ApprovalCoordinator::new();
        assert!(matches!(
            coordinator.approve(Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn expire_due_ignores_future_deadlines() {
        let (coordinator, id) = coordinator_with_pending(Duration::seconds(60));
        assert!(coordinator.expire_due(Utc::now()).is_empty());
        assert_eq!(coordinator.get(id).unwrap().status, ApprovalStatus::Pending);
    }

    #[test]
    fn list_pending_excludes_resolved() {
        let (coordinator, id) = coordinator_with_pending(Duration::seconds(60));
        coordinator.create(&action(), Utc::now() + Duration::seconds(60), TimeoutAction::Deny, false);
        assert_eq!(coordinator.list_pending().len(), 2);
        coordinator.approve(id).unwrap();
        assert_eq!(coordinator.list_pending().len(), 1);
    }

    #[test]
    fn prune_drops_old_terminal_entries_only() {
        let (coordinator, id) = coordinator_with_pending(Duration::seconds(60));
        coordinator.create(&action(), Utc::now() + Duration::seconds(60), TimeoutAction::Deny, false);
        coordinator.approve(id).unwrap();
        coordinator.prune_resolved(Utc::now() + Duration::seconds(1));
        assert!(coordinator.get(id).is_none());
        assert_eq!(coordinator.list_pending().len(), 1);
    }

    #[test]
    fn restore_skips_terminal_mirrors() {
        let coordinator = ApprovalCoordinator::new();
        let mut approval = coordinator.create(
            &action(),
            Utc::now() + Duration::seconds(60),
            TimeoutAction::Deny,
            false,
        );
        approval.id = Uuid::new_v4();
        approval.status = ApprovalStatus::Denied;
        coordinator.restore(approval.clone());
        assert!(coordinator.get(approval.id).is_none());
        // Only the original pending entry remains; the terminal mirror
        // must not reappear as pending.
        assert_eq!(coordinator.list_pending().len(), 1);
    }
}
