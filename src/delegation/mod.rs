//! Delegation protocol.
//!
//! The state machine that moves a task's custody between hierarchical
//! destinations. Custody transfers optimistically when the delegation is
//! created (the target is expected, not yet confirmed); rejection and
//! cancellation roll it back to the source. Each task's transitions are
//! serialized behind a per-task mutex, so a racing accept/reject resolves to
//! one winner and one illegal-transition error.

mod error;
mod store;
mod types;

pub use error::DelegationError;
pub use store::{InMemoryTaskStore, TaskStore};
pub use types::{Delegation, DelegationStatus, DelegationType};

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::hierarchy::InstanceRegistry;

/// Coordinates custody hand-offs across the destination hierarchy.
///
/// Delegations are append-only: the protocol never deletes one, and a task's
/// ordered set of them forms its delegation chain. At most one delegation per
/// task is ever pending or accepted.
pub struct DelegationProtocol {
    registry: Arc<InstanceRegistry>,
    tasks: Arc<dyn TaskStore>,
    delegations: DashMap<String, Delegation>,
    /// Delegation ids per task, in creation order
    chains: DashMap<String, Vec<String>>,
    task_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DelegationProtocol {
    /// Create a protocol over the given hierarchy and task storage.
    pub fn new(registry: Arc<InstanceRegistry>, tasks: Arc<dyn TaskStore>) -> Self {
        Self {
            registry,
            tasks,
            delegations: DashMap::new(),
            chains: DashMap::new(),
            task_locks: DashMap::new(),
        }
    }

    /// Hand a task to a target instance.
    ///
    /// The target must be in `Created` or `Running` status and the task must
    /// not already have an active delegation. On success the delegation is
    /// `Pending` and the task's custody has already moved to the target;
    /// custody and the new record change together under the task's lock, so
    /// no observer sees them disagree.
    pub fn delegate_task(
        &self,
        task_id: &str,
        target_instance_id: &str,
        delegation_type: DelegationType,
        delegated_by: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Delegation, DelegationError> {
        let lock = self.task_lock(task_id);
        let _guard = Self::hold(&lock);

        let task = self
            .tasks
            .get_task(task_id)
            .ok_or_else(|| DelegationError::TaskNotFound(task_id.to_string()))?;

        if let Some(active) = self.active_delegation(task_id) {
            return Err(DelegationError::AlreadyDelegated {
                task_id: task_id.to_string(),
                delegation_id: active.id,
            });
        }

        let target = self
            .registry
            .get_instance(target_instance_id)
            .ok_or_else(|| DelegationError::InstanceNotFound(target_instance_id.to_string()))?;
        if !target.status.accepts_delegations() {
            return Err(DelegationError::TargetNotAccepting {
                instance_id: target.id,
                status: target.status.to_string(),
            });
        }

        let delegation = Delegation {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            source_instance_id: task.instance_id.clone(),
            target_instance_id: target_instance_id.to_string(),
            delegation_type,
            status: DelegationStatus::Pending,
            delegated_by: delegated_by.map(str::to_string),
            delegated_at: Utc::now(),
            accepted_at: None,
            completed_at: None,
            result: None,
            rejection_reason: None,
            notes: notes.map(str::to_string).into_iter().collect(),
        };

        // Optimistic custody transfer: the target owns the task from here on
        self.tasks
            .set_task_instance(task_id, Some(target_instance_id.to_string()));
        self.shift_load(task.instance_id.as_deref(), Some(target_instance_id));

        self.chains
            .entry(task_id.to_string())
            .or_default()
            .push(delegation.id.clone());
        self.delegations
            .insert(delegation.id.clone(), delegation.clone());

        tracing::info!(
            task_id = %task_id,
            delegation_id = %delegation.id,
            target = %target_instance_id,
            delegation_type = %delegation_type,
            "Delegated task"
        );
        metrics::counter!("trellis_delegations_total", "type" => delegation_type.to_string())
            .increment(1);

        Ok(delegation)
    }

    /// Confirm custody at the target. Legal only from `Pending`.
    pub fn accept_delegation(
        &self,
        delegation_id: &str,
        notes: Option<&str>,
    ) -> Result<Delegation, DelegationError> {
        let lock = self.lock_for(delegation_id)?;
        let _guard = Self::hold(&lock);

        let mut delegation = self.entry(delegation_id)?;
        Self::check_transition(&delegation, DelegationStatus::Accepted)?;

        delegation.status = DelegationStatus::Accepted;
        delegation.accepted_at = Some(Utc::now());
        if let Some(n) = notes {
            delegation.notes.push(n.to_string());
        }
        tracing::debug!(delegation_id = %delegation_id, "Delegation accepted");
        Ok(delegation.clone())
    }

    /// Decline the hand-off and return custody to the source. Legal only
    /// from `Pending`.
    pub fn reject_delegation(
        &self,
        delegation_id: &str,
        reason: &str,
    ) -> Result<Delegation, DelegationError> {
        let lock = self.lock_for(delegation_id)?;
        let _guard = Self::hold(&lock);

        let mut delegation = self.entry(delegation_id)?;
        Self::check_transition(&delegation, DelegationStatus::Rejected)?;

        delegation.status = DelegationStatus::Rejected;
        delegation.rejection_reason = Some(reason.to_string());

        self.tasks
            .set_task_instance(&delegation.task_id, delegation.source_instance_id.clone());
        self.shift_load(
            Some(&delegation.target_instance_id),
            delegation.source_instance_id.as_deref(),
        );

        tracing::info!(
            delegation_id = %delegation_id,
            task_id = %delegation.task_id,
            reason = %reason,
            "Delegation rejected; custody returned to source"
        );
        Ok(delegation.clone())
    }

    /// Mark the delegated work finished. Legal from `Pending` or `Accepted`
    /// (a target may complete without an explicit accept).
    pub fn complete_delegation(
        &self,
        delegation_id: &str,
        result: Option<serde_json::Value>,
        notes: Option<&str>,
    ) -> Result<Delegation, DelegationError> {
        let lock = self.lock_for(delegation_id)?;
        let _guard = Self::hold(&lock);

        let mut delegation = self.entry(delegation_id)?;
        Self::check_transition(&delegation, DelegationStatus::Completed)?;

        delegation.status = DelegationStatus::Completed;
        delegation.completed_at = Some(Utc::now());
        delegation.result = result;
        if let Some(n) = notes {
            delegation.notes.push(n.to_string());
        }

        self.shift_load(Some(&delegation.target_instance_id), None);

        tracing::info!(
            delegation_id = %delegation_id,
            task_id = %delegation.task_id,
            "Delegation completed"
        );
        Ok(delegation.clone())
    }

    /// Withdraw an in-flight delegation and return custody to the source.
    /// Legal from `Pending` or `Accepted`.
    pub fn cancel_delegation(&self, delegation_id: &str) -> Result<Delegation, DelegationError> {
        let lock = self.lock_for(delegation_id)?;
        let _guard = Self::hold(&lock);

        let mut delegation = self.entry(delegation_id)?;
        Self::check_transition(&delegation, DelegationStatus::Cancelled)?;

        delegation.status = DelegationStatus::Cancelled;

        self.tasks
            .set_task_instance(&delegation.task_id, delegation.source_instance_id.clone());
        self.shift_load(
            Some(&delegation.target_instance_id),
            delegation.source_instance_id.as_deref(),
        );

        tracing::info!(
            delegation_id = %delegation_id,
            task_id = %delegation.task_id,
            "Delegation cancelled; custody returned to source"
        );
        Ok(delegation.clone())
    }

    /// Fetch a delegation snapshot by id.
    pub fn get_delegation(&self, delegation_id: &str) -> Option<Delegation> {
        self.delegations
            .get(delegation_id)
            .map(|entry| entry.value().clone())
    }

    /// The full custody history of a task, ordered by `delegated_at`
    /// ascending.
    pub fn delegation_chain(&self, task_id: &str) -> Vec<Delegation> {
        let mut chain: Vec<Delegation> = self
            .chains
            .get(task_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.get_delegation(id))
                    .collect()
            })
            .unwrap_or_default();
        chain.sort_by_key(|d| d.delegated_at);
        chain
    }

    /// The single pending or accepted delegation for a task, if any.
    pub fn active_delegation(&self, task_id: &str) -> Option<Delegation> {
        self.delegation_chain(task_id)
            .into_iter()
            .find(|d| d.status.is_active())
    }

    fn check_transition(
        delegation: &Delegation,
        to: DelegationStatus,
    ) -> Result<(), DelegationError> {
        if delegation.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(DelegationError::IllegalTransition {
                delegation_id: delegation.id.clone(),
                from: delegation.status.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Best-effort load bookkeeping on the registry. Failures only warn: the
    /// counters are advisory and an instance may have been removed mid-flight.
    fn shift_load(&self, from: Option<&str>, to: Option<&str>) {
        if let Some(from) = from {
            if let Err(err) = self.registry.decrement_load(from) {
                tracing::warn!(instance_id = %from, error = %err, "Could not decrement load");
            }
        }
        if let Some(to) = to {
            if let Err(err) = self.registry.increment_load(to) {
                tracing::warn!(instance_id = %to, error = %err, "Could not increment load");
            }
        }
    }

    fn entry(
        &self,
        delegation_id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, Delegation>, DelegationError> {
        self.delegations
            .get_mut(delegation_id)
            .ok_or_else(|| DelegationError::DelegationNotFound(delegation_id.to_string()))
    }

    fn lock_for(&self, delegation_id: &str) -> Result<Arc<Mutex<()>>, DelegationError> {
        let task_id = self
            .delegations
            .get(delegation_id)
            .map(|d| d.task_id.clone())
            .ok_or_else(|| DelegationError::DelegationNotFound(delegation_id.to_string()))?;
        Ok(self.task_lock(&task_id))
    }

    fn task_lock(&self, task_id: &str) -> Arc<Mutex<()>> {
        self.task_locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
        lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{Instance, InstanceScope, InstanceStatus};
    use crate::task::{Task, TaskPriority};

    fn setup() -> (Arc<InstanceRegistry>, Arc<InMemoryTaskStore>, DelegationProtocol) {
        let registry = Arc::new(InstanceRegistry::new());
        registry
            .add_instance(Instance::new(
                "root",
                "Root",
                InstanceScope::Global,
                None,
                vec![],
                100,
            ))
            .unwrap();
        registry
            .add_instance(Instance::new(
                "triage",
                "Triage",
                InstanceScope::Project,
                Some("root".to_string()),
                vec![],
                10,
            ))
            .unwrap();
        registry
            .add_instance(Instance::new(
                "stopped",
                "Stopped",
                InstanceScope::Project,
                Some("root".to_string()),
                vec![],
                10,
            ))
            .unwrap();
        registry
            .update_status("root", InstanceStatus::Running)
            .unwrap();
        registry
            .update_status("triage", InstanceStatus::Running)
            .unwrap();
        registry
            .update_status("stopped", InstanceStatus::Stopped)
            .unwrap();

        let tasks = Arc::new(InMemoryTaskStore::new());
        let mut task = Task::new("t1", "Fix login", "", vec![], TaskPriority::High);
        task.instance_id = Some("root".to_string());
        tasks.upsert_task(task);

        let protocol = DelegationProtocol::new(registry.clone(), tasks.clone());
        (registry, tasks, protocol)
    }

    #[test]
    fn fresh_delegation_is_pending_and_moves_custody() {
        let (_, tasks, protocol) = setup();
        let delegation = protocol
            .delegate_task("t1", "triage", DelegationType::Route, Some("router"), None)
            .unwrap();

        assert_eq!(delegation.status, DelegationStatus::Pending);
        assert_eq!(delegation.source_instance_id.as_deref(), Some("root"));
        assert_eq!(delegation.target_instance_id, "triage");
        assert_eq!(
            tasks.get_task("t1").unwrap().instance_id.as_deref(),
            Some("triage")
        );
    }

    #[test]
    fn delegating_to_stopped_instance_fails() {
        let (_, _, protocol) = setup();
        let result = protocol.delegate_task("t1", "stopped", DelegationType::Route, None, None);
        assert!(matches!(
            result,
            Err(DelegationError::TargetNotAccepting { .. })
        ));
    }

    #[test]
    fn delegating_unknown_task_or_instance_fails() {
        let (_, _, protocol) = setup();
        assert!(matches!(
            protocol.delegate_task("missing", "triage", DelegationType::Route, None, None),
            Err(DelegationError::TaskNotFound(_))
        ));
        assert!(matches!(
            protocol.delegate_task("t1", "missing", DelegationType::Route, None, None),
            Err(DelegationError::InstanceNotFound(_))
        ));
    }

    #[test]
    fn only_one_active_delegation_per_task() {
        let (_, _, protocol) = setup();
        protocol
            .delegate_task("t1", "triage", DelegationType::Route, None, None)
            .unwrap();
        let result = protocol.delegate_task("t1", "root", DelegationType::Escalate, None, None);
        assert!(matches!(
            result,
            Err(DelegationError::AlreadyDelegated { .. })
        ));
    }

    #[test]
    fn accept_twice_is_illegal() {
        let (_, _, protocol) = setup();
        let d = protocol
            .delegate_task("t1", "triage", DelegationType::Route, None, None)
            .unwrap();

        let accepted = protocol.accept_delegation(&d.id, Some("on it")).unwrap();
        assert_eq!(accepted.status, DelegationStatus::Accepted);
        assert!(accepted.accepted_at.is_some());
        assert_eq!(accepted.notes, vec!["on it"]);

        let result = protocol.accept_delegation(&d.id, None);
        assert!(matches!(
            result,
            Err(DelegationError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn reject_restores_custody_to_source() {
        let (_, tasks, protocol) = setup();
        let d = protocol
            .delegate_task("t1", "triage", DelegationType::Route, None, None)
            .unwrap();

        let rejected = protocol.reject_delegation(&d.id, "wrong team").unwrap();
        assert_eq!(rejected.status, DelegationStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("wrong team"));
        assert_eq!(
            tasks.get_task("t1").unwrap().instance_id.as_deref(),
            Some("root")
        );
    }

    #[test]
    fn reject_after_accept_is_illegal() {
        let (_, _, protocol) = setup();
        let d = protocol
            .delegate_task("t1", "triage", DelegationType::Route, None, None)
            .unwrap();
        protocol.accept_delegation(&d.id, None).unwrap();

        let result = protocol.reject_delegation(&d.id, "too late");
        assert!(matches!(
            result,
            Err(DelegationError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn complete_is_legal_straight_from_pending() {
        let (_, _, protocol) = setup();
        let d = protocol
            .delegate_task("t1", "triage", DelegationType::Route, None, None)
            .unwrap();

        let completed = protocol
            .complete_delegation(&d.id, Some(serde_json::json!({"fixed": true})), None)
            .unwrap();
        assert_eq!(completed.status, DelegationStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert_eq!(completed.result, Some(serde_json::json!({"fixed": true})));
    }

    #[test]
    fn cancel_restores_custody_and_blocks_terminal_cancel() {
        let (_, tasks, protocol) = setup();
        let d = protocol
            .delegate_task("t1", "triage", DelegationType::Route, None, None)
            .unwrap();
        protocol.accept_delegation(&d.id, None).unwrap();

        let cancelled = protocol.cancel_delegation(&d.id).unwrap();
        assert_eq!(cancelled.status, DelegationStatus::Cancelled);
        assert_eq!(
            tasks.get_task("t1").unwrap().instance_id.as_deref(),
            Some("root")
        );

        let result = protocol.cancel_delegation(&d.id);
        assert!(matches!(
            result,
            Err(DelegationError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn active_delegation_tracks_lifecycle() {
        let (_, _, protocol) = setup();
        assert!(protocol.active_delegation("t1").is_none());

        let d = protocol
            .delegate_task("t1", "triage", DelegationType::Route, None, None)
            .unwrap();
        assert_eq!(protocol.active_delegation("t1").unwrap().id, d.id);

        protocol.accept_delegation(&d.id, None).unwrap();
        assert_eq!(protocol.active_delegation("t1").unwrap().id, d.id);

        protocol.complete_delegation(&d.id, None, None).unwrap();
        assert!(protocol.active_delegation("t1").is_none());
    }

    #[test]
    fn chain_is_append_only_and_ordered() {
        let (_, _, protocol) = setup();
        let d1 = protocol
            .delegate_task("t1", "triage", DelegationType::Route, None, None)
            .unwrap();
        protocol.reject_delegation(&d1.id, "busy").unwrap();

        let d2 = protocol
            .delegate_task("t1", "triage", DelegationType::Reassign, None, None)
            .unwrap();
        protocol.complete_delegation(&d2.id, None, None).unwrap();

        let chain = protocol.delegation_chain("t1");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, d1.id);
        assert_eq!(chain[1].id, d2.id);
        assert!(chain[0].delegated_at <= chain[1].delegated_at);
    }

    #[test]
    fn load_counters_follow_custody() {
        let (registry, _, protocol) = setup();
        let d = protocol
            .delegate_task("t1", "triage", DelegationType::Route, None, None)
            .unwrap();
        assert_eq!(registry.get_instance("triage").unwrap().current_load, 1);

        protocol.reject_delegation(&d.id, "no").unwrap();
        assert_eq!(registry.get_instance("triage").unwrap().current_load, 0);
        assert_eq!(registry.get_instance("root").unwrap().current_load, 1);
    }

    #[test]
    fn transition_on_unknown_delegation_fails() {
        let (_, _, protocol) = setup();
        assert!(matches!(
            protocol.accept_delegation("nope", None),
            Err(DelegationError::DelegationNotFound(_))
        ));
    }
}
