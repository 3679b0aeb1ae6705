//! Task registry -- the shared, keyed store of evolution task records.
//!
//! The orchestrator running a task is its only writer; anyone holding a
//! clone of the registry may read snapshots at any time. Writes go through
//! [`TaskRegistry::update`], which applies a whole phase's changes inside
//! one critical section, so readers never see half of an update.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::client::ValidationError;

use super::state::TaskStateMachine;
use super::{EvolutionTask, EvolveSpec, TaskError, TaskId, TaskStatus};

/// Keyed store of [`EvolutionTask`] records. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, EvolutionTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, EvolutionTask>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, EvolutionTask>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate `spec` and store a new pending task for it.
    ///
    /// Nothing runs yet; see [`crate::evolution::EvolutionOrchestrator`].
    pub fn create(&self, spec: &EvolveSpec) -> Result<TaskId, ValidationError> {
        spec.validate()?;
        let mut task = EvolutionTask::new(spec);

        let mut tasks = self.write();
        while tasks.contains_key(&task.id) {
            task.id = Uuid::new_v4();
        }
        let id = task.id;
        tasks.insert(id, task);
        Ok(id)
    }

    /// Snapshot of one task.
    pub fn get(&self, id: TaskId) -> Option<EvolutionTask> {
        self.read().get(&id).cloned()
    }

    /// Snapshots of every task, oldest first.
    pub fn list(&self) -> Vec<EvolutionTask> {
        let mut tasks: Vec<EvolutionTask> = self.read().values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Apply `f` to a task under the write lock.
    pub(crate) fn update<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut EvolutionTask) -> R,
    ) -> Result<R, TaskError> {
        let mut tasks = self.write();
        let task = tasks.get_mut(&id).ok_or(TaskError::NotFound(id))?;
        Ok(f(task))
    }

    /// Run a state-machine transition on a stored task.
    pub(crate) fn transition(&self, id: TaskId, to: TaskStatus) -> Result<(), TaskError> {
        self.update(id, |task| TaskStateMachine::transition(task, to))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ChangeRecord, Phase};

    fn spec() -> EvolveSpec {
        EvolveSpec::new("src/lib.rs", "reduce allocations in hot loop")
    }

    #[test]
    fn create_then_get_returns_pending_snapshot() {
        let registry = TaskRegistry::new();
        let id = registry.create(&spec()).unwrap();

        let task = registry.get(id).unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.objective, "reduce allocations in hot loop");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn create_rejects_invalid_spec() {
        let registry = TaskRegistry::new();
        let err = registry
            .create(&EvolveSpec::new("src/", "short"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::ObjectiveTooShort { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let registry = TaskRegistry::new();
        let a = registry.create(&spec()).unwrap();
        let b = registry.create(&spec()).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn get_unknown_is_none() {
        assert!(TaskRegistry::new().get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn list_is_oldest_first() {
        let registry = TaskRegistry::new();
        let first = registry.create(&spec()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = registry.create(&spec()).unwrap();
        let ids: Vec<_> = registry.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn snapshots_are_detached_from_the_store() {
        let registry = TaskRegistry::new();
        let id = registry.create(&spec()).unwrap();
        let mut snapshot = registry.get(id).unwrap();
        snapshot.objective.clear();
        assert_eq!(registry.get(id).unwrap().objective, "reduce allocations in hot loop");
    }

    #[test]
    fn update_applies_all_changes_together() {
        let registry = TaskRegistry::new();
        let id = registry.create(&spec()).unwrap();

        registry
            .update(id, |task| {
                task.current_iteration = 1;
                task.changes.push(ChangeRecord {
                    iteration: 1,
                    phase: Phase::Analyze,
                    narrative: "plan".into(),
                    tools_used: vec![],
                    timestamp: chrono::Utc::now(),
                });
            })
            .unwrap();

        let task = registry.get(id).unwrap();
        assert_eq!(task.current_iteration, 1);
        assert_eq!(task.changes_for(1).count(), 1);
    }

    #[test]
    fn update_unknown_task_is_not_found() {
        let registry = TaskRegistry::new();
        let missing = Uuid::new_v4();
        let err = registry.update(missing, |_| ()).unwrap_err();
        assert!(matches!(err, TaskError::NotFound(id) if id == missing));
    }

    #[test]
    fn transition_goes_through_state_machine() {
        let registry = TaskRegistry::new();
        let id = registry.create(&spec()).unwrap();

        assert!(registry.transition(id, TaskStatus::Completed).is_err());
        registry.transition(id, TaskStatus::Running).unwrap();
        registry.transition(id, TaskStatus::Completed).unwrap();

        let task = registry.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());
    }
}
