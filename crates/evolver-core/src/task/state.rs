//! Task state machine transitions.

use chrono::Utc;

use super::{EvolutionTask, TaskError, TaskStatus};

/// The evolution task state machine.
///
/// Enforces the valid transition graph:
///
/// ```text
/// pending -> running
/// pending -> cancelled
/// running -> completed
/// running -> failed
/// running -> cancelled
/// ```
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Check whether a transition from `from` to `to` is a valid edge
    /// in the state graph.
    pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
        matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }

    /// Move `task` to `to`, stamping timestamps.
    ///
    /// - Sets `started_at` on `pending -> running`.
    /// - Sets `completed_at` on any transition into a terminal status.
    pub fn transition(task: &mut EvolutionTask, to: TaskStatus) -> Result<(), TaskError> {
        let from = task.status;
        if !Self::is_valid_transition(from, to) {
            return Err(TaskError::InvalidTransition {
                id: task.id,
                from,
                to,
            });
        }

        let now = Utc::now();
        if to == TaskStatus::Running {
            task.started_at = Some(now);
        }
        if to.is_terminal() {
            task.completed_at = Some(now);
        }
        task.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::EvolveSpec;

    const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    fn task() -> EvolutionTask {
        EvolutionTask::new(&EvolveSpec::new("src/", "make parsing faster"))
    }

    #[test]
    fn exactly_five_edges_are_valid() {
        let valid: Vec<_> = ALL
            .iter()
            .flat_map(|&from| ALL.iter().map(move |&to| (from, to)))
            .filter(|&(from, to)| TaskStateMachine::is_valid_transition(from, to))
            .collect();
        assert_eq!(valid.len(), 5);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!TaskStateMachine::is_valid_transition(from, to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn running_sets_started_at() {
        let mut t = task();
        TaskStateMachine::transition(&mut t, TaskStatus::Running).unwrap();
        assert_eq!(t.status, TaskStatus::Running);
        assert!(t.started_at.is_some());
        assert!(t.completed_at.is_none());
    }

    #[test]
    fn terminal_transition_sets_completed_at() {
        let mut t = task();
        TaskStateMachine::transition(&mut t, TaskStatus::Running).unwrap();
        TaskStateMachine::transition(&mut t, TaskStatus::Failed).unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn invalid_transition_leaves_task_untouched() {
        let mut t = task();
        let err = TaskStateMachine::transition(&mut t, TaskStatus::Completed).unwrap_err();
        assert!(matches!(
            err,
            TaskError::InvalidTransition {
                from: TaskStatus::Pending,
                to: TaskStatus::Completed,
                ..
            }
        ));
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.completed_at.is_none());
    }

    #[test]
    fn running_cannot_start_twice() {
        let mut t = task();
        TaskStateMachine::transition(&mut t, TaskStatus::Running).unwrap();
        assert!(TaskStateMachine::transition(&mut t, TaskStatus::Running).is_err());
    }
}
