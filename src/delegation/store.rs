//! Task persistence seam.
//!
//! The protocol consumes task storage from a collaborator; an in-memory
//! implementation ships for embedding and tests.

use dashmap::DashMap;

use crate::task::Task;

/// Read/write access to task custody, supplied by the embedder.
pub trait TaskStore: Send + Sync {
    /// Fetch a task snapshot by id.
    fn get_task(&self, task_id: &str) -> Option<Task>;

    /// Update which instance owns the task. `None` clears the assignment.
    /// Returns false when the task is unknown.
    fn set_task_instance(&self, task_id: &str, instance_id: Option<String>) -> bool;
}

/// DashMap-backed task store.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<String, Task>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a task.
    pub fn upsert_task(&self, task: Task) {
        self.tasks.insert(task.id.clone(), task);
    }

    /// Remove a task.
    pub fn remove_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.remove(task_id).map(|(_, task)| task)
    }

    /// Number of stored tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|entry| entry.value().clone())
    }

    fn set_task_instance(&self, task_id: &str, instance_id: Option<String>) -> bool {
        match self.tasks.get_mut(task_id) {
            Some(mut task) => {
                task.instance_id = instance_id;
                true
            }
            None => false,
        }
    }
}
