//! Arrival-order reconciliation over one ordered task collection.
//!
//! Three sources mutate the collection: REST-confirmed local operations,
//! local optimistic toggles, and push events originated by other
//! sessions. Conflicts on the same id resolve last-write-wins by arrival
//! order at this reconciler — there is no version or clock comparison.
//! This is a deliberate weak-consistency choice: events arrive in order
//! per connection, a human observes the result, and the partitioned
//! views are always recomputed from the one authoritative list.

use taskroom_proto::task::{Task, TaskId};

/// The session's authoritative, ordered task collection.
///
/// Ordering is a display contract: newest-created first. Ids are unique
/// within the collection.
#[derive(Debug, Default)]
pub struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    /// Creates an empty task list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a freshly fetched collection, replacing all local state.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
    }

    /// Applies a confirmed creation.
    ///
    /// New tasks are prepended (newest first). If the id is already
    /// present — a push echo arriving after the REST confirmation, or
    /// the reverse — the existing entry is replaced in place so the
    /// collection never holds two tasks with one id.
    pub fn upsert_created(&mut self, task: Task) {
        if let Some(existing) = self.tasks.iter_mut().find(|t| t.id == task.id) {
            *existing = task;
        } else {
            self.tasks.insert(0, task);
        }
    }

    /// Applies an update (including completion changes) by replacing the
    /// task with the same id.
    ///
    /// Returns `false` when the id is absent — a delete raced ahead of
    /// this update — in which case the update is dropped rather than
    /// resurrecting a ghost entry.
    pub fn apply_update(&mut self, task: Task) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                *existing = task;
                true
            }
            None => {
                tracing::debug!(id = %task.id, "dropping update for unknown task");
                false
            }
        }
    }

    /// Removes the task with the given id.
    ///
    /// Removing an absent id is a no-op, so a confirmed delete followed
    /// by a stray push event for the same id cannot fail.
    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        before != self.tasks.len()
    }

    /// Flips the completion flag of a task before any server confirmation.
    ///
    /// Returns the new completion state, or `None` if the id is absent.
    /// The caller owns the follow-up REST call; a failed confirmation is
    /// surfaced there and the flag is not auto-reverted.
    pub fn toggle(&mut self, id: TaskId) -> Option<bool> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        task.completed = !task.completed;
        Some(task.completed)
    }

    /// Returns the task with the given id, if present.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Whether a task with the given id is present.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.get(id).is_some()
    }

    /// Number of tasks held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Clones the full collection in display order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    /// Tasks not yet completed, in display order. Recomputed on every
    /// call; never stored separately.
    #[must_use]
    pub fn incomplete(&self) -> Vec<Task> {
        self.tasks.iter().filter(|t| !t.completed).cloned().collect()
    }

    /// Completed tasks, in display order. Recomputed on every call;
    /// never stored separately.
    #[must_use]
    pub fn completed(&self) -> Vec<Task> {
        self.tasks.iter().filter(|t| t.completed).cloned().collect()
    }
}
