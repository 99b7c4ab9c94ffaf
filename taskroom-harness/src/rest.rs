//! In-memory task and project store backing the REST stub.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;

use taskroom_proto::project::Project;
use taskroom_proto::task::{ProjectId, Task, TaskDraft, TaskId};

/// Partial update body accepted by `PUT /api/tasks/{id}`.
///
/// Absent fields are left untouched, which is what lets the client send
/// a completion-only update.
#[derive(Debug, Default, Deserialize)]
pub struct TaskUpdateBody {
    /// New title, if changing.
    pub title: Option<String>,
    /// New description, if changing.
    pub description: Option<String>,
    /// New due date, if changing.
    pub due_date: Option<chrono::NaiveDate>,
    /// New completion flag, if changing.
    pub completed: Option<bool>,
    /// New project scope, if changing.
    pub project_id: Option<ProjectId>,
}

/// Why a project delete was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum ProjectDeleteError {
    /// No project with the given id.
    NotFound,
    /// Tasks still reference the project.
    Referenced,
}

/// In-memory persistence stub with server-assigned sequential ids.
#[derive(Default)]
pub struct TaskStore {
    tasks: Mutex<Vec<Task>>,
    projects: Mutex<Vec<Project>>,
    next_task: AtomicU64,
    next_project: AtomicU64,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists a draft, assigning the next task id.
    pub fn create_task(&self, draft: &TaskDraft) -> Task {
        let id = TaskId::new(self.next_task.fetch_add(1, Ordering::Relaxed) + 1);
        let task = Task {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            due_date: draft.due_date,
            completed: draft.completed,
            project_id: draft.project_id,
        };
        self.tasks.lock().push(task.clone());
        task
    }

    /// All tasks, optionally filtered to one project, newest first.
    #[must_use]
    pub fn list_tasks(&self, project: Option<ProjectId>) -> Vec<Task> {
        let tasks = self.tasks.lock();
        let mut result: Vec<Task> = tasks
            .iter()
            .filter(|t| project.is_none() || t.project_id == project)
            .cloned()
            .collect();
        result.reverse();
        result
    }

    /// Applies a partial update, returning the post-update task.
    #[must_use]
    pub fn update_task(&self, id: TaskId, update: &TaskUpdateBody) -> Option<Task> {
        let mut tasks = self.tasks.lock();
        let task = tasks.iter_mut().find(|t| t.id == id)?;
        if let Some(title) = &update.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &update.description {
            task.description.clone_from(description);
        }
        if let Some(due_date) = update.due_date {
            task.due_date = due_date;
        }
        if let Some(completed) = update.completed {
            task.completed = completed;
        }
        if let Some(project_id) = update.project_id {
            task.project_id = Some(project_id);
        }
        Some(task.clone())
    }

    /// Removes a task, returning it for deletion notifications.
    #[must_use]
    pub fn delete_task(&self, id: TaskId) -> Option<Task> {
        let mut tasks = self.tasks.lock();
        let index = tasks.iter().position(|t| t.id == id)?;
        Some(tasks.remove(index))
    }

    /// Number of stored tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Adds a project with the next project id.
    pub fn add_project(&self, name: &str) -> Project {
        let id = ProjectId::new(self.next_project.fetch_add(1, Ordering::Relaxed) + 1);
        let project = Project {
            id,
            name: name.to_string(),
        };
        self.projects.lock().push(project.clone());
        project
    }

    /// All projects in creation order.
    #[must_use]
    pub fn list_projects(&self) -> Vec<Project> {
        self.projects.lock().clone()
    }

    /// Display name of a project, if it exists.
    #[must_use]
    pub fn project_name(&self, id: ProjectId) -> Option<String> {
        self.projects
            .lock()
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.clone())
    }

    /// Removes a project unless tasks still reference it.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectDeleteError::Referenced`] when a task is scoped to
    /// the project, [`ProjectDeleteError::NotFound`] when it is unknown.
    pub fn delete_project(&self, id: ProjectId) -> Result<(), ProjectDeleteError> {
        if self.tasks.lock().iter().any(|t| t.project_id == Some(id)) {
            return Err(ProjectDeleteError::Referenced);
        }
        let mut projects = self.projects.lock();
        let index = projects
            .iter()
            .position(|p| p.id == id)
            .ok_or(ProjectDeleteError::NotFound)?;
        projects.remove(index);
        Ok(())
    }
}
