//! Session coordination: one cohesive API over connection, rooms,
//! dispatch, reconciliation, and the REST collaborator.
//!
//! A [`SessionCoordinator`] owns at most one [`ConnectionManager`] per
//! active credential, plus the pump task that applies its signals to the
//! session state. Multiple coordinators share nothing; consistency
//! across them exists only through the server's push channel.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskroom_proto::event::{ClientEvent, EventKind, ServerEvent};
use taskroom_proto::project::{Project, ProjectDraft};
use taskroom_proto::task::{ProjectId, Task, TaskDraft, TaskId};

use crate::config::ClientConfig;
use crate::connection::{ConnShared, ConnectionManager, ConnectionState, Signal};
use crate::dispatch::EventDispatcher;
use crate::rest::{RestClient, RestError};
use crate::rooms::{RoomMembership, RoomSession};
use crate::tasks::TaskList;

/// Everything tied to one credential's lifetime.
struct ActiveSession {
    /// The supervised sync connection and its signal pump, when a sync
    /// server is configured.
    connection: Option<(Arc<ConnectionManager>, tokio::task::JoinHandle<()>)>,
    /// REST collaborator client, when a REST base URL is configured.
    rest: Option<Arc<RestClient>>,
}

/// The UI-facing composition root of the sync client.
///
/// Created once per logical user session. Changing the credential tears
/// the previous connection down completely before a new one opens;
/// in-flight events of the old connection are discarded.
pub struct SessionCoordinator {
    config: ClientConfig,
    dispatcher: Arc<EventDispatcher>,
    tasks: Arc<Mutex<TaskList>>,
    room: Arc<RoomSession>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionCoordinator {
    /// Creates a coordinator with no active session.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            dispatcher: Arc::new(EventDispatcher::new()),
            tasks: Arc::new(Mutex::new(TaskList::new())),
            room: Arc::new(RoomSession::new()),
            active: Mutex::new(None),
        }
    }

    /// Installs a new credential, replacing any current session.
    ///
    /// The old connection is fully closed before the new one opens. An
    /// empty or absent token leaves the coordinator logged out; no
    /// connection is attempted.
    pub fn set_token(&self, token: Option<&str>) {
        self.teardown_current();

        let Some(token) = token else {
            return;
        };
        if token.trim().is_empty() {
            return;
        }

        let connection = self.config.to_connection_config().and_then(|conn_config| {
            ConnectionManager::connect(token, conn_config).map(|(manager, signal_rx)| {
                let manager = Arc::new(manager);
                let pump = tokio::spawn(pump_loop(
                    signal_rx,
                    manager.shared_handle(),
                    Arc::clone(&self.dispatcher),
                    Arc::clone(&self.tasks),
                    Arc::clone(&self.room),
                ));
                (manager, pump)
            })
        });

        let rest = self.config.rest_url.as_ref().and_then(|url| {
            match RestClient::new(url, token) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!(err = %e, "failed to build REST client");
                    None
                }
            }
        });

        *self.active.lock() = Some(ActiveSession { connection, rest });
    }

    /// Ends the session: closes the connection and clears room state.
    pub fn logout(&self) {
        self.set_token(None);
    }

    /// Requests membership in a project room.
    ///
    /// The id is coerced to an integer; non-numeric input is a silent
    /// no-op. Only effective while connected. Membership changes when
    /// the server confirms, not here.
    pub async fn join_project(&self, project: &str) {
        let Some(event) = RoomSession::join_request(project) else {
            return;
        };
        if let Some(manager) = self.manager() {
            manager.send(event).await;
        }
    }

    /// Leaves the current project room, if any.
    ///
    /// A no-op when no room is joined or the connection is down.
    pub async fn leave_project(&self) {
        if !self.room.is_joined() {
            return;
        }
        if let Some(manager) = self.manager() {
            manager.send(ClientEvent::LeaveProject).await;
        }
    }

    /// Registers the callback for pushed task creations, replacing any
    /// previous one.
    pub fn on_task_created<F>(&self, callback: F)
    where
        F: FnMut(&ServerEvent) + Send + 'static,
    {
        self.dispatcher.set_handler(EventKind::TaskCreated, callback);
    }

    /// Registers the callback for pushed task updates, replacing any
    /// previous one.
    pub fn on_task_updated<F>(&self, callback: F)
    where
        F: FnMut(&ServerEvent) + Send + 'static,
    {
        self.dispatcher.set_handler(EventKind::TaskUpdated, callback);
    }

    /// Registers the callback for pushed task deletions, replacing any
    /// previous one.
    pub fn on_task_deleted<F>(&self, callback: F)
    where
        F: FnMut(&ServerEvent) + Send + 'static,
    {
        self.dispatcher.set_handler(EventKind::TaskDeleted, callback);
    }

    /// Registers the callback for room presence joins, replacing any
    /// previous one.
    pub fn on_user_joined<F>(&self, callback: F)
    where
        F: FnMut(&ServerEvent) + Send + 'static,
    {
        self.dispatcher.set_handler(EventKind::UserJoined, callback);
    }

    /// Registers the callback for room presence departures, replacing
    /// any previous one.
    pub fn on_user_left<F>(&self, callback: F)
    where
        F: FnMut(&ServerEvent) + Send + 'static,
    {
        self.dispatcher.set_handler(EventKind::UserLeft, callback);
    }

    /// Current connection state; `Disconnected` when logged out.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.manager()
            .map_or(ConnectionState::Disconnected, |m| m.state())
    }

    /// The room this session currently belongs to.
    #[must_use]
    pub fn current_room(&self) -> Option<RoomMembership> {
        self.room.current()
    }

    /// Last connection or protocol error of the active session.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.manager().and_then(|m| m.last_error())
    }

    /// Snapshot of the full task collection, newest first.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().snapshot()
    }

    /// Tasks not yet completed (pure filter over the collection).
    #[must_use]
    pub fn incomplete(&self) -> Vec<Task> {
        self.tasks.lock().incomplete()
    }

    /// Completed tasks (pure filter over the collection).
    #[must_use]
    pub fn completed(&self) -> Vec<Task> {
        self.tasks.lock().completed()
    }

    /// Fetches the task collection from the REST API and installs it.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] on failure; local state is left untouched.
    pub async fn load_tasks(&self, project: Option<ProjectId>) -> Result<Vec<Task>, RestError> {
        let rest = self.rest()?;
        let tasks = rest.list_tasks(project).await?;
        self.tasks.lock().replace_all(tasks.clone());
        Ok(tasks)
    }

    /// Creates a task through the REST API; on confirmation the task is
    /// prepended to the local collection.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`]; nothing is applied locally on failure.
    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task, RestError> {
        let rest = self.rest()?;
        let task = rest.create_task(draft).await?;
        self.tasks.lock().upsert_created(task.clone());
        Ok(task)
    }

    /// Updates a task through the REST API; on confirmation the local
    /// entry is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`]; nothing is applied locally on failure.
    pub async fn update_task(&self, id: TaskId, draft: &TaskDraft) -> Result<Task, RestError> {
        let rest = self.rest()?;
        let task = rest.update_task(id, draft).await?;
        self.tasks.lock().apply_update(task.clone());
        Ok(task)
    }

    /// Optimistically flips a task's completion flag, then confirms it
    /// with the REST API.
    ///
    /// The local flip happens before the network call for perceived
    /// responsiveness. A failed confirmation is returned to the caller
    /// and the flag is left flipped — surfacing the error is the
    /// caller's responsibility; there is no auto-revert.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::NotFound`] when the id is not held locally,
    /// or the REST failure.
    pub async fn toggle_task(&self, id: TaskId) -> Result<bool, RestError> {
        let rest = self.rest()?;
        let desired = self.tasks.lock().toggle(id).ok_or(RestError::NotFound)?;
        let task = rest.set_completed(id, desired).await?;
        self.tasks.lock().apply_update(task);
        Ok(desired)
    }

    /// Deletes a task through the REST API; on confirmation it is removed
    /// locally.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`]; nothing is removed locally on failure.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), RestError> {
        let rest = self.rest()?;
        rest.delete_task(id).await?;
        self.tasks.lock().remove(id);
        Ok(())
    }

    /// Fetches the projects visible to this session.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] on failure.
    pub async fn list_projects(&self) -> Result<Vec<Project>, RestError> {
        self.rest()?.list_projects().await
    }

    /// Creates a project through the REST API.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] on failure.
    pub async fn create_project(&self, draft: &ProjectDraft) -> Result<Project, RestError> {
        self.rest()?.create_project(draft).await
    }

    fn manager(&self) -> Option<Arc<ConnectionManager>> {
        self.active
            .lock()
            .as_ref()
            .and_then(|session| session.connection.as_ref().map(|(m, _)| Arc::clone(m)))
    }

    fn rest(&self) -> Result<Arc<RestClient>, RestError> {
        self.active
            .lock()
            .as_ref()
            .and_then(|session| session.rest.clone())
            .ok_or(RestError::NoSession)
    }

    fn teardown_current(&self) {
        let previous = self.active.lock().take();
        if let Some(session) = previous {
            if let Some((manager, pump)) = session.connection {
                // Stop the pump first so in-flight events are discarded,
                // then close the connection.
                pump.abort();
                manager.teardown();
            }
        }
        self.room.clear();
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.teardown_current();
    }
}

/// Applies connection signals to session state, then notifies callbacks.
async fn pump_loop(
    mut signal_rx: mpsc::Receiver<Signal>,
    shared: Arc<ConnShared>,
    dispatcher: Arc<EventDispatcher>,
    tasks: Arc<Mutex<TaskList>>,
    room: Arc<RoomSession>,
) {
    while let Some(signal) = signal_rx.recv().await {
        match signal {
            Signal::Up { kind } => {
                tracing::debug!(%kind, "session connected");
            }
            Signal::Down { reason } => {
                // Room context does not survive a transport drop.
                tracing::debug!(reason = %reason, "session disconnected");
                room.clear();
            }
            Signal::ConnectError { message, attempt } => {
                tracing::debug!(attempt, message = %message, "connect attempt failed");
            }
            Signal::GaveUp => {
                tracing::warn!("reconnection budget exhausted");
            }
            Signal::Push(event) => {
                apply_push(&event, &shared, &tasks, &room);
                dispatcher.dispatch(&event);
            }
        }
    }
}

/// Reconciles one pushed event into session state. Events are applied in
/// arrival order; a remote mutation arriving after a local one for the
/// same id overwrites it unconditionally.
fn apply_push(
    event: &ServerEvent,
    shared: &ConnShared,
    tasks: &Mutex<TaskList>,
    room: &RoomSession,
) {
    match event {
        ServerEvent::JoinedProject {
            project_id,
            project_name,
        } => {
            room.apply_joined(*project_id, project_name.clone());
            tracing::info!(project_id = %project_id, project_name = %project_name, "joined project room");
        }
        ServerEvent::LeftProject { project_id } => {
            tracing::info!(project_id = %project_id, "left project room");
            room.apply_left();
        }
        ServerEvent::TaskCreated { task, .. } => {
            tasks.lock().upsert_created(task.clone());
        }
        ServerEvent::TaskUpdated { task, .. } => {
            tasks.lock().apply_update(task.clone());
        }
        ServerEvent::TaskDeleted { task_id, .. } => {
            tasks.lock().remove(*task_id);
        }
        ServerEvent::UserJoinedProject { .. } | ServerEvent::UserLeftProject { .. } => {}
        ServerEvent::Error { message } => {
            // Protocol errors touch neither room nor task state.
            shared.record_error(message.clone());
        }
    }
}
