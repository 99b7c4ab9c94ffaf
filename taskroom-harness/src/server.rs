//! The harness server: WebSocket endpoint, long-polling endpoints, and
//! the REST stub, plus the in-process [`ServerHandle`] tests drive.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskroom_proto::api::ApiResponse;
use taskroom_proto::codec;
use taskroom_proto::event::{ClientEvent, ServerEvent};
use taskroom_proto::project::{Project, ProjectDraft};
use taskroom_proto::task::{ProjectId, Task, TaskDraft, TaskId};

use crate::rest::{ProjectDeleteError, TaskStore, TaskUpdateBody};
use crate::rooms::{Outbound, RoomRegistry};

/// Behavior knobs for the harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Serve the WebSocket endpoint. Disabled to force clients onto the
    /// polling fallback.
    pub websocket_enabled: bool,
    /// How long a poll request is held open waiting for a frame.
    pub poll_wait: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            websocket_enabled: true,
            poll_wait: Duration::from_secs(2),
        }
    }
}

/// Shared server state.
pub struct AppState {
    /// Live session registry and room fan-out.
    pub registry: RoomRegistry,
    /// REST persistence stub.
    pub store: TaskStore,
    config: HarnessConfig,
    /// Receivers for polling sessions, drained by `GET /poll/{sid}`.
    poll_receivers: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Outbound>>>>>,
}

/// In-process control surface for tests.
#[derive(Clone)]
pub struct ServerHandle {
    state: Arc<AppState>,
}

impl ServerHandle {
    /// Pushes an event to every session in a project room.
    pub fn push_to_room(&self, project: ProjectId, event: &ServerEvent) {
        self.state.registry.broadcast(project, event);
    }

    /// Sends a close instruction to every connected session.
    pub fn close_all_connections(&self) {
        self.state.registry.close_all();
    }

    /// Number of live sessions.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.state.registry.connected_count()
    }

    /// Usernames of all live sessions.
    #[must_use]
    pub fn connected_usernames(&self) -> Vec<String> {
        self.state.registry.connected_usernames()
    }

    /// Usernames of the sessions currently in a room.
    #[must_use]
    pub fn room_members(&self, project: ProjectId) -> Vec<String> {
        self.state.registry.room_members(project)
    }

    /// Registers a project in the directory, returning its id.
    #[must_use]
    pub fn seed_project(&self, name: &str) -> ProjectId {
        self.state.store.add_project(name).id
    }

    /// Number of tasks held by the REST stub.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.state.store.task_count()
    }
}

/// Starts the harness server on the given address.
///
/// Binds (use `127.0.0.1:0` for an OS-assigned port) and returns the
/// bound address, the control handle, and the serve task's join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind.
pub async fn start_server(
    addr: &str,
    config: HarnessConfig,
) -> Result<
    (SocketAddr, ServerHandle, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let state = Arc::new(AppState {
        registry: RoomRegistry::new(),
        store: TaskStore::new(),
        config,
        poll_receivers: Mutex::new(HashMap::new()),
    });

    let app = axum::Router::new()
        .route("/ws", get(ws_handler))
        .route("/poll/session", post(poll_create))
        .route("/poll/{sid}", get(poll_drain))
        .route("/poll/{sid}/send", post(poll_send))
        .route("/api/tasks", get(tasks_list).post(tasks_create))
        .route("/api/tasks/{id}", put(tasks_update).delete(tasks_delete))
        .route("/api/projects", get(projects_list).post(projects_create))
        .route("/api/projects/{id}", delete(projects_delete))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let join = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "harness server error");
        }
    });

    Ok((bound_addr, ServerHandle { state }, join))
}

// ---------------------------------------------------------------------------
// Sync channel: WebSocket
// ---------------------------------------------------------------------------

/// Extracts a non-empty token from the query string.
fn query_token(params: &HashMap<String, String>) -> Option<String> {
    params
        .get("token")
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Upgrades to a WebSocket after checking the credential.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.config.websocket_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(token) = query_token(&params) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    // The harness trusts any non-empty token and uses it as the username.
    ws.on_upgrade(move |socket| handle_socket(state, socket, token))
}

/// Per-connection socket loop: writer drains the session channel, reader
/// handles client frames. Disconnection unregisters the session, which
/// vacates its room.
async fn handle_socket(state: Arc<AppState>, socket: WebSocket, username: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (session_id, mut rx) = state.registry.register(&username);

    let mut write_task = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Frame(frame) => {
                    if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_client_frame(&reader_state, session_id, text.as_str());
                }
                Message::Close(_) => break,
                _ => {
                    // Ignore binary, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    state.registry.unregister(session_id);
    tracing::debug!(session_id, "socket closed");
}

/// Applies one client frame to the session.
fn handle_client_frame(state: &Arc<AppState>, session_id: u64, frame: &str) {
    match codec::decode_client(frame) {
        Ok(ClientEvent::JoinProject { project_id }) => {
            match state.store.project_name(project_id) {
                Some(name) => state.registry.join(session_id, project_id, name),
                None => state.registry.send_to(
                    session_id,
                    &ServerEvent::Error {
                        message: format!("project {project_id} does not exist"),
                    },
                ),
            }
        }
        Ok(ClientEvent::LeaveProject) => state.registry.leave(session_id),
        Err(e) => {
            // Malformed frame: log and skip, don't disconnect.
            tracing::warn!(session_id, err = %e, "malformed client frame");
        }
    }
}

// ---------------------------------------------------------------------------
// Sync channel: long-polling fallback
// ---------------------------------------------------------------------------

/// Creates a polling session after checking the credential.
async fn poll_create(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(token) = query_token(&params) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let (session_id, rx) = state.registry.register(&token);
    state
        .poll_receivers
        .lock()
        .insert(session_id, Arc::new(tokio::sync::Mutex::new(rx)));

    Json(serde_json::json!({ "session": session_id.to_string() })).into_response()
}

/// Long-poll: returns the buffered frames, holding the request open for
/// up to the configured wait when none are pending. A gone session
/// answers 410 so the client stops polling.
async fn poll_drain(State(state): State<Arc<AppState>>, Path(sid): Path<u64>) -> Response {
    let receiver = state.poll_receivers.lock().get(&sid).cloned();
    let Some(receiver) = receiver else {
        return StatusCode::GONE.into_response();
    };

    let mut frames = Vec::new();
    let mut closed = false;
    {
        let mut rx = receiver.lock().await;
        loop {
            match rx.try_recv() {
                Ok(Outbound::Frame(frame)) => frames.push(frame),
                Ok(Outbound::Close) | Err(mpsc::error::TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
            }
        }
        if frames.is_empty() && !closed {
            match tokio::time::timeout(state.config.poll_wait, rx.recv()).await {
                Ok(Some(Outbound::Frame(frame))) => frames.push(frame),
                Ok(Some(Outbound::Close)) | Ok(None) => closed = true,
                Err(_) => {
                    // Hold expired with nothing to deliver.
                }
            }
        }
    }

    if closed {
        state.poll_receivers.lock().remove(&sid);
        state.registry.unregister(sid);
        if frames.is_empty() {
            return StatusCode::GONE.into_response();
        }
    }

    Json(frames).into_response()
}

/// Accepts one outbound client frame for a polling session.
async fn poll_send(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<u64>,
    body: String,
) -> Response {
    if !state.registry.is_registered(sid) {
        return StatusCode::GONE.into_response();
    }
    handle_client_frame(&state, sid, &body);
    StatusCode::NO_CONTENT.into_response()
}

// ---------------------------------------------------------------------------
// REST stub
// ---------------------------------------------------------------------------

/// Extracts the bearer token, used as the acting username.
fn bearer_username(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// 401 response in the standard envelope.
fn unauthorized<T>() -> (StatusCode, Json<ApiResponse<T>>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::err("authentication required")),
    )
}

async fn tasks_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<ApiResponse<Vec<Task>>>) {
    if bearer_username(&headers).is_none() {
        return unauthorized();
    }
    let project = params
        .get("projectId")
        .and_then(|p| p.parse::<u64>().ok())
        .map(ProjectId::new);
    (
        StatusCode::OK,
        Json(ApiResponse::ok(state.store.list_tasks(project))),
    )
}

async fn tasks_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<TaskDraft>,
) -> (StatusCode, Json<ApiResponse<Task>>) {
    let Some(username) = bearer_username(&headers) else {
        return unauthorized();
    };
    let task = state.store.create_task(&draft);
    if let Some(project) = task.project_id {
        state.registry.broadcast(
            project,
            &ServerEvent::TaskCreated {
                task: task.clone(),
                created_by: username,
            },
        );
    }
    (StatusCode::CREATED, Json(ApiResponse::ok(task)))
}

async fn tasks_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(update): Json<TaskUpdateBody>,
) -> (StatusCode, Json<ApiResponse<Task>>) {
    let Some(username) = bearer_username(&headers) else {
        return unauthorized();
    };
    match state.store.update_task(TaskId::new(id), &update) {
        Some(task) => {
            if let Some(project) = task.project_id {
                state.registry.broadcast(
                    project,
                    &ServerEvent::TaskUpdated {
                        task: task.clone(),
                        updated_by: username,
                    },
                );
            }
            (StatusCode::OK, Json(ApiResponse::ok(task)))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err("task not found")),
        ),
    }
}

async fn tasks_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> (StatusCode, Json<ApiResponse<serde_json::Value>>) {
    let Some(username) = bearer_username(&headers) else {
        return unauthorized();
    };
    match state.store.delete_task(TaskId::new(id)) {
        Some(task) => {
            if let Some(project) = task.project_id {
                state.registry.broadcast(
                    project,
                    &ServerEvent::TaskDeleted {
                        task_id: task.id,
                        task_title: task.title.clone(),
                        deleted_by: username,
                    },
                );
            }
            (
                StatusCode::OK,
                Json(ApiResponse::ok(serde_json::json!({ "id": task.id }))),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err("task not found")),
        ),
    }
}

async fn projects_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<ApiResponse<Vec<Project>>>) {
    if bearer_username(&headers).is_none() {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(ApiResponse::ok(state.store.list_projects())),
    )
}

async fn projects_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<ProjectDraft>,
) -> (StatusCode, Json<ApiResponse<Project>>) {
    if bearer_username(&headers).is_none() {
        return unauthorized();
    }
    let project = state.store.add_project(&draft.name);
    (StatusCode::CREATED, Json(ApiResponse::ok(project)))
}

async fn projects_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> (StatusCode, Json<ApiResponse<serde_json::Value>>) {
    if bearer_username(&headers).is_none() {
        return unauthorized();
    }
    match state.store.delete_project(ProjectId::new(id)) {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(serde_json::json!({ "id": id }))),
        ),
        Err(ProjectDeleteError::Referenced) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::err("project still has tasks")),
        ),
        Err(ProjectDeleteError::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err("project not found")),
        ),
    }
}
