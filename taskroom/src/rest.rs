//! REST collaborator client.
//!
//! The task and project resources are persisted by an external REST API;
//! this client consumes it. Every endpoint wraps its payload in the
//! `{success, data, error}` envelope. HTTP 404 and 409 map to dedicated
//! errors — both mean "do not apply the mutation" — and mutating calls
//! are never retried here; retry is a user-initiated action.

use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;

use taskroom_proto::api::ApiResponse;
use taskroom_proto::project::{Project, ProjectDraft};
use taskroom_proto::task::{ProjectId, Task, TaskDraft, TaskId, TaskValidationError};

/// Errors surfaced by REST operations.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// No authenticated session; no REST client is available.
    #[error("no active session")]
    NoSession,

    /// The referenced resource does not exist (HTTP 404).
    #[error("resource not found")]
    NotFound,

    /// The request conflicts with existing state (HTTP 409), e.g. a
    /// referenced-record delete.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The server declined the request (envelope `success: false` or an
    /// unexpected status).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The payload failed local validation; no network call was made.
    #[error("invalid task: {0}")]
    Validation(#[from] TaskValidationError),

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not match the expected envelope.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Completion-only partial update body.
#[derive(Debug, Serialize)]
struct CompletionUpdate {
    completed: bool,
}

/// Client for the external task/project REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    base: String,
    token: String,
    http: reqwest::Client,
}

impl RestClient {
    /// Creates a client for the API at `base_url`, authenticating every
    /// request with `token` as a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: &str) -> Result<Self, RestError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    /// Fetches all tasks visible to the session, optionally scoped to one
    /// project.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] on HTTP failure or a rejecting envelope.
    pub async fn list_tasks(&self, project: Option<ProjectId>) -> Result<Vec<Task>, RestError> {
        let mut request = self.http.get(format!("{}/api/tasks", self.base));
        if let Some(project_id) = project {
            request = request.query(&[("projectId", project_id.get())]);
        }
        let response = request.bearer_auth(&self.token).send().await?;
        handle(response).await
    }

    /// Creates a task after validating the draft locally.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Validation`] without any network call when
    /// the draft is malformed, otherwise the usual REST errors.
    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task, RestError> {
        draft.validate(Local::now().date_naive())?;
        let response = self
            .http
            .post(format!("{}/api/tasks", self.base))
            .bearer_auth(&self.token)
            .json(draft)
            .send()
            .await?;
        handle(response).await
    }

    /// Replaces a task's editable fields.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::NotFound`] if the task no longer exists.
    pub async fn update_task(&self, id: TaskId, draft: &TaskDraft) -> Result<Task, RestError> {
        let response = self
            .http
            .put(format!("{}/api/tasks/{id}", self.base))
            .bearer_auth(&self.token)
            .json(draft)
            .send()
            .await?;
        handle(response).await
    }

    /// Sets only the completion flag of a task.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::NotFound`] if the task no longer exists.
    pub async fn set_completed(&self, id: TaskId, completed: bool) -> Result<Task, RestError> {
        let response = self
            .http
            .put(format!("{}/api/tasks/{id}", self.base))
            .bearer_auth(&self.token)
            .json(&CompletionUpdate { completed })
            .send()
            .await?;
        handle(response).await
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::NotFound`] if the task no longer exists.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), RestError> {
        let response = self
            .http
            .delete(format!("{}/api/tasks/{id}", self.base))
            .bearer_auth(&self.token)
            .send()
            .await?;
        handle_empty(response).await
    }

    /// Fetches all projects visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] on HTTP failure or a rejecting envelope.
    pub async fn list_projects(&self) -> Result<Vec<Project>, RestError> {
        let response = self
            .http
            .get(format!("{}/api/projects", self.base))
            .bearer_auth(&self.token)
            .send()
            .await?;
        handle(response).await
    }

    /// Creates a project.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] on HTTP failure or a rejecting envelope.
    pub async fn create_project(&self, draft: &ProjectDraft) -> Result<Project, RestError> {
        let response = self
            .http
            .post(format!("{}/api/projects", self.base))
            .bearer_auth(&self.token)
            .json(draft)
            .send()
            .await?;
        handle(response).await
    }

    /// Deletes a project.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Conflict`] when tasks still reference the
    /// project, [`RestError::NotFound`] when it does not exist.
    pub async fn delete_project(&self, id: ProjectId) -> Result<(), RestError> {
        let response = self
            .http
            .delete(format!("{}/api/projects/{id}", self.base))
            .bearer_auth(&self.token)
            .send()
            .await?;
        handle_empty(response).await
    }
}

/// Unwraps a payload-carrying envelope, applying the status mapping.
async fn handle<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RestError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(RestError::NotFound);
    }
    if status == reqwest::StatusCode::CONFLICT {
        return Err(RestError::Conflict(envelope_error(response, status).await));
    }

    let envelope: ApiResponse<T> = response
        .json()
        .await
        .map_err(|e| RestError::Decode(e.to_string()))?;

    if envelope.success {
        envelope
            .data
            .ok_or_else(|| RestError::Decode("success envelope without data".to_string()))
    } else {
        Err(RestError::Rejected(
            envelope.error.unwrap_or_else(|| status.to_string()),
        ))
    }
}

/// Unwraps an envelope whose payload, if any, is irrelevant.
async fn handle_empty(response: reqwest::Response) -> Result<(), RestError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(RestError::NotFound);
    }
    if status == reqwest::StatusCode::CONFLICT {
        return Err(RestError::Conflict(envelope_error(response, status).await));
    }

    let envelope: ApiResponse<serde_json::Value> = response
        .json()
        .await
        .map_err(|e| RestError::Decode(e.to_string()))?;

    if envelope.success {
        Ok(())
    } else {
        Err(RestError::Rejected(
            envelope.error.unwrap_or_else(|| status.to_string()),
        ))
    }
}

/// Best-effort extraction of the envelope error message.
async fn envelope_error(response: reqwest::Response, status: reqwest::StatusCode) -> String {
    match response.json::<ApiResponse<serde_json::Value>>().await {
        Ok(envelope) => envelope.error.unwrap_or_else(|| status.to_string()),
        Err(_) => status.to_string(),
    }
}
