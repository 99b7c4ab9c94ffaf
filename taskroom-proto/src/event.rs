//! Sync channel wire events.
//!
//! Events are JSON text frames shaped as `{"event": <name>, "data": {...}}`
//! so that a browser client can speak the same protocol. Event names are
//! snake_case; payload keys are camelCase, matching the server's JSON
//! conventions.

use serde::{Deserialize, Serialize};

use crate::task::{ProjectId, Task, TaskId};
use crate::user::UserInfo;

/// Messages sent from the client to the server over the sync channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Subscribe to the push events of one project room.
    ///
    /// The server evicts any prior membership before confirming, so the
    /// client never has to send an explicit leave first.
    #[serde(rename_all = "camelCase")]
    JoinProject {
        /// The project room to join.
        project_id: ProjectId,
    },

    /// Unsubscribe from the current project room.
    LeaveProject,
}

/// Messages pushed from the server to the client over the sync channel.
///
/// Transport lifecycle notifications (connect, disconnect, connect error)
/// are synthesized locally by the connection layer and never appear on
/// the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Confirms room membership. The payload is authoritative: the client
    /// mirrors this id and name rather than what it asked for.
    #[serde(rename_all = "camelCase")]
    JoinedProject {
        /// The project room that was joined.
        project_id: ProjectId,
        /// Display name of the project, as known to the server.
        project_name: String,
    },

    /// Confirms that the client left its room.
    #[serde(rename_all = "camelCase")]
    LeftProject {
        /// The project room that was vacated.
        project_id: ProjectId,
    },

    /// Another session created a task in the joined project.
    #[serde(rename_all = "camelCase")]
    TaskCreated {
        /// The freshly persisted task.
        task: Task,
        /// Display name of the user who created it.
        created_by: String,
    },

    /// Another session updated a task in the joined project.
    #[serde(rename_all = "camelCase")]
    TaskUpdated {
        /// The task in its post-update state.
        task: Task,
        /// Display name of the user who updated it.
        updated_by: String,
    },

    /// Another session deleted a task in the joined project.
    #[serde(rename_all = "camelCase")]
    TaskDeleted {
        /// Id of the deleted task.
        task_id: TaskId,
        /// Title of the deleted task, for notification display.
        task_title: String,
        /// Display name of the user who deleted it.
        deleted_by: String,
    },

    /// A user joined the project room.
    #[serde(rename_all = "camelCase")]
    UserJoinedProject {
        /// The user who joined.
        user: UserInfo,
    },

    /// A user left the project room.
    #[serde(rename_all = "camelCase")]
    UserLeftProject {
        /// The user who left.
        user: UserInfo,
    },

    /// The server reports a protocol-level error. Alters no room or task
    /// state on the client; surfaced for visibility only.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Human-readable error description.
        message: String,
    },
}

/// The event kinds a caller may register a callback for.
///
/// One slot per kind; protocol `error` events are deliberately absent —
/// they feed the session's last-error state instead of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A task was created by another session.
    TaskCreated,
    /// A task was updated by another session.
    TaskUpdated,
    /// A task was deleted by another session.
    TaskDeleted,
    /// A user joined the current room.
    UserJoined,
    /// A user left the current room.
    UserLeft,
}

impl ServerEvent {
    /// Returns the callback slot this event dispatches to, if any.
    ///
    /// Room confirmations and protocol errors return `None`; they are
    /// handled by the session layer itself.
    #[must_use]
    pub const fn callback_kind(&self) -> Option<EventKind> {
        match self {
            Self::TaskCreated { .. } => Some(EventKind::TaskCreated),
            Self::TaskUpdated { .. } => Some(EventKind::TaskUpdated),
            Self::TaskDeleted { .. } => Some(EventKind::TaskDeleted),
            Self::UserJoinedProject { .. } => Some(EventKind::UserJoined),
            Self::UserLeftProject { .. } => Some(EventKind::UserLeft),
            Self::JoinedProject { .. } | Self::LeftProject { .. } | Self::Error { .. } => None,
        }
    }
}
