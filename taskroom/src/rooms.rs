//! Project room membership tracking.
//!
//! A session belongs to zero or one project rooms at a time. Membership
//! is populated exclusively from the server's `joined_project`
//! confirmation — never from the locally requested id — and is cleared
//! on leave confirmation, on any disconnect, and on session teardown.

use parking_lot::Mutex;

use taskroom_proto::event::ClientEvent;
use taskroom_proto::task::ProjectId;

/// The room a session currently belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMembership {
    /// Id of the joined project, as confirmed by the server.
    pub project_id: ProjectId,
    /// Display name of the project, delivered with the confirmation.
    pub project_name: String,
}

/// Tracks the at-most-one active room of a session.
#[derive(Debug, Default)]
pub struct RoomSession {
    membership: Mutex<Option<RoomMembership>>,
}

impl RoomSession {
    /// Creates a session with no room joined.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a join request from untrusted textual input.
    ///
    /// The id is coerced to an integer; non-numeric input yields `None`
    /// and no request is made — a local guard, not an error. Joining
    /// while already in another room is permitted: the server evicts the
    /// old membership before confirming the new one.
    #[must_use]
    pub fn join_request(input: &str) -> Option<ClientEvent> {
        match input.trim().parse::<u64>() {
            Ok(id) => Some(ClientEvent::JoinProject {
                project_id: ProjectId::new(id),
            }),
            Err(_) => {
                tracing::debug!(input, "ignoring join request with non-numeric project id");
                None
            }
        }
    }

    /// The current membership, if any.
    #[must_use]
    pub fn current(&self) -> Option<RoomMembership> {
        self.membership.lock().clone()
    }

    /// Whether a room is currently joined.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.membership.lock().is_some()
    }

    /// Mirrors a `joined_project` confirmation. The server payload is
    /// authoritative and silently replaces any prior membership.
    pub fn apply_joined(&self, project_id: ProjectId, project_name: String) {
        let mut membership = self.membership.lock();
        *membership = Some(RoomMembership {
            project_id,
            project_name,
        });
    }

    /// Mirrors a `left_project` confirmation.
    pub fn apply_left(&self) {
        self.clear();
    }

    /// Drops the membership. Called on leave confirmation, disconnect,
    /// and session teardown.
    pub fn clear(&self) {
        let mut membership = self.membership.lock();
        if let Some(room) = membership.take() {
            tracing::debug!(project_id = %room.project_id, "room membership cleared");
        }
    }
}
