//! Session registry and room fan-out.
//!
//! Tracks every connected session (WebSocket or polling) with its
//! outbound channel and current room. Membership is exclusive: joining a
//! room evicts the prior one before the confirmation goes out, which is
//! what lets the client treat "join while elsewhere" as a single
//! operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskroom_proto::codec;
use taskroom_proto::event::ServerEvent;
use taskroom_proto::task::ProjectId;
use taskroom_proto::user::UserInfo;

/// What the per-session writer receives.
#[derive(Debug)]
pub enum Outbound {
    /// An encoded event frame to deliver.
    Frame(String),
    /// Instruction to close the connection.
    Close,
}

/// One connected session.
struct SessionEntry {
    user: UserInfo,
    tx: mpsc::UnboundedSender<Outbound>,
    room: Option<ProjectId>,
}

/// Registry of live sessions and their room membership.
#[derive(Default)]
pub struct RoomRegistry {
    sessions: Mutex<HashMap<u64, SessionEntry>>,
    next_session: AtomicU64,
    next_user: AtomicU64,
}

impl RoomRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session for `username`.
    ///
    /// Returns the session id and the receiver its writer should drain.
    pub fn register(&self, username: &str) -> (u64, mpsc::UnboundedReceiver<Outbound>) {
        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let user_id = self.next_user.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let entry = SessionEntry {
            user: UserInfo {
                id: user_id,
                username: username.to_string(),
            },
            tx,
            room: None,
        };
        self.sessions.lock().insert(session_id, entry);
        tracing::debug!(session_id, username, "session registered");
        (session_id, rx)
    }

    /// Removes a session, vacating its room with a presence broadcast.
    pub fn unregister(&self, session_id: u64) {
        let removed = {
            let mut sessions = self.sessions.lock();
            sessions.remove(&session_id)
        };
        if let Some(entry) = removed {
            if let Some(project) = entry.room {
                self.broadcast(
                    project,
                    &ServerEvent::UserLeftProject { user: entry.user },
                );
            }
            tracing::debug!(session_id, "session unregistered");
        }
    }

    /// Moves a session into a project room.
    ///
    /// Any prior membership is evicted first (with a presence broadcast
    /// to the old room), then the session receives its `joined_project`
    /// confirmation and the new room is told about the arrival.
    pub fn join(&self, session_id: u64, project: ProjectId, project_name: String) {
        let (user, old_room) = {
            let mut sessions = self.sessions.lock();
            let Some(entry) = sessions.get_mut(&session_id) else {
                return;
            };
            let old = entry.room.replace(project);
            (entry.user.clone(), old)
        };

        if let Some(old_project) = old_room.filter(|p| *p != project) {
            self.broadcast(
                old_project,
                &ServerEvent::UserLeftProject { user: user.clone() },
            );
        }

        self.send_to(
            session_id,
            &ServerEvent::JoinedProject {
                project_id: project,
                project_name,
            },
        );
        self.broadcast_except(
            project,
            session_id,
            &ServerEvent::UserJoinedProject { user },
        );
    }

    /// Removes a session from its room, confirming with `left_project`.
    pub fn leave(&self, session_id: u64) {
        let left = {
            let mut sessions = self.sessions.lock();
            let Some(entry) = sessions.get_mut(&session_id) else {
                return;
            };
            entry.room.take().map(|project| (project, entry.user.clone()))
        };

        let Some((project, user)) = left else {
            return;
        };
        self.send_to(
            session_id,
            &ServerEvent::LeftProject {
                project_id: project,
            },
        );
        self.broadcast(project, &ServerEvent::UserLeftProject { user });
    }

    /// Sends an event to one session.
    pub fn send_to(&self, session_id: u64, event: &ServerEvent) {
        let Ok(frame) = codec::encode_server(event) else {
            tracing::error!(?event, "failed to encode event");
            return;
        };
        let sessions = self.sessions.lock();
        if let Some(entry) = sessions.get(&session_id) {
            let _ = entry.tx.send(Outbound::Frame(frame));
        }
    }

    /// Sends an event to every member of a room.
    pub fn broadcast(&self, project: ProjectId, event: &ServerEvent) {
        self.broadcast_inner(project, None, event);
    }

    /// Sends an event to every member of a room except one session.
    pub fn broadcast_except(&self, project: ProjectId, except: u64, event: &ServerEvent) {
        self.broadcast_inner(project, Some(except), event);
    }

    fn broadcast_inner(&self, project: ProjectId, except: Option<u64>, event: &ServerEvent) {
        let Ok(frame) = codec::encode_server(event) else {
            tracing::error!(?event, "failed to encode event");
            return;
        };
        let sessions = self.sessions.lock();
        for (id, entry) in sessions.iter() {
            if entry.room == Some(project) && Some(*id) != except {
                let _ = entry.tx.send(Outbound::Frame(frame.clone()));
            }
        }
    }

    /// Queues a close instruction for every session.
    pub fn close_all(&self) {
        let sessions = self.sessions.lock();
        for entry in sessions.values() {
            let _ = entry.tx.send(Outbound::Close);
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Usernames of all live sessions.
    #[must_use]
    pub fn connected_usernames(&self) -> Vec<String> {
        self.sessions
            .lock()
            .values()
            .map(|e| e.user.username.clone())
            .collect()
    }

    /// Usernames of the sessions currently in a room.
    #[must_use]
    pub fn room_members(&self, project: ProjectId) -> Vec<String> {
        self.sessions
            .lock()
            .values()
            .filter(|e| e.room == Some(project))
            .map(|e| e.user.username.clone())
            .collect()
    }

    /// Whether a session is currently registered.
    #[must_use]
    pub fn is_registered(&self, session_id: u64) -> bool {
        self.sessions.lock().contains_key(&session_id)
    }
}
