//! Presence payload types.

use serde::{Deserialize, Serialize};

/// A user as announced by room presence events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Server-assigned user id.
    pub id: u64,
    /// Display name.
    pub username: String,
}
