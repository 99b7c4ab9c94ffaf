//! Project domain types.

use serde::{Deserialize, Serialize};

use crate::task::ProjectId;

/// A project as persisted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Server-assigned unique identifier.
    pub id: ProjectId,
    /// Human-readable project name.
    pub name: String,
}

/// Client-side payload for creating a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDraft {
    /// Human-readable project name.
    pub name: String,
}
