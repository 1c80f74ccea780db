//! The todo item stored in the repository.

use serde::{Deserialize, Serialize};

/// A todo list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    /// Document id; assigned by the repository when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
}

impl TodoItem {
    /// A new, incomplete item without an id.
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            description,
            is_complete: false,
        }
    }

    /// Applies the given changes, leaving `None` fields untouched.
    pub fn apply(&mut self, name: Option<String>, description: Option<String>) {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = description {
            self.description = Some(description);
        }
    }
}
