//! Sample items and in-memory repository contexts.

use std::sync::Arc;

use helios_docdb::{InMemoryDocumentClient, RepositoryContext, RepositoryOptions};
use serde::{Deserialize, Serialize};

pub const DATABASE: &str = "ToDoList";
pub const COLLECTION: &str = "Items";

/// A todo item, stored with camelCase field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
}

impl TodoItem {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            is_complete: false,
        }
    }

    pub fn completed(mut self) -> Self {
        self.is_complete = true;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Options with a fixed query page size.
pub fn options_with_page_size(page_size: i32) -> RepositoryOptions {
    RepositoryOptions {
        max_item_count: page_size,
        ..Default::default()
    }
}

/// An in-memory client and a context connected through it.
pub async fn memory_context(
    options: RepositoryOptions,
) -> (InMemoryDocumentClient, RepositoryContext) {
    let client = InMemoryDocumentClient::new();
    let context = RepositoryContext::connect(Arc::new(client.clone()), DATABASE, COLLECTION, options)
        .await
        .expect("connect in-memory context");
    (client, context)
}

/// Ten items; the even-numbered ones are complete.
pub fn sample_items() -> Vec<TodoItem> {
    (0..10)
        .map(|i| {
            let item = TodoItem::new(&format!("item-{i}"), &format!("Task {i}"));
            if i % 2 == 0 { item.completed() } else { item }
        })
        .collect()
}
