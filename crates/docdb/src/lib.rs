//! Helios Document Repository
//!
//! A generic repository over a managed document database. One process-wide
//! client is bound to one database and collection; typed repositories on
//! top of it store items of any serde type as JSON documents.
//!
//! # Features
//!
//! - **Typed CRUD**: `get_item`, `create_item`, `update_item`, `delete_item`
//!   for any `T: Serialize + DeserializeOwned`
//! - **Predicate queries**: build filters with [`field`] and run them across
//!   every result page with `query_items`
//! - **Self-provisioning**: the database and collection are created on first
//!   start if they do not exist
//! - **Region-aware reads**: reads prefer the application's home region, then
//!   every other readable region of the account
//!
//! # Architecture
//!
//! - [`config`] - Command line and environment configuration
//! - [`error`] - Error types for all operations
//! - [`policy`] - Connection policy and regional endpoint selection
//! - [`query`] - The predicate language
//! - [`types`] - Documents and service resource descriptions
//! - [`client`] - The [`DocumentDbApi`] trait and its REST and in-memory implementations
//! - [`repository`] - [`RepositoryContext`] and [`DocumentRepository`]
//! - [`shared`] - The process-wide context
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_docdb::{InMemoryDocumentClient, RepositoryContext, RepositoryOptions, field};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct TodoItem {
//!     id: String,
//!     name: String,
//!     is_complete: bool,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(InMemoryDocumentClient::new());
//! let context =
//!     RepositoryContext::connect(client, "ToDoList", "Items", RepositoryOptions::default())
//!         .await?;
//! let items = context.repository::<TodoItem>();
//!
//! items
//!     .create_item(&TodoItem {
//!         id: "1".to_string(),
//!         name: "Buy milk".to_string(),
//!         is_complete: false,
//!     })
//!     .await?;
//!
//! let open = items.query_items(field("isComplete").eq(false)).await?;
//! assert_eq!(open.len(), 1);
//! assert!(items.get_item("2").await?.is_none());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod policy;
pub mod query;
pub mod repository;
pub mod shared;
pub mod types;

// Re-export commonly used types at crate root
pub use client::{DocumentDbApi, InMemoryDocumentClient, RestDocumentClient};
pub use config::{ConnectionSettings, RepositoryConfig};
pub use error::{ClientError, ClientResult, ConfigError, RepositoryError, RepositoryResult};
pub use policy::{ConnectionMode, ConnectionPolicy, Protocol};
pub use query::{Predicate, field};
pub use repository::{DocumentRepository, RepositoryContext, RepositoryOptions};
pub use types::Document;

/// Initializes the tracing subscriber for logging.
///
/// This should be called once at application startup. `RUST_LOG` overrides
/// `level` when set.
///
/// # Arguments
///
/// * `level` - The log level (error, warn, info, debug, trace)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("helios_docdb={level},helios_todo={level}"))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
