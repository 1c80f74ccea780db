//! Todo subcommands.

use anyhow::{Context, bail};
use clap::Subcommand;
use helios_docdb::{DocumentRepository, Predicate, RepositoryContext, field};
use serde_json::{Value, json};
use tracing::info;

use crate::item::TodoItem;

/// Todo list operations.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create the database and collection if needed and show where they live.
    Init,

    /// List items; only incomplete ones unless --all is given.
    List {
        /// Include completed items.
        #[arg(long)]
        all: bool,
    },

    /// Show one item.
    Get {
        /// Item id.
        id: String,
    },

    /// Add a new item.
    Add {
        /// Item name.
        #[arg(long)]
        name: String,

        /// Optional description.
        #[arg(long)]
        description: Option<String>,
    },

    /// Mark an item as complete.
    Complete {
        /// Item id.
        id: String,
    },

    /// Change an item's name or description.
    Update {
        /// Item id.
        id: String,

        /// New name.
        #[arg(long)]
        name: Option<String>,

        /// New description.
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete an item.
    Delete {
        /// Item id.
        id: String,
    },

    /// Show the hosts serving reads and writes.
    Endpoints,
}

/// Runs `command` and returns its JSON output.
pub async fn run(command: Command, context: &RepositoryContext) -> anyhow::Result<Value> {
    let items = context.repository::<TodoItem>();

    match command {
        Command::Init => Ok(json!({
            "database": context.database(),
            "collection": context.collection(),
            "readEndpoint": items.read_endpoint(),
            "writeEndpoint": items.write_endpoint(),
        })),
        Command::List { all } => {
            let filter = if all {
                Predicate::all()
            } else {
                field("isComplete").eq(false)
            };
            let found = items.query_items(filter).await?;
            Ok(serde_json::to_value(found)?)
        }
        Command::Get { id } => Ok(serde_json::to_value(existing(&items, &id).await?)?),
        Command::Add { name, description } => {
            let document = items
                .create_item(&TodoItem::new(name, description))
                .await
                .context("failed to add item")?;
            info!(id = %document.id(), "Added item");
            Ok(document.content())
        }
        Command::Complete { id } => {
            let mut item = existing(&items, &id).await?;
            item.is_complete = true;
            let document = items.update_item(&id, &item).await?;
            Ok(document.content())
        }
        Command::Update {
            id,
            name,
            description,
        } => {
            if name.is_none() && description.is_none() {
                bail!("nothing to update; pass --name or --description");
            }
            let mut item = existing(&items, &id).await?;
            item.apply(name, description);
            let document = items.update_item(&id, &item).await?;
            Ok(document.content())
        }
        Command::Delete { id } => {
            items.delete_item(&id).await?;
            Ok(json!({ "deleted": id }))
        }
        Command::Endpoints => Ok(json!({
            "read": items.read_endpoint(),
            "write": items.write_endpoint(),
        })),
    }
}

async fn existing(items: &DocumentRepository<TodoItem>, id: &str) -> anyhow::Result<TodoItem> {
    match items.get_item(id).await? {
        Some(item) => Ok(item),
        None => bail!("item '{id}' not found"),
    }
}
