//! Helios Todo
//!
//! A todo list kept in a document database collection.

mod commands;
mod item;

use clap::Parser;
use helios_docdb::{RepositoryConfig, init_logging, shared};
use tracing::info;

use crate::commands::Command;

#[derive(Debug, Parser)]
#[command(name = "todo", version, about = "Todo list backed by a document database")]
struct Cli {
    #[command(flatten)]
    config: RepositoryConfig,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.config.log_level);

    if let Err(errors) = cli.config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(
        database = cli.config.database.as_deref().unwrap_or_default(),
        collection = cli.config.collection.as_deref().unwrap_or_default(),
        connection_mode = %cli.config.connection_mode,
        "Starting Helios Todo"
    );

    let context = shared::initialize(&cli.config).await?;
    let output = commands::run(cli.command, &context).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
