//! apimsync - synchronize an API Management service with a git-backed tree
//!
//! Two directions share one resource model:
//! - `extract` snapshots the live service into a canonical directory tree
//! - `publish` applies a tree, or one commit's diff of it, back to the
//!   service in dependency order

use clap::{Parser, Subcommand};

mod commands;
mod error;
mod logging;
mod settings;

use error::CliResult;

/// apimsync - API Management service synchronization
#[derive(Parser)]
#[command(name = "apimsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot the live service into a directory tree
    Extract(commands::extract::ExtractArgs),

    /// Apply a directory tree back to the live service
    Publish(commands::publish::PublishArgs),
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Extract(args) => commands::extract::execute(args).await,
        Commands::Publish(args) => commands::publish::execute(args).await,
    }
}
