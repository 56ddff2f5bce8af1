//! Apply a canonical tree (or one commit's diff) to a live service

use clap::Args;
use tracing::info;

use apimsync_engine::{Publisher, PublisherOptions};

use crate::error::CliResult;
use crate::settings::{self, ServiceSettings};

/// Publish a directory tree to a service
#[derive(Args, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub service: ServiceSettings,

    /// Commit to publish; only files it touched are processed and
    /// deletions resolve through its first parent
    #[arg(long = "commit-id", env = "COMMIT_ID")]
    pub commit_id: Option<String>,
}

/// Execute the publish command.
pub async fn execute(args: PublishArgs) -> CliResult<()> {
    let cancel = settings::cancellation_token();
    let client = args.service.client(cancel.clone())?;
    let matcher = args.service.matcher();

    let publisher = Publisher::prepare(
        client,
        matcher,
        PublisherOptions {
            service_dir: args.service.folder.clone(),
            commit: args.commit_id.clone(),
        },
    )
    .await?
    .with_cancellation(cancel);

    info!(targets = publisher.target_count(), "Publishing");
    publisher.run().await?;
    Ok(())
}
