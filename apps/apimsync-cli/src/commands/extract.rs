//! Snapshot a live service into the canonical tree

use clap::Args;
use tracing::info;

use apimsync_core::specification::ApiSpecification;
use apimsync_engine::{Extractor, ExtractorOptions};

use crate::error::{CliError, CliResult};
use crate::settings::{self, ServiceSettings};

/// Extract a service into a directory tree
#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub service: ServiceSettings,

    /// Specification format for HTTP APIs
    /// (Wadl, Json, Yaml, OpenApiV2Json, OpenApiV2Yaml, OpenApiV3Json, OpenApiV3Yaml)
    #[arg(long = "specification-format", env = "API_SPECIFICATION_FORMAT")]
    pub specification_format: Option<String>,
}

/// Execute the extract command.
pub async fn execute(args: ExtractArgs) -> CliResult<()> {
    let default_specification = match &args.specification_format {
        Some(value) => value
            .parse::<ApiSpecification>()
            .map_err(|e| CliError::Validation(e.to_string()))?,
        None => ApiSpecification::default_openapi(),
    };

    let cancel = settings::cancellation_token();
    let client = args.service.client(cancel.clone())?;
    let matcher = args.service.matcher();

    if let Some(service_name) = &args.service.service_name {
        info!(service = service_name, "Extracting service");
    }

    let extractor = Extractor::new(
        client,
        matcher,
        ExtractorOptions {
            service_dir: args.service.folder.clone(),
            default_specification,
        },
    )
    .with_cancellation(cancel);

    extractor.run().await?;
    Ok(())
}
