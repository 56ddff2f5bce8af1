//! Shared connection settings
//!
//! Both commands talk to the same service; the flags (and their matching
//! environment variables, which CI pipelines usually set instead) live in
//! one `clap` args struct flattened into each command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;

use apimsync_core::config::ConfigurationMatcher;
use apimsync_engine::ApimClient;

use crate::error::{CliError, CliResult};

/// Connection and tree-location settings shared by both commands.
#[derive(Args, Debug)]
pub struct ServiceSettings {
    /// Service directory holding (or receiving) the canonical tree
    #[arg(long = "folder", env = "API_MANAGEMENT_SERVICE_OUTPUT_FOLDER_PATH")]
    pub folder: PathBuf,

    /// Base URI of the management service instance
    #[arg(long = "service-url", env = "AZURE_API_MANAGEMENT_SERVICE_URI")]
    pub service_url: String,

    /// Service name, used for logging only
    #[arg(long = "service-name", env = "API_MANAGEMENT_SERVICE_NAME")]
    pub service_name: Option<String>,

    /// Bearer token presented to the management endpoint
    #[arg(long = "bearer-token", env = "APIM_BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: Option<String>,

    /// Management API version
    #[arg(long = "api-version")]
    pub api_version: Option<String>,

    /// Inclusion/override configuration file (YAML or JSON)
    #[arg(long = "configuration-file", env = "CONFIGURATION_YAML_PATH")]
    pub configuration_file: Option<PathBuf>,
}

impl ServiceSettings {
    /// Build the management client, tied to `cancel`.
    pub fn client(&self, cancel: CancellationToken) -> CliResult<Arc<ApimClient>> {
        if self.service_url.trim().is_empty() {
            return Err(CliError::Validation(
                "service URL must not be empty".to_string(),
            ));
        }
        let mut client = ApimClient::new(self.service_url.trim_end_matches('/'))?;
        if let Some(api_version) = &self.api_version {
            client = client.with_api_version(api_version);
        }
        if let Some(token) = &self.bearer_token {
            client = client.with_bearer_token(token);
        }
        Ok(Arc::new(client.with_cancellation(cancel)))
    }

    /// Build the configuration matcher.
    pub fn matcher(&self) -> Arc<ConfigurationMatcher> {
        Arc::new(match &self.configuration_file {
            Some(path) => ConfigurationMatcher::from_path(path),
            None => ConfigurationMatcher::disabled(),
        })
    }
}

/// Cancellation token that trips on Ctrl-C.
pub fn cancellation_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trip = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; cancelling in-flight work");
            trip.cancel();
        }
    });
    token
}
