//! Extractor orchestrator
//!
//! Walks the traversal forest top-down, in parallel across siblings, and
//! writes each included resource's artefacts (information file, policy
//! XML, API specification) before descending into its successors. Child
//! work runs inside the parent's future so cancelling the run cancels the
//! whole walk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use apimsync_core::config::ConfigurationMatcher;
use apimsync_core::dto;
use apimsync_core::graph;
use apimsync_core::kind::{reserved, ResourceKind};
use apimsync_core::layout;
use apimsync_core::name::{ParentChain, ResourceKey, ResourceName};
use apimsync_core::revision;
use apimsync_core::specification::ApiSpecification;

use crate::api_ops::ApiOps;
use crate::client::ApimClient;
use crate::error::{EngineError, EngineResult};
use crate::sku::SkuOracle;

/// Extractor settings beyond the client and configuration.
pub struct ExtractorOptions {
    /// Directory the canonical tree is written into.
    pub service_dir: PathBuf,
    /// Specification format for HTTP APIs.
    pub default_specification: ApiSpecification,
}

/// Snapshots a live service into the canonical directory tree.
pub struct Extractor {
    client: Arc<ApimClient>,
    sku: SkuOracle,
    api_ops: ApiOps,
    matcher: Arc<ConfigurationMatcher>,
    service_dir: PathBuf,
    default_specification: ApiSpecification,
    cancel: CancellationToken,
}

impl Extractor {
    pub fn new(
        client: Arc<ApimClient>,
        matcher: Arc<ConfigurationMatcher>,
        options: ExtractorOptions,
    ) -> Self {
        Self {
            sku: SkuOracle::new(Arc::clone(&client)),
            api_ops: ApiOps::new(Arc::clone(&client)),
            client,
            matcher,
            service_dir: options.service_dir,
            default_specification: options.default_specification,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie the run to a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Extract every supported, included resource.
    pub async fn run(&self) -> EngineResult<()> {
        info!(service_dir = %self.service_dir.display(), "Starting extraction");
        try_join_all(
            graph::root_kinds()
                .into_iter()
                .map(|kind| self.process_kind(kind, ParentChain::empty())),
        )
        .await?;
        info!("Extraction finished");
        Ok(())
    }

    fn process_kind(
        &self,
        kind: ResourceKind,
        parents: ParentChain,
    ) -> BoxFuture<'_, EngineResult<()>> {
        async move {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if !self.sku.is_supported(kind).await? {
                warn!(resource_kind = %kind, "Skipping kind; not supported by this pricing tier");
                return Ok(());
            }

            let collection_uri =
                layout::collection_uri(self.client.service_uri(), kind, &parents);
            let items = self.client.list_collection(&collection_uri).await?;
            try_join_all(
                items
                    .into_iter()
                    .map(|item| self.process_item(kind, parents.clone(), item)),
            )
            .await?;
            Ok(())
        }
        .boxed()
    }

    async fn process_item(
        &self,
        kind: ResourceKind,
        parents: ParentChain,
        item: Value,
    ) -> EngineResult<()> {
        let Some(name) = item.get("name").and_then(Value::as_str) else {
            warn!(resource_kind = %kind, "Listed item carried no name; skipping");
            return Ok(());
        };
        let name = ResourceName::new(name)?;
        let key = ResourceKey::new(kind, name, parents);

        if reserved::is_reserved(kind, key.name.as_str()) {
            debug!(resource = %key, "Skipping system-reserved resource");
            return Ok(());
        }
        if self.matcher.resource_is_in_configuration(&key).await? == Some(false) {
            warn!(resource = %key, "Skipping resource excluded by configuration");
            return Ok(());
        }

        let dto = if kind.has_dto() {
            let raw = if kind.policy().is_some() {
                // the list endpoint omits the raw XML body
                let uri = layout::element_uri(self.client.service_uri(), &key);
                self.client.get(&uri, &[("format", "rawxml")]).await?
            } else {
                item
            };
            Some(dto::normalize(&raw, kind)?)
        } else {
            None
        };

        self.write_artifacts(&key, dto.as_ref()).await?;
        debug!(resource = %key, "Extracted");

        let child_parents = key.parents.append(key.kind, key.name.clone());
        let successors = graph::successors_of(kind).into_iter().filter(|successor| {
            // releases live only under the current revision of an API
            !(kind.is_revisioned()
                && successor.is_release()
                && !revision::is_root_name(key.name.as_str()))
        });
        try_join_all(
            successors.map(|successor| self.process_kind(successor, child_parents.clone())),
        )
        .await?;
        Ok(())
    }

    async fn write_artifacts(&self, key: &ResourceKey, dto: Option<&Value>) -> EngineResult<()> {
        let Some(dto) = dto else {
            return Ok(());
        };

        if key.kind.information_file().is_some() {
            let formatted = dto::format_for_write(dto, key)?;
            let contents = serde_json::to_vec_pretty(&formatted).map_err(|source| {
                apimsync_core::error::CoreError::Schema {
                    kind: key.kind.singular(),
                    source,
                }
            })?;
            let path = layout::information_file(&self.service_dir, key)
                .expect("kind declares an information file");
            write_file(&path, contents).await?;
        }

        if key.kind.policy().is_some() {
            let body = dto::extract_policy_body(dto)?;
            let path = layout::policy_file(&self.service_dir, key)
                .expect("kind declares a policy placement");
            write_file(&path, body.into_bytes()).await?;
        }

        if key.kind.is_revisioned() {
            if let Some((specification, contents)) = self
                .api_ops
                .get_specification(key, dto, self.default_specification)
                .await?
            {
                let path = layout::specification_file(
                    &self.service_dir,
                    key,
                    specification.extension(),
                )
                .expect("api kinds have specification files");
                write_file(&path, contents.into_bytes()).await?;
            }
        }
        Ok(())
    }
}

async fn write_file(path: &Path, contents: Vec<u8>) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineError::io(parent.display().to_string(), e))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| EngineError::io(path.display().to_string(), e))
}
