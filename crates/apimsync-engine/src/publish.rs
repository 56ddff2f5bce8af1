//! Publisher orchestrator
//!
//! Applies a tree (or the diff introduced by one commit) to the live
//! service. Every key processes through a memoised future: puts run after
//! all their predecessors in the current tree's relationships, deletes run
//! after all their dependents in the previous tree's, and keys outside the
//! target set traverse as ordering no-ops without touching the service.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use apimsync_core::config::ConfigurationMatcher;
use apimsync_core::dto;
use apimsync_core::kind::{reserved, ResourceKind};
use apimsync_core::layout;
use apimsync_core::name::ResourceKey;

use crate::api_ops::ApiOps;
use crate::client::ApimClient;
use crate::error::{EngineError, EngineResult};
use crate::memo::MemoMap;
use crate::parse;
use crate::relationships::{self, Relationships};
use crate::source::{self, ChangeStatus, FileSource, GitCommitFileSource, LiveFileSource};

/// Publisher settings beyond the client and configuration.
pub struct PublisherOptions {
    /// Directory holding the canonical tree.
    pub service_dir: PathBuf,
    /// When set, only resources touched by this commit are processed;
    /// deletions resolve through the commit's first parent.
    pub commit: Option<String>,
}

/// Applies a canonical tree to a live service.
pub struct Publisher {
    client: Arc<ApimClient>,
    api_ops: ApiOps,
    matcher: Arc<ConfigurationMatcher>,
    service_dir: PathBuf,
    current: Arc<dyn FileSource>,
    current_relationships: Relationships,
    previous_relationships: Relationships,
    targets: HashSet<ResourceKey>,
    processed: MemoMap<ResourceKey, ()>,
    cancel: CancellationToken,
}

impl Publisher {
    /// Scan the sources, build validated relationships, and compute the
    /// target set.
    pub async fn prepare(
        client: Arc<ApimClient>,
        matcher: Arc<ConfigurationMatcher>,
        options: PublisherOptions,
    ) -> EngineResult<Self> {
        // canonical so commit-relative paths and live paths line up
        let service_dir = match tokio::fs::canonicalize(&options.service_dir).await {
            Ok(canonical) => canonical,
            Err(_) => options.service_dir.clone(),
        };

        let (current, previous, current_keys, targets): (
            Arc<dyn FileSource>,
            Option<Arc<dyn FileSource>>,
            Vec<ResourceKey>,
            HashSet<ResourceKey>,
        ) = match &options.commit {
            None => {
                let current: Arc<dyn FileSource> = Arc::new(LiveFileSource::new(&service_dir));
                let keys = relationships::scan(current.as_ref(), &service_dir).await?;
                let targets = keys.iter().cloned().collect();
                (current, None, keys, targets)
            }
            Some(commit) => {
                let head = GitCommitFileSource::open(&service_dir, commit.clone()).await?;
                let previous: Arc<dyn FileSource> = Arc::new(head.parent());
                let current: Arc<dyn FileSource> = Arc::new(head);

                let mut targets = HashSet::new();
                for change in source::changed_files(&service_dir, commit).await? {
                    let resolver: &dyn FileSource = if change.status == ChangeStatus::Deleted {
                        previous.as_ref()
                    } else {
                        current.as_ref()
                    };
                    if let Some(key) =
                        parse::parse_file(resolver, &service_dir, &change.path).await?
                    {
                        targets.insert(key);
                    }
                }
                let keys = relationships::scan(current.as_ref(), &service_dir).await?;
                (current, Some(previous), keys, targets)
            }
        };

        let current_relationships =
            relationships::build(current.as_ref(), &service_dir, &current_keys).await?;
        let previous_relationships = match &previous {
            Some(previous) => {
                let keys = relationships::scan(previous.as_ref(), &service_dir).await?;
                relationships::build(previous.as_ref(), &service_dir, &keys).await?
            }
            None => Relationships::empty(),
        };

        Ok(Self {
            api_ops: ApiOps::new(Arc::clone(&client)),
            client,
            matcher,
            service_dir,
            current,
            current_relationships,
            previous_relationships,
            targets,
            processed: MemoMap::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Tie the run to a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Number of resources that will be put or deleted.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Process every target in dependency order.
    pub async fn run(&self) -> EngineResult<()> {
        info!(targets = self.targets.len(), "Starting publish");
        let targets: Vec<ResourceKey> = self.targets.iter().cloned().collect();
        try_join_all(targets.iter().map(|key| self.process(key))).await?;
        info!("Publish finished");
        Ok(())
    }

    /// Process one key at most once, whatever path reached it.
    fn process<'a>(&'a self, key: &'a ResourceKey) -> BoxFuture<'a, EngineResult<()>> {
        async move {
            self.processed
                .get_or_try_init(key, || self.process_inner(key))
                .await
        }
        .boxed()
    }

    async fn process_inner(&self, key: &ResourceKey) -> EngineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // operations have no files of their own; when the current tree
        // still references one, treat it as present so its policy waits
        // for the API rather than racing past a no-op delete
        let present = parse::is_in_file_system(self.current.as_ref(), &self.service_dir, key)
            .await?
            || (key.kind == ResourceKind::ApiOperation
                && self.current_relationships.contains(key));
        if present {
            let predecessors: Vec<&ResourceKey> =
                self.current_relationships.predecessors_of(key).collect();
            try_join_all(
                predecessors
                    .into_iter()
                    .map(|predecessor| self.process(predecessor)),
            )
            .await?;
            if self.targets.contains(key) {
                self.put_resource(key).await?;
            }
        } else {
            let successors: Vec<&ResourceKey> =
                self.previous_relationships.successors_of(key).collect();
            try_join_all(
                successors
                    .into_iter()
                    .map(|successor| self.process(successor)),
            )
            .await?;
            if self.targets.contains(key) {
                self.delete_resource(key).await?;
            }
        }
        Ok(())
    }

    async fn put_resource(&self, key: &ResourceKey) -> EngineResult<()> {
        if reserved::is_reserved(key.kind, key.name.as_str()) {
            debug!(resource = %key, "Never publishing system-reserved resource");
            return Ok(());
        }
        if key.kind == ResourceKind::ApiOperation {
            // operations are defined by the API's specification
            return Ok(());
        }

        let raw = parse::read_dto(self.current.as_ref(), &self.service_dir, key)
            .await?
            .unwrap_or_else(|| serde_json::json!({ "properties": {} }));

        let mut body = match dto::normalize(&raw, key.kind) {
            Ok(normalized) => normalized,
            // API-family schema mismatches never block the put
            Err(error)
                if key.kind.is_revisioned() || key.kind.is_release() =>
            {
                warn!(resource = %key, %error, "Schema mismatch; publishing raw DTO");
                raw.clone()
            }
            Err(error) => return Err(error.into()),
        };

        if let Some(overlay) = self.matcher.configuration_override(key).await? {
            body = dto::merge(&body, &overlay);
        }

        if matches!(
            key.kind,
            ResourceKind::NamedValue | ResourceKind::WorkspaceNamedValue
        ) && dto::is_valueless_secret(&body)
        {
            warn!(resource = %key, "Skipping secret named value with no value or key vault reference");
            return Ok(());
        }

        if key.kind.is_revisioned() {
            let specification =
                parse::read_specification(self.current.as_ref(), &self.service_dir, key).await?;
            self.api_ops.put_api(key, &body, specification).await?;
            info!(resource = %key, "Put");
            return Ok(());
        }

        if key.kind.is_release() {
            ensure_release_api_id(&mut body, key);
        }

        let uri = layout::element_uri(self.client.service_uri(), key);

        if matches!(
            key.kind,
            ResourceKind::Product | ResourceKind::WorkspaceProduct
        ) {
            let existed = self.client.exists(&uri).await?;
            self.client.put(&uri, &body).await?;
            if !existed {
                self.api_ops.cleanup_product_companions(key).await?;
            }
            info!(resource = %key, "Put");
            return Ok(());
        }

        self.client.put(&uri, &body).await?;
        info!(resource = %key, "Put");
        Ok(())
    }

    async fn delete_resource(&self, key: &ResourceKey) -> EngineResult<()> {
        if reserved::is_reserved(key.kind, key.name.as_str()) {
            debug!(resource = %key, "Never deleting system-reserved resource");
            return Ok(());
        }
        if key.kind == ResourceKind::ApiOperation {
            return Ok(());
        }

        if key.kind.is_revisioned() {
            self.api_ops.delete_api(key).await?;
            info!(resource = %key, "Deleted");
            return Ok(());
        }

        let uri = layout::element_uri(self.client.service_uri(), key);
        self.client.delete(&uri, true, true).await?;
        info!(resource = %key, "Deleted");
        Ok(())
    }
}

/// A release must name the API it belongs to; default it to the parent.
fn ensure_release_api_id(body: &mut Value, key: &ResourceKey) {
    let Some(parent) = key.parent_key() else {
        return;
    };
    let Some(properties) = body.get_mut("properties").and_then(Value::as_object_mut) else {
        return;
    };
    let missing = properties
        .get("apiId")
        .map_or(true, |api_id| api_id.is_null());
    if missing {
        properties.insert("apiId".to_string(), Value::String(parent.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apimsync_core::name::{ParentChain, ResourceName};
    use serde_json::json;

    #[test]
    fn release_api_id_defaults_to_parent() {
        let key = ResourceKey::new(
            ResourceKind::ApiRelease,
            ResourceName::new("v1").unwrap(),
            ParentChain::empty()
                .append(ResourceKind::Api, ResourceName::new("orders").unwrap()),
        );
        let mut body = json!({"properties": {"notes": "first"}});
        ensure_release_api_id(&mut body, &key);
        assert_eq!(body["properties"]["apiId"], json!("/apis/orders"));

        let mut explicit = json!({"properties": {"apiId": "/apis/other"}});
        ensure_release_api_id(&mut explicit, &key);
        assert_eq!(explicit["properties"]["apiId"], json!("/apis/other"));
    }
}
