//! SKU support oracle
//!
//! Not every pricing tier offers every resource kind (gateways and
//! workspaces, notably). Root kinds are probed with a collection GET and
//! the error fingerprint decides; non-root kinds inherit support from
//! their dependencies. Answers are memoised for the process lifetime and
//! concurrent callers for one kind share a single probe.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use apimsync_core::graph;
use apimsync_core::kind::ResourceKind;
use apimsync_core::layout;
use apimsync_core::name::ParentChain;

use crate::client::ApimClient;
use crate::error::EngineResult;
use crate::memo::MemoMap;

/// Memoised `is_supported` oracle over one service.
pub struct SkuOracle {
    client: Arc<ApimClient>,
    cache: MemoMap<ResourceKind, bool>,
}

impl SkuOracle {
    pub fn new(client: Arc<ApimClient>) -> Self {
        Self {
            client,
            cache: MemoMap::new(),
        }
    }

    /// Whether the service's tier supports `kind`.
    pub fn is_supported(&self, kind: ResourceKind) -> BoxFuture<'_, EngineResult<bool>> {
        async move {
            self.cache
                .get_or_try_init(&kind, || self.probe(kind))
                .await
        }
        .boxed()
    }

    async fn probe(&self, kind: ResourceKind) -> EngineResult<bool> {
        if graph::predecessor_of(kind).is_none() {
            let uri = layout::collection_uri(self.client.service_uri(), kind, &ParentChain::empty());
            match self.client.get(&uri, &[]).await {
                Ok(_) => Ok(true),
                Err(error) if error.is_sku_unsupported() => {
                    debug!(resource_kind = %kind, "Kind not offered by this pricing tier");
                    Ok(false)
                }
                Err(error) => Err(error),
            }
        } else {
            for dependency in graph::dependencies_of(kind) {
                if !self.is_supported(dependency).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}
