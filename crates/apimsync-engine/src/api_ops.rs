//! API-specific service operations
//!
//! The operations where the management service has real behaviour beyond
//! plain PUT/DELETE: revision-aware API puts (the make-current dance),
//! specification export/import in every supported format, revision-aware
//! deletes, and the cleanup of companion resources the service creates on
//! its own when a product appears.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use apimsync_core::dto;
use apimsync_core::kind::{reserved, ResourceKind};
use apimsync_core::layout;
use apimsync_core::name::{ResourceKey, ResourceName};
use apimsync_core::revision;
use apimsync_core::specification::{ApiSpecification, OpenApiFormat, OpenApiVersion};

use crate::client::ApimClient;
use crate::error::{EngineError, EngineResult};
use crate::memo::MemoMap;
use crate::parse;

/// Content type of a GraphQL schema child on the service.
const GRAPHQL_CONTENT_TYPE: &str = "application/vnd.ms-azure-apim.graphql.schema";

/// API operations bound to one service, with a memoised view of each root
/// API's current revision.
pub struct ApiOps {
    client: Arc<ApimClient>,
    current_revisions: MemoMap<ResourceKey, Option<u32>>,
}

impl ApiOps {
    pub fn new(client: Arc<ApimClient>) -> Self {
        Self {
            client,
            current_revisions: MemoMap::new(),
        }
    }

    /// PUT an API DTO, creating a new revision through the make-current
    /// dance when a root-named API's revision number changes, then import
    /// its specification when one is supplied.
    pub async fn put_api(
        &self,
        key: &ResourceKey,
        dto: &Value,
        specification: Option<(ApiSpecification, String)>,
    ) -> EngineResult<()> {
        let uri = layout::element_uri(self.client.service_uri(), key);
        let existing = self.client.get_optional(&uri, &[]).await?;

        let mut dto = dto.clone();
        if revision::is_root_name(key.name.as_str()) {
            if let Some(existing) = &existing {
                let service_revision = revision_number(existing);
                let incoming_revision = revision_number(&dto);
                if let (Some(service_revision), Some(incoming_revision)) =
                    (service_revision, incoming_revision)
                {
                    if service_revision != incoming_revision {
                        self.make_revision_current(key, incoming_revision).await?;
                    }
                }

                // Workspace APIs keep identity properties stable across
                // revisions when the incoming DTO omits them.
                if key.kind == ResourceKind::WorkspaceApi {
                    preserve_existing_identity(&mut dto, existing);
                }
            }
        }

        self.client.put(&uri, &dto).await?;
        debug!(resource = %key, "Put api");

        if let Some((specification, contents)) = specification {
            self.put_specification(key, specification, &contents, &dto)
                .await?;
        }
        Ok(())
    }

    /// Create revision `revision` of the API and flip it current through a
    /// one-shot release.
    async fn make_revision_current(&self, key: &ResourceKey, revision_number: u32) -> EngineResult<()> {
        let root = key.name.as_str();
        let revisioned = ResourceKey::new(
            key.kind,
            ResourceName::new(revision::combine(root, revision_number))
                .expect("combining valid parts"),
            key.parents.clone(),
        );
        let revision_uri = layout::element_uri(self.client.service_uri(), &revisioned);
        let source_api_id = key.to_string();
        self.client
            .put(
                &revision_uri,
                &json!({
                    "properties": {
                        "apiRevision": revision_number.to_string(),
                        "sourceApiId": source_api_id,
                    }
                }),
            )
            .await?;

        let release_name = format!("apiops-set-current-{}", random_suffix());
        let release_uri = format!(
            "{}/releases/{}",
            layout::element_uri(self.client.service_uri(), key),
            release_name
        );
        self.client
            .put(
                &release_uri,
                &json!({
                    "properties": {
                        "apiId": revisioned.to_string(),
                    }
                }),
            )
            .await?;
        self.client.delete(&release_uri, true, true).await?;

        info!(resource = %key, revision = revision_number, "Flipped current revision");
        Ok(())
    }

    /// DELETE an API, skipping the delete when the named revision is the
    /// service's current one (the folder disappearing only means the
    /// revision became current under the root name).
    pub async fn delete_api(&self, key: &ResourceKey) -> EngineResult<()> {
        if let Some((root, revision_number)) = revision::parse(key.name.as_str()) {
            let root_key = ResourceKey::new(
                key.kind,
                ResourceName::new(root).expect("root of a valid name is valid"),
                key.parents.clone(),
            );
            if self.current_revision(&root_key).await? == Some(revision_number) {
                info!(resource = %key, "Skipping delete; revision is current");
                return Ok(());
            }
        }
        let uri = layout::element_uri(self.client.service_uri(), key);
        self.client.delete(&uri, true, true).await
    }

    /// The current revision number of a root-named API, memoised.
    pub async fn current_revision(&self, root_key: &ResourceKey) -> EngineResult<Option<u32>> {
        self.current_revisions
            .get_or_try_init(root_key, || async {
                let uri = layout::element_uri(self.client.service_uri(), root_key);
                let existing = self.client.get_optional(&uri, &[]).await?;
                Ok(existing.as_ref().and_then(revision_number))
            })
            .await
    }

    /// Fetch the API's specification in the format appropriate for its
    /// type: SOAP APIs export WSDL, GraphQL APIs read their schema child,
    /// everything else uses the configured default.
    pub async fn get_specification(
        &self,
        key: &ResourceKey,
        api_dto: &Value,
        default: ApiSpecification,
    ) -> EngineResult<Option<(ApiSpecification, String)>> {
        let api_type = api_dto
            .get("properties")
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("http");
        let uri = layout::element_uri(self.client.service_uri(), key);

        if api_type.eq_ignore_ascii_case("graphql") {
            let schema_uri = format!("{uri}/schemas/graphql");
            let Some(schema) = self.client.get_optional(&schema_uri, &[]).await? else {
                return Ok(None);
            };
            let Some(document) = schema
                .get("properties")
                .and_then(|p| p.get("document"))
                .and_then(|d| d.get("value"))
                .and_then(Value::as_str)
            else {
                return Ok(None);
            };
            return Ok(Some((ApiSpecification::GraphQl, document.to_string())));
        }

        let specification = if api_type.eq_ignore_ascii_case("soap") {
            ApiSpecification::Wsdl
        } else {
            default
        };
        let format = specification
            .export_format()
            .expect("non-graphql formats have export identifiers");

        let export = self
            .client
            .get(&uri, &[("format", format), ("export", "true")])
            .await?;
        let Some(link) = export
            .get("value")
            .and_then(|v| v.get("link"))
            .and_then(Value::as_str)
        else {
            warn!(resource = %key, "Export response carried no download link");
            return Ok(None);
        };
        let mut contents = self.client.download(link).await?;

        // The service only exports v2 as JSON; re-serialise when YAML was
        // asked for.
        if let ApiSpecification::OpenApi {
            format: OpenApiFormat::Yaml,
            version: OpenApiVersion::V2,
        } = specification
        {
            let document: Value =
                serde_json::from_str(&contents).map_err(|source| apimsync_core::error::CoreError::Schema {
                    kind: "api specification",
                    source,
                })?;
            contents = serde_yaml::to_string(&document).map_err(|e| {
                EngineError::from(apimsync_core::error::CoreError::malformed_configuration(
                    format!("cannot serialise specification as YAML: {e}"),
                ))
            })?;
        }
        Ok(Some((specification, contents)))
    }

    /// Import a specification document into the API.
    pub async fn put_specification(
        &self,
        key: &ResourceKey,
        specification: ApiSpecification,
        contents: &str,
        api_dto: &Value,
    ) -> EngineResult<()> {
        let uri = layout::element_uri(self.client.service_uri(), key);

        if specification == ApiSpecification::GraphQl {
            let schema_uri = format!("{uri}/schemas/graphql");
            let body = json!({
                "properties": {
                    "contentType": GRAPHQL_CONTENT_TYPE,
                    "document": {"value": contents},
                }
            });
            self.client.put(&schema_uri, &body).await?;
            return Ok(());
        }

        let format = specification
            .import_format()
            .expect("non-graphql formats have import identifiers");
        let mut overlay = json!({
            "properties": {
                "format": format,
                "value": contents,
            }
        });
        if specification == ApiSpecification::Wsdl {
            overlay["properties"]["apiType"] = json!("soap");
        }
        let body = dto::merge(api_dto, &overlay);

        if specification.import_requires_query() {
            self.client
                .put_with_query(&uri, &[("import", "true")], &body)
                .await?;
        } else {
            self.client.put(&uri, &body).await?;
        }
        Ok(())
    }

    /// Remove the companion resources the service creates with a brand-new
    /// product: subscriptions scoped to it and its group assignments.
    pub async fn cleanup_product_companions(&self, product_key: &ResourceKey) -> EngineResult<()> {
        let (subscription_kind, group_link_kind) = match product_key.kind {
            ResourceKind::Product => (ResourceKind::Subscription, ResourceKind::ProductGroup),
            ResourceKind::WorkspaceProduct => (
                ResourceKind::WorkspaceSubscription,
                ResourceKind::WorkspaceProductGroup,
            ),
            _ => return Ok(()),
        };

        let scope_suffix = format!(
            "/{}/{}",
            product_key.kind.collection_uri_segment(),
            product_key.name
        )
        .to_ascii_lowercase();

        let subscriptions_uri = layout::collection_uri(
            self.client.service_uri(),
            subscription_kind,
            &product_key.parents,
        );
        for subscription in self.client.list_collection(&subscriptions_uri).await? {
            let Some(name) = subscription.get("name").and_then(Value::as_str) else {
                continue;
            };
            if reserved::is_reserved(subscription_kind, name) {
                continue;
            }
            let scoped = subscription
                .get("properties")
                .and_then(|p| p.get("scope"))
                .and_then(Value::as_str)
                .is_some_and(|scope| scope.to_ascii_lowercase().ends_with(&scope_suffix));
            if scoped {
                let uri = format!("{subscriptions_uri}/{name}");
                debug!(subscription = name, "Deleting auto-created subscription");
                self.client.delete(&uri, true, true).await?;
            }
        }

        let groups_chain = product_key
            .parents
            .append(product_key.kind, product_key.name.clone());
        let groups_uri =
            layout::collection_uri(self.client.service_uri(), group_link_kind, &groups_chain);
        for group in self.client.list_collection(&groups_uri).await? {
            let Some(name) = group.get("name").and_then(Value::as_str) else {
                continue;
            };
            let uri = format!("{groups_uri}/{}", parse::last_segment(name));
            debug!(group = name, "Deleting auto-created product group");
            self.client.delete(&uri, true, true).await?;
        }
        Ok(())
    }
}

fn revision_number(dto: &Value) -> Option<u32> {
    dto.get("properties")
        .and_then(|p| p.get("apiRevision"))
        .and_then(|r| match r {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        })
}

/// Carry over `type`, `path`, and `protocols` from the service's DTO when
/// the incoming one omits them.
fn preserve_existing_identity(dto: &mut Value, existing: &Value) {
    let Some(existing_properties) = existing.get("properties") else {
        return;
    };
    let Some(properties) = dto.get_mut("properties").and_then(Value::as_object_mut) else {
        return;
    };
    for property in ["type", "path", "protocols"] {
        if !properties.contains_key(property) {
            if let Some(value) = existing_properties.get(property) {
                properties.insert(property.to_string(), value.clone());
            }
        }
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_numbers_parse_from_string_and_number() {
        assert_eq!(revision_number(&json!({"properties": {"apiRevision": "3"}})), Some(3));
        assert_eq!(revision_number(&json!({"properties": {"apiRevision": 2}})), Some(2));
        assert_eq!(revision_number(&json!({"properties": {}})), None);
        assert_eq!(
            revision_number(&json!({"properties": {"apiRevision": "current"}})),
            None
        );
    }

    #[test]
    fn identity_preservation_fills_gaps_only() {
        let mut dto = json!({"properties": {"displayName": "Orders", "path": "orders-v2"}});
        let existing = json!({
            "properties": {"type": "http", "path": "orders", "protocols": ["https"]}
        });
        preserve_existing_identity(&mut dto, &existing);
        assert_eq!(dto["properties"]["type"], json!("http"));
        assert_eq!(dto["properties"]["path"], json!("orders-v2"));
        assert_eq!(dto["properties"]["protocols"], json!(["https"]));
    }

    #[test]
    fn random_suffix_shape() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(suffix, suffix.to_ascii_lowercase());
    }
}
