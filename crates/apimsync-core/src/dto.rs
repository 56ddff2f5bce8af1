//! DTO normalization
//!
//! Information files store a reshaped subset of the wire DTO: round-tripped
//! through a typed schema (dropping unknown fields, failing on missing
//! required ones), with absolute resource ids rewritten relative to the
//! service and side-stored content (policy XML, specifications) removed.
//!
//! The typed schemas mirror the management REST contract property-for-
//! property; serialization skips absent optionals so emitted JSON carries
//! only what was set.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::kind::{PolicyPlacement, ResourceKind};
use crate::name::ResourceKey;

/// Generic DTO envelope: optional wire name plus required properties bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dto<P> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub properties: P,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedValueProperties {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_vault: Option<KeyVaultContract>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVaultContract {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_data: Option<GatewayLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_or_region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSetProperties {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning_scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_query_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_header_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerProperties {
    pub logger_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_buffered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticProperties {
    pub logger_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

/// Envelope for policy kinds; `format`/`value` are optional because the
/// information file side-stores the XML body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductProperties {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriptions_limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupProperties {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionProperties {
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_tracing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub api_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_revision_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version_set_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_api_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_settings: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_key_parameter_names: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReleaseProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLinkProperties {
    pub api_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLinkProperties {
    pub group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceProperties {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Round-trip `value` through the typed schema for `kind`.
///
/// Unknown fields are dropped; missing required fields fail with a schema
/// error. Idempotent: normalizing a normalized value is the identity.
pub fn normalize(value: &Value, kind: ResourceKind) -> CoreResult<Value> {
    use ResourceKind::*;

    if !value.is_object() {
        return Err(CoreError::not_json_object("$"));
    }

    match kind {
        NamedValue | WorkspaceNamedValue => round_trip::<Dto<NamedValueProperties>>(value, kind),
        Tag | WorkspaceTag | ProductTag | ApiTag => round_trip::<Dto<TagProperties>>(value, kind),
        Gateway => round_trip::<Dto<GatewayProperties>>(value, kind),
        GatewayApi | ProductApi => round_trip::<Dto<ApiLinkProperties>>(value, kind),
        VersionSet | WorkspaceVersionSet => round_trip::<Dto<VersionSetProperties>>(value, kind),
        Backend | WorkspaceBackend => round_trip::<Dto<BackendProperties>>(value, kind),
        Logger => round_trip::<Dto<LoggerProperties>>(value, kind),
        Diagnostic | ApiDiagnostic => round_trip::<Dto<DiagnosticProperties>>(value, kind),
        PolicyFragment | WorkspacePolicyFragment | ServicePolicy | ProductPolicy | ApiPolicy
        | ApiOperationPolicy | WorkspacePolicy | WorkspaceProductPolicy | WorkspaceApiPolicy => {
            round_trip::<Dto<PolicyProperties>>(value, kind)
        }
        Product | WorkspaceProduct => round_trip::<Dto<ProductProperties>>(value, kind),
        ProductGroup | WorkspaceProductGroup => round_trip::<Dto<GroupLinkProperties>>(value, kind),
        Group | WorkspaceGroup => round_trip::<Dto<GroupProperties>>(value, kind),
        Subscription | WorkspaceSubscription => {
            round_trip::<Dto<SubscriptionProperties>>(value, kind)
        }
        Api | WorkspaceApi => round_trip::<Dto<ApiProperties>>(value, kind),
        ApiRelease | WorkspaceApiRelease => round_trip::<Dto<ApiReleaseProperties>>(value, kind),
        Workspace => round_trip::<Dto<WorkspaceProperties>>(value, kind),
        ApiOperation => Ok(value.clone()),
    }
}

fn round_trip<T: DeserializeOwned + Serialize>(value: &Value, kind: ResourceKind) -> CoreResult<Value> {
    let typed: T = serde_json::from_value(value.clone()).map_err(|source| CoreError::Schema {
        kind: kind.singular(),
        source,
    })?;
    serde_json::to_value(&typed).map_err(|source| CoreError::Schema {
        kind: kind.singular(),
        source,
    })
}

const SERVICE_MARKER: &str = "microsoft.apimanagement/service/";

/// Rewrite an absolute ARM resource id relative to the service.
///
/// Strips everything through the service marker and the service-name
/// segment that follows it. Ids without the marker pass through unchanged;
/// empty input stays empty.
pub fn to_relative_id(id: &str) -> String {
    if id.is_empty() {
        return String::new();
    }
    let lower = id.to_ascii_lowercase();
    let Some(position) = lower.find(SERVICE_MARKER) else {
        return id.to_string();
    };
    let after_marker = &id[position + SERVICE_MARKER.len()..];
    match after_marker.find('/') {
        Some(slash) => format!("/{}", &after_marker[slash + 1..]),
        None => String::from("/"),
    }
}

/// Reshape a normalized DTO for persistence as an information file.
///
/// - Link kinds: rewrite the linked id relative and pin the top-level name.
/// - Reference properties: rewrite each present id relative.
/// - Policy fragments: drop `format`/`value` (the XML is side-stored).
/// - APIs: drop `serviceUrl` unless the API type is websocket or graphql.
pub fn format_for_write(value: &Value, key: &ResourceKey) -> CoreResult<Value> {
    let mut value = value.clone();

    if let Some(link) = key.kind.link() {
        let properties = properties_mut(&mut value)?;
        if let Some(id) = properties.get(link.dto_property).and_then(Value::as_str) {
            let relative = to_relative_id(id);
            properties.insert(link.dto_property.to_string(), Value::String(relative));
        }
        let object = value
            .as_object_mut()
            .ok_or_else(|| CoreError::not_json_object("$"))?;
        object.insert("name".to_string(), Value::String(key.name.to_string()));
    }

    for reference in key.kind.references() {
        let properties = properties_mut(&mut value)?;
        if let Some(id) = properties.get(reference.property).and_then(Value::as_str) {
            let relative = to_relative_id(id);
            properties.insert(reference.property.to_string(), Value::String(relative));
        }
    }

    if matches!(key.kind.policy(), Some(PolicyPlacement::Fragment)) {
        let properties = properties_mut(&mut value)?;
        properties.remove("format");
        properties.remove("value");
    }

    if key.kind.is_revisioned() {
        let properties = properties_mut(&mut value)?;
        let api_kind = properties
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !api_kind.eq_ignore_ascii_case("websocket") && !api_kind.eq_ignore_ascii_case("graphql")
        {
            properties.remove("serviceUrl");
        }
    }

    Ok(value)
}

/// The exact XML body of a policy DTO.
pub fn extract_policy_body(value: &Value) -> CoreResult<String> {
    let properties = value
        .get("properties")
        .ok_or_else(|| CoreError::missing_property("properties"))?;
    if !properties.is_object() {
        return Err(CoreError::not_json_object("properties"));
    }
    properties
        .get("value")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoreError::missing_property("properties.value"))
}

/// Reconstitute a policy DTO from a side-stored XML body, merging an
/// optional information file over it (the information file wins).
pub fn policy_dto_from_body(xml: &str, information: Option<&Value>) -> Value {
    let base = serde_json::json!({
        "properties": {
            "format": "rawxml",
            "value": xml,
        }
    });
    match information {
        Some(information) => merge(&base, information),
        None => base,
    }
}

/// Recursive JSON merge; `overlay` wins on overlapping scalars, objects
/// merge key-by-key, arrays replace wholesale.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, overlay_value) in overlay {
                let entry = match merged.get(key) {
                    Some(base_value) => merge(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

/// True for a secret named value carrying neither an inline value nor a
/// key-vault secret identifier; publishing such a DTO would wipe the secret.
pub fn is_valueless_secret(value: &Value) -> bool {
    let Some(properties) = value.get("properties") else {
        return false;
    };
    let secret = properties
        .get("secret")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !secret {
        return false;
    }
    let has_value = properties.get("value").is_some_and(|v| !v.is_null());
    let has_key_vault = properties
        .get("keyVault")
        .and_then(|kv| kv.get("secretIdentifier"))
        .is_some_and(|v| !v.is_null());
    !has_value && !has_key_vault
}

fn properties_mut(value: &mut Value) -> CoreResult<&mut Map<String, Value>> {
    value
        .get_mut("properties")
        .ok_or_else(|| CoreError::missing_property("properties"))?
        .as_object_mut()
        .ok_or_else(|| CoreError::not_json_object("properties"))
}
