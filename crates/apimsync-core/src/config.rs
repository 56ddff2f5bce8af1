//! Configuration matcher
//!
//! The configuration file is a tree of nested lists keyed by plural nouns:
//!
//! ```yaml
//! products:
//!   - starter
//!   - premium:
//!       policies:
//!         - policy
//! apis:
//!   - orders:
//!       properties:
//!         description: overridden at publish time
//! ```
//!
//! A list item is either a bare name or a single-key mapping whose value
//! holds child sections and per-resource overrides. Absence of a section at
//! a scope means "include everything of that kind"; presence means the list
//! is exhaustive.
//!
//! Lookups are cached at two levels: the parsed configuration JSON is
//! loaded once, and each parent-chain scope resolves through a concurrent
//! map so shared prefixes are walked once across all callers. API ancestors
//! named `root;rev=N` collapse to the root name before the walk, and API
//! membership checks fall back to the root name, so every revision of an
//! API shares one inclusion decision.

use std::path::PathBuf;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::{CoreError, CoreResult};
use crate::name::{ParentChain, ResourceKey};
use crate::revision;

/// Hierarchical inclusion/override lookup over a configuration file.
pub struct ConfigurationMatcher {
    path: Option<PathBuf>,
    root: OnceCell<Option<Value>>,
    sections: DashMap<ParentChain, Option<Value>>,
}

impl ConfigurationMatcher {
    /// Matcher backed by a YAML (or JSON) file, loaded on first use.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            root: OnceCell::new(),
            sections: DashMap::new(),
        }
    }

    /// Matcher with no configuration: every lookup yields `None`.
    pub fn disabled() -> Self {
        Self {
            path: None,
            root: OnceCell::new(),
            sections: DashMap::new(),
        }
    }

    /// Matcher over an already-parsed configuration value.
    pub fn from_value(value: Value) -> Self {
        Self {
            path: None,
            root: OnceCell::new_with(Some(Some(value))),
            sections: DashMap::new(),
        }
    }

    /// Whether `key` is included by the configuration.
    ///
    /// `None` means the configuration is silent at this scope and the caller
    /// decides (the extractor includes by default).
    pub async fn resource_is_in_configuration(
        &self,
        key: &ResourceKey,
    ) -> CoreResult<Option<bool>> {
        let Some(section) = self.section(&key.parents).await? else {
            return Ok(None);
        };
        let Some(items) = section.get(key.kind.plural()).and_then(Value::as_array) else {
            return Ok(None);
        };

        let contains = |needle: &str| {
            items
                .iter()
                .filter_map(item_name)
                .any(|name| name.eq_ignore_ascii_case(needle))
        };

        let mut found = contains(key.name.as_str());
        if !found && key.kind.is_revisioned() {
            found = contains(revision::root_name(key.name.as_str()));
        }
        Ok(Some(found))
    }

    /// The override object declared for `key`, if any.
    ///
    /// For API kinds the `properties.apiRevision` and `properties.isCurrent`
    /// entries are stripped so configuration can never rewrite revision
    /// identity.
    pub async fn configuration_override(&self, key: &ResourceKey) -> CoreResult<Option<Value>> {
        let Some(section) = self.section(&key.parents).await? else {
            return Ok(None);
        };
        let Some(items) = section.get(key.kind.plural()).and_then(Value::as_array) else {
            return Ok(None);
        };

        let find = |needle: &str| {
            items.iter().find_map(|item| match item {
                Value::Object(map) if map.len() == 1 => {
                    let (name, value) = map.iter().next().expect("single-key mapping");
                    (name.eq_ignore_ascii_case(needle) && value.is_object())
                        .then(|| value.clone())
                }
                _ => None,
            })
        };

        let mut overlay = find(key.name.as_str());
        if overlay.is_none() && key.kind.is_revisioned() {
            overlay = find(revision::root_name(key.name.as_str()));
        }

        if key.kind.is_revisioned() {
            if let Some(properties) = overlay
                .as_mut()
                .and_then(|o| o.get_mut("properties"))
                .and_then(Value::as_object_mut)
            {
                properties.remove("apiRevision");
                properties.remove("isCurrent");
            }
        }
        Ok(overlay)
    }

    /// Resolve the configuration scope for a parent chain, caching every
    /// prefix along the way.
    async fn section(&self, parents: &ParentChain) -> CoreResult<Option<Value>> {
        if let Some(cached) = self.sections.get(parents) {
            return Ok(cached.value().clone());
        }

        let mut current = self.load_root().await?.clone();
        for depth in 0..parents.len() {
            let prefix = parents.prefix(depth + 1);
            if let Some(cached) = self.sections.get(&prefix) {
                current = cached.value().clone();
                continue;
            }

            let (kind, name) = &parents.segments()[depth];
            let lookup = if kind.is_revisioned() {
                revision::root_name(name.as_str())
            } else {
                name.as_str()
            };
            current = current
                .as_ref()
                .and_then(|section| child_scope(section, kind.plural(), lookup));
            self.sections.insert(prefix, current.clone());
        }
        Ok(current)
    }

    async fn load_root(&self) -> CoreResult<&Option<Value>> {
        self.root
            .get_or_try_init(|| async {
                let Some(path) = &self.path else {
                    return Ok(None);
                };
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    CoreError::malformed_configuration(format!(
                        "cannot read '{}': {e}",
                        path.display()
                    ))
                })?;
                let value: Value = serde_yaml::from_str(&content).map_err(|e| {
                    CoreError::malformed_configuration(format!(
                        "cannot parse '{}': {e}",
                        path.display()
                    ))
                })?;
                Ok(Some(value))
            })
            .await
    }
}

/// Name of a list item: the string itself, or the single key of a mapping.
fn item_name(item: &Value) -> Option<&str> {
    match item {
        Value::String(name) => Some(name),
        Value::Object(map) if map.len() == 1 => map.keys().next().map(String::as_str),
        _ => None,
    }
}

/// Scope object under a named item of a plural section, for walking deeper.
///
/// Bare-name items carry no child sections; they resolve to an empty scope
/// so deeper lookups see "no section present".
fn child_scope(section: &Value, plural: &str, name: &str) -> Option<Value> {
    let items = section.get(plural)?.as_array()?;
    items.iter().find_map(|item| match item {
        Value::String(item_name) if item_name.eq_ignore_ascii_case(name) => {
            Some(Value::Object(serde_json::Map::new()))
        }
        Value::Object(map) if map.len() == 1 => {
            let (item_name, value) = map.iter().next().expect("single-key mapping");
            item_name.eq_ignore_ascii_case(name).then(|| value.clone())
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ResourceKind;
    use crate::name::ResourceName;
    use serde_json::json;

    fn name(value: &str) -> ResourceName {
        ResourceName::new(value).unwrap()
    }

    fn matcher(yaml: &str) -> ConfigurationMatcher {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        ConfigurationMatcher::from_value(value)
    }

    #[tokio::test]
    async fn absent_section_means_include_by_default() {
        let matcher = matcher("products:\n  - starter\n");
        let key = ResourceKey::root(ResourceKind::Api, name("orders"));
        assert_eq!(matcher.resource_is_in_configuration(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn membership_by_bare_name_and_mapping_key() {
        let matcher = matcher("products:\n  - starter\n  - premium:\n      policies:\n        - policy\n");
        let starter = ResourceKey::root(ResourceKind::Product, name("starter"));
        let premium = ResourceKey::root(ResourceKind::Product, name("Premium"));
        let basic = ResourceKey::root(ResourceKind::Product, name("basic"));
        assert_eq!(
            matcher.resource_is_in_configuration(&starter).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            matcher.resource_is_in_configuration(&premium).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            matcher.resource_is_in_configuration(&basic).await.unwrap(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn nested_scope_walk() {
        let matcher = matcher(
            "apis:\n  - orders:\n      diagnostics:\n        - applicationinsights\n",
        );
        let included = ResourceKey::new(
            ResourceKind::ApiDiagnostic,
            name("applicationinsights"),
            ParentChain::empty().append(ResourceKind::Api, name("orders")),
        );
        let excluded = ResourceKey::new(
            ResourceKind::ApiDiagnostic,
            name("local"),
            ParentChain::empty().append(ResourceKind::Api, name("orders")),
        );
        assert_eq!(
            matcher.resource_is_in_configuration(&included).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            matcher.resource_is_in_configuration(&excluded).await.unwrap(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn bare_parent_yields_silent_child_scope() {
        let matcher = matcher("apis:\n  - orders\n");
        let key = ResourceKey::new(
            ResourceKind::ApiDiagnostic,
            name("local"),
            ParentChain::empty().append(ResourceKind::Api, name("orders")),
        );
        assert_eq!(matcher.resource_is_in_configuration(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn api_revisions_share_the_root_decision() {
        let matcher = matcher("apis:\n  - orders\n");
        let root = ResourceKey::root(ResourceKind::Api, name("orders"));
        let revision = ResourceKey::root(ResourceKind::Api, name("orders;rev=3"));
        assert_eq!(
            matcher.resource_is_in_configuration(&root).await.unwrap(),
            matcher.resource_is_in_configuration(&revision).await.unwrap(),
        );
        assert_eq!(
            matcher.resource_is_in_configuration(&revision).await.unwrap(),
            Some(true)
        );
    }

    #[tokio::test]
    async fn revisioned_api_ancestors_collapse_to_root() {
        let matcher = matcher("apis:\n  - orders:\n      releases:\n        - v1\n");
        let key = ResourceKey::new(
            ResourceKind::ApiRelease,
            name("v1"),
            ParentChain::empty().append(ResourceKind::Api, name("orders;rev=2")),
        );
        assert_eq!(
            matcher.resource_is_in_configuration(&key).await.unwrap(),
            Some(true)
        );
    }

    #[tokio::test]
    async fn override_returns_mapping_value() {
        let matcher = matcher(
            "namedValues:\n  - nv1:\n      properties:\n        value: overridden\n",
        );
        let key = ResourceKey::root(ResourceKind::NamedValue, name("nv1"));
        let overlay = matcher.configuration_override(&key).await.unwrap().unwrap();
        assert_eq!(overlay, json!({"properties": {"value": "overridden"}}));

        let missing = ResourceKey::root(ResourceKind::NamedValue, name("nv2"));
        assert_eq!(matcher.configuration_override(&missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn override_never_rewrites_revision_identity() {
        let matcher = matcher(
            "apis:\n  - orders:\n      properties:\n        apiRevision: \"9\"\n        isCurrent: false\n        description: kept\n",
        );
        let key = ResourceKey::root(ResourceKind::Api, name("orders"));
        let overlay = matcher.configuration_override(&key).await.unwrap().unwrap();
        assert_eq!(overlay, json!({"properties": {"description": "kept"}}));
    }

    #[tokio::test]
    async fn disabled_matcher_is_silent() {
        let matcher = ConfigurationMatcher::disabled();
        let key = ResourceKey::root(ResourceKind::Product, name("p"));
        assert_eq!(matcher.resource_is_in_configuration(&key).await.unwrap(), None);
        assert_eq!(matcher.configuration_override(&key).await.unwrap(), None);
    }
}
