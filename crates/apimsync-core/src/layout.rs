//! Canonical layout
//!
//! Maps a [`ResourceKey`] to its on-disk location under the service
//! directory and to its collection/element URIs on the management service.
//! The same rules drive both the extractor (writing) and the publisher
//! (parsing), so a tree written by one is always parseable by the other.
//!
//! Link-kind instances are addressed by their *secondary* resource's name:
//! the key name, the per-instance directory, and the wire name all carry it.

use std::path::{Path, PathBuf};

use crate::kind::{PolicyPlacement, ResourceKind};
use crate::name::{ParentChain, ResourceKey};

/// Directory holding every instance of `kind` under the given parent chain.
///
/// Returns `None` for kinds that do not occupy a directory (service-level
/// and per-parent policies).
pub fn collection_directory(
    service_dir: &Path,
    kind: ResourceKind,
    parents: &ParentChain,
) -> Option<PathBuf> {
    let mut path = instance_directory_of_chain(service_dir, parents);
    path.push(kind.collection_directory()?);
    Some(path)
}

/// Per-instance directory for `key`, when its kind occupies one.
pub fn instance_directory(service_dir: &Path, key: &ResourceKey) -> Option<PathBuf> {
    let mut path = collection_directory(service_dir, key.kind, &key.parents)?;
    path.push(key.name.as_str());
    Some(path)
}

/// Information-file path for `key`, when its kind has one.
pub fn information_file(service_dir: &Path, key: &ResourceKey) -> Option<PathBuf> {
    let mut path = instance_directory(service_dir, key)?;
    path.push(key.kind.information_file()?);
    Some(path)
}

/// Policy-XML path for `key`, when its kind is a policy.
///
/// Fragments keep `policy.xml` next to their information file; per-parent
/// policies store `<name>.xml` directly in the parent instance directory;
/// the service policy stores `<name>.xml` at the service root.
pub fn policy_file(service_dir: &Path, key: &ResourceKey) -> Option<PathBuf> {
    match key.kind.policy()? {
        PolicyPlacement::Fragment => {
            let mut path = instance_directory(service_dir, key)?;
            path.push("policy.xml");
            Some(path)
        }
        PolicyPlacement::PerParent => {
            let mut path = instance_directory_of_chain(service_dir, &key.parents);
            path.push(format!("{}.xml", key.name));
            Some(path)
        }
        PolicyPlacement::Service => {
            let mut path = service_dir.to_path_buf();
            path.push(format!("{}.xml", key.name));
            Some(path)
        }
    }
}

/// Specification-file path for an API instance, given the file extension.
pub fn specification_file(service_dir: &Path, key: &ResourceKey, extension: &str) -> Option<PathBuf> {
    if !key.kind.is_revisioned() {
        return None;
    }
    let mut path = instance_directory(service_dir, key)?;
    path.push(format!("specification.{extension}"));
    Some(path)
}

/// Collection URI for `kind` under the given parent chain.
pub fn collection_uri(service_uri: &str, kind: ResourceKind, parents: &ParentChain) -> String {
    let mut uri = String::from(service_uri.trim_end_matches('/'));
    for (parent_kind, parent_name) in parents.segments() {
        uri.push('/');
        uri.push_str(parent_kind.collection_uri_segment());
        uri.push('/');
        uri.push_str(parent_name.as_str());
    }
    uri.push('/');
    uri.push_str(kind.collection_uri_segment());
    uri
}

/// Element URI for `key`.
pub fn element_uri(service_uri: &str, key: &ResourceKey) -> String {
    format!(
        "{}/{}",
        collection_uri(service_uri, key.kind, &key.parents),
        key.name
    )
}

fn instance_directory_of_chain(service_dir: &Path, parents: &ParentChain) -> PathBuf {
    let mut path = service_dir.to_path_buf();
    for (kind, name) in parents.segments() {
        if let Some(directory) = kind.collection_directory() {
            path.push(directory);
        }
        path.push(name.as_str());
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::ResourceName;

    fn name(value: &str) -> ResourceName {
        ResourceName::new(value).unwrap()
    }

    fn service_dir() -> PathBuf {
        PathBuf::from("/tmp/service")
    }

    #[test]
    fn root_information_file() {
        let key = ResourceKey::root(ResourceKind::Product, name("starter"));
        assert_eq!(
            information_file(&service_dir(), &key).unwrap(),
            PathBuf::from("/tmp/service/products/starter/productInformation.json")
        );
    }

    #[test]
    fn nested_information_file() {
        let key = ResourceKey::new(
            ResourceKind::ApiRelease,
            name("v1"),
            ParentChain::empty().append(ResourceKind::Api, name("orders")),
        );
        assert_eq!(
            information_file(&service_dir(), &key).unwrap(),
            PathBuf::from("/tmp/service/apis/orders/releases/v1/apiReleaseInformation.json")
        );
    }

    #[test]
    fn policy_placements() {
        let service = ResourceKey::root(ResourceKind::ServicePolicy, name("policy"));
        assert_eq!(
            policy_file(&service_dir(), &service).unwrap(),
            PathBuf::from("/tmp/service/policy.xml")
        );

        let api = ResourceKey::new(
            ResourceKind::ApiPolicy,
            name("policy"),
            ParentChain::empty().append(ResourceKind::Api, name("orders")),
        );
        assert_eq!(
            policy_file(&service_dir(), &api).unwrap(),
            PathBuf::from("/tmp/service/apis/orders/policy.xml")
        );

        let fragment = ResourceKey::root(ResourceKind::PolicyFragment, name("cors"));
        assert_eq!(
            policy_file(&service_dir(), &fragment).unwrap(),
            PathBuf::from("/tmp/service/policy fragments/cors/policy.xml")
        );
    }

    #[test]
    fn per_parent_policy_has_no_information_file() {
        let api = ResourceKey::new(
            ResourceKind::ApiPolicy,
            name("policy"),
            ParentChain::empty().append(ResourceKind::Api, name("orders")),
        );
        assert_eq!(information_file(&service_dir(), &api), None);
    }

    #[test]
    fn specification_files_are_api_only() {
        let api = ResourceKey::root(ResourceKind::Api, name("orders"));
        assert_eq!(
            specification_file(&service_dir(), &api, "yaml").unwrap(),
            PathBuf::from("/tmp/service/apis/orders/specification.yaml")
        );
        let product = ResourceKey::root(ResourceKind::Product, name("starter"));
        assert_eq!(specification_file(&service_dir(), &product, "yaml"), None);
    }

    #[test]
    fn link_directory_uses_secondary_name() {
        // The key for a link is addressed by the secondary resource's name.
        let key = ResourceKey::new(
            ResourceKind::ProductApi,
            name("orders"),
            ParentChain::empty().append(ResourceKind::Product, name("starter")),
        );
        assert_eq!(
            information_file(&service_dir(), &key).unwrap(),
            PathBuf::from("/tmp/service/products/starter/api links/orders/apiLinkInformation.json")
        );
    }

    #[test]
    fn uris_follow_parent_chain() {
        let service_uri = "https://management.example.net/service/contoso";
        let key = ResourceKey::new(
            ResourceKind::ApiOperationPolicy,
            name("policy"),
            ParentChain::empty()
                .append(ResourceKind::Api, name("orders"))
                .append(ResourceKind::ApiOperation, name("getOrders")),
        );
        assert_eq!(
            element_uri(service_uri, &key),
            "https://management.example.net/service/contoso/apis/orders/operations/getOrders/policies/policy"
        );
        assert_eq!(
            collection_uri(service_uri, ResourceKind::Api, &ParentChain::empty()),
            "https://management.example.net/service/contoso/apis"
        );
    }

    #[test]
    fn workspace_nesting() {
        let key = ResourceKey::new(
            ResourceKind::WorkspaceNamedValue,
            name("db-password"),
            ParentChain::empty().append(ResourceKind::Workspace, name("team-a")),
        );
        assert_eq!(
            information_file(&service_dir(), &key).unwrap(),
            PathBuf::from(
                "/tmp/service/workspaces/team-a/named values/db-password/namedValueInformation.json"
            )
        );
        assert_eq!(
            element_uri("https://svc", &key),
            "https://svc/workspaces/team-a/namedValues/db-password"
        );
    }
}
