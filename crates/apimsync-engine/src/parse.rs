//! Tree file parsing
//!
//! Maps a file path inside the service directory back to the resource it
//! belongs to, by trying each kind's shape in reverse topological order
//! (most derived first). A file matching two different resources is a
//! fatal inconsistency.
//!
//! Also holds the read helpers the publisher uses to load a resource's
//! artefacts (information file, policy body, specification) out of a
//! [`FileSource`].

use std::path::Path;

use serde_json::Value;

use apimsync_core::dto;
use apimsync_core::error::CoreError;
use apimsync_core::graph;
use apimsync_core::kind::{PolicyPlacement, ResourceKind};
use apimsync_core::layout;
use apimsync_core::name::{ParentChain, ResourceKey, ResourceName};
use apimsync_core::specification::ApiSpecification;

use crate::error::EngineResult;
use crate::source::FileSource;

/// Parse a file path into the resource key it belongs to.
///
/// Returns `None` for files no kind claims (documentation, tooling files).
/// Fails when two kinds claim the same file.
pub async fn parse_file(
    source: &dyn FileSource,
    service_dir: &Path,
    path: &Path,
) -> EngineResult<Option<ResourceKey>> {
    let Ok(relative) = path.strip_prefix(service_dir) else {
        return Ok(None);
    };
    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if components.is_empty() {
        return Ok(None);
    }

    let mut matched: Option<ResourceKey> = None;
    let order = graph::topological_order();
    for kind in order.into_iter().rev() {
        let candidate = match try_kind(source, service_dir, kind, &components).await? {
            Some(candidate) => candidate,
            None => continue,
        };
        match &matched {
            None => matched = Some(candidate),
            Some(existing) if *existing == candidate => {}
            Some(existing) => {
                return Err(CoreError::AmbiguousFile {
                    path: path.display().to_string(),
                    first: existing.kind.singular(),
                    second: candidate.kind.singular(),
                }
                .into());
            }
        }
    }
    Ok(matched)
}

async fn try_kind(
    source: &dyn FileSource,
    service_dir: &Path,
    kind: ResourceKind,
    components: &[String],
) -> EngineResult<Option<ResourceKey>> {
    // API specification files belong to the API resource itself
    if kind.is_revisioned() {
        if let Some(key) = try_specification(kind, components)? {
            return Ok(Some(key));
        }
    }

    if let Some(placement) = kind.policy() {
        return try_policy(kind, placement, components);
    }

    if kind.information_file().is_some() {
        return try_information(source, service_dir, kind, components).await;
    }

    Ok(None)
}

/// `.../<ancestors>/<collectionDir>/<name>/<informationFile>`
async fn try_information(
    source: &dyn FileSource,
    service_dir: &Path,
    kind: ResourceKind,
    components: &[String],
) -> EngineResult<Option<ResourceKey>> {
    let file_name = kind.information_file().expect("checked by caller");
    let collection_dir = kind.collection_directory().expect("information file implies directory");

    let expected_len = 2 * ancestors(kind).len() + 3;
    if components.len() != expected_len
        || components[components.len() - 1] != file_name
        || components[components.len() - 3] != collection_dir
    {
        return Ok(None);
    }

    let Some(parents) = match_ancestors(kind, &components[..components.len() - 3])? else {
        return Ok(None);
    };
    let directory_name = &components[components.len() - 2];
    let name = match ResourceName::new(directory_name.clone()) {
        Ok(name) => name,
        Err(_) => return Ok(None),
    };
    let key = ResourceKey::new(kind, name, parents);

    // A link's directory must be named after the secondary resource the
    // DTO points at.
    if let Some(link) = kind.link() {
        let Some(information) = read_information(source, service_dir, &key).await? else {
            return Ok(None);
        };
        let Some(id) = information
            .get("properties")
            .and_then(|p| p.get(link.dto_property))
            .and_then(Value::as_str)
        else {
            return Ok(None);
        };
        let secondary = last_segment(id);
        if !secondary.eq_ignore_ascii_case(directory_name) {
            return Ok(None);
        }
    }

    Ok(Some(key))
}

/// Fragment: `.../<collectionDir>/<name>/policy.xml`.
/// Per-parent: `.../<parent instance dir>/<name>.xml`.
/// Service: `<name>.xml` at the service root.
fn try_policy(
    kind: ResourceKind,
    placement: PolicyPlacement,
    components: &[String],
) -> EngineResult<Option<ResourceKey>> {
    match placement {
        PolicyPlacement::Fragment => {
            let collection_dir = kind.collection_directory().expect("fragments have directories");
            let expected_len = 2 * ancestors(kind).len() + 3;
            if components.len() != expected_len
                || components[components.len() - 1] != "policy.xml"
                || components[components.len() - 3] != collection_dir
            {
                return Ok(None);
            }
            let Some(parents) = match_ancestors(kind, &components[..components.len() - 3])? else {
                return Ok(None);
            };
            let name = match ResourceName::new(components[components.len() - 2].clone()) {
                Ok(name) => name,
                Err(_) => return Ok(None),
            };
            Ok(Some(ResourceKey::new(kind, name, parents)))
        }
        PolicyPlacement::PerParent | PolicyPlacement::Service => {
            let expected_len = 2 * ancestors(kind).len() + 1;
            if components.len() != expected_len {
                return Ok(None);
            }
            let file = &components[components.len() - 1];
            let Some(stem) = file.strip_suffix(".xml") else {
                return Ok(None);
            };
            let Some(parents) = match_ancestors(kind, &components[..components.len() - 1])? else {
                return Ok(None);
            };
            let name = match ResourceName::new(stem) {
                Ok(name) => name,
                Err(_) => return Ok(None),
            };
            Ok(Some(ResourceKey::new(kind, name, parents)))
        }
    }
}

/// `.../apis/<name>/specification.<ext>`
fn try_specification(
    kind: ResourceKind,
    components: &[String],
) -> EngineResult<Option<ResourceKey>> {
    let expected_len = 2 * ancestors(kind).len() + 3;
    if components.len() != expected_len {
        return Ok(None);
    }
    let file = &components[components.len() - 1];
    let Some(extension) = file.strip_prefix("specification.") else {
        return Ok(None);
    };
    if ApiSpecification::from_extension(extension).is_none() {
        return Ok(None);
    }
    let collection_dir = kind.collection_directory().expect("apis have directories");
    if components[components.len() - 3] != collection_dir {
        return Ok(None);
    }
    let Some(parents) = match_ancestors(kind, &components[..components.len() - 3])? else {
        return Ok(None);
    };
    let name = match ResourceName::new(components[components.len() - 2].clone()) {
        Ok(name) => name,
        Err(_) => return Ok(None),
    };
    Ok(Some(ResourceKey::new(kind, name, parents)))
}

/// Traversal ancestor kinds of `kind`, outermost first.
fn ancestors(kind: ResourceKind) -> Vec<ResourceKind> {
    let mut chain = Vec::new();
    let mut current = graph::predecessor_of(kind);
    while let Some(ancestor) = current {
        chain.push(ancestor);
        current = graph::predecessor_of(ancestor);
    }
    chain.reverse();
    chain
}

/// Match `[dirA, nameA, dirB, nameB, ...]` against the ancestor hierarchy.
fn match_ancestors(
    kind: ResourceKind,
    components: &[String],
) -> EngineResult<Option<ParentChain>> {
    let ancestors = ancestors(kind);
    if components.len() != 2 * ancestors.len() {
        return Ok(None);
    }
    let mut parents = ParentChain::empty();
    for (index, ancestor) in ancestors.iter().enumerate() {
        let Some(directory) = ancestor.collection_directory() else {
            return Ok(None);
        };
        if components[2 * index] != directory {
            return Ok(None);
        }
        let name = match ResourceName::new(components[2 * index + 1].clone()) {
            Ok(name) => name,
            Err(_) => return Ok(None),
        };
        parents = parents.append(*ancestor, name);
    }
    Ok(Some(parents))
}

/// Last `/`-segment of a resource id; name equality across the tree and
/// the service always compares this way.
pub fn last_segment(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

/// Read and parse a resource's information file.
pub async fn read_information(
    source: &dyn FileSource,
    service_dir: &Path,
    key: &ResourceKey,
) -> EngineResult<Option<Value>> {
    let Some(path) = layout::information_file(service_dir, key) else {
        return Ok(None);
    };
    let Some(bytes) = source.read_file(&path).await? else {
        return Ok(None);
    };
    let value: Value = serde_json::from_slice(&bytes).map_err(|source| CoreError::Schema {
        kind: key.kind.singular(),
        source,
    })?;
    Ok(Some(value))
}

/// Read a policy resource's XML body.
pub async fn read_policy_body(
    source: &dyn FileSource,
    service_dir: &Path,
    key: &ResourceKey,
) -> EngineResult<Option<String>> {
    let Some(path) = layout::policy_file(service_dir, key) else {
        return Ok(None);
    };
    let Some(bytes) = source.read_file(&path).await? else {
        return Ok(None);
    };
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Probe for an API's specification file across every known extension.
pub async fn read_specification(
    source: &dyn FileSource,
    service_dir: &Path,
    key: &ResourceKey,
) -> EngineResult<Option<(ApiSpecification, String)>> {
    for specification in ApiSpecification::DISK_VARIANTS {
        let Some(path) = layout::specification_file(service_dir, key, specification.extension())
        else {
            return Ok(None);
        };
        if let Some(bytes) = source.read_file(&path).await? {
            return Ok(Some((
                specification,
                String::from_utf8_lossy(&bytes).into_owned(),
            )));
        }
    }
    Ok(None)
}

/// Whether the resource is present in the tree: an information file, a
/// policy body, or (for API kinds only) a specification file.
pub async fn is_in_file_system(
    source: &dyn FileSource,
    service_dir: &Path,
    key: &ResourceKey,
) -> EngineResult<bool> {
    if read_information(source, service_dir, key).await?.is_some() {
        return Ok(true);
    }
    if read_policy_body(source, service_dir, key).await?.is_some() {
        return Ok(true);
    }
    if key.kind.is_revisioned() && read_specification(source, service_dir, key).await?.is_some() {
        return Ok(true);
    }
    Ok(false)
}

/// The DTO to publish for `key`: the information file, with policy kinds
/// reconstituted from their side-stored XML (information file winning on
/// overlapping fields).
pub async fn read_dto(
    source: &dyn FileSource,
    service_dir: &Path,
    key: &ResourceKey,
) -> EngineResult<Option<Value>> {
    let information = read_information(source, service_dir, key).await?;
    if key.kind.policy().is_some() {
        let Some(body) = read_policy_body(source, service_dir, key).await? else {
            return Ok(information);
        };
        return Ok(Some(dto::policy_dto_from_body(&body, information.as_ref())));
    }
    Ok(information)
}
