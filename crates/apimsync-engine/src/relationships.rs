//! Publisher relationships
//!
//! Builds the predecessor/successor multimaps the publisher orders work
//! with. Every resource parsed out of a tree contributes edges for its
//! parent, its composite halves, each reference property present in its
//! DTO, and (for revisioned API names) the root API it derives from.
//!
//! The maps are validated before use: both sides closed over the same key
//! set, every edge mutual, and the successor graph acyclic. Failures are
//! aggregated into one error carrying every message.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::Value;

use apimsync_core::graph;
use apimsync_core::kind::ResourceKind;
use apimsync_core::name::{ParentChain, ResourceKey, ResourceName};
use apimsync_core::revision;

use crate::error::{EngineError, EngineResult};
use crate::parse;
use crate::source::FileSource;

/// Predecessor/successor multimaps over the resources of one tree.
#[derive(Debug, Default)]
pub struct Relationships {
    predecessors: HashMap<ResourceKey, HashSet<ResourceKey>>,
    successors: HashMap<ResourceKey, HashSet<ResourceKey>>,
}

impl Relationships {
    /// An empty relationship set (used when there is no previous commit).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate raw maps into a usable relationship set.
    pub fn validated(
        predecessors: HashMap<ResourceKey, HashSet<ResourceKey>>,
        successors: HashMap<ResourceKey, HashSet<ResourceKey>>,
    ) -> EngineResult<Self> {
        let mut messages = Vec::new();
        validate_closure(&predecessors, &successors, &mut messages);
        validate_mutuality(&predecessors, &successors, &mut messages);
        validate_acyclic(&successors, &mut messages);

        if messages.is_empty() {
            Ok(Self {
                predecessors,
                successors,
            })
        } else {
            messages.sort();
            Err(EngineError::RelationshipValidation { messages })
        }
    }

    /// Predecessors of `key`; empty for unregistered keys.
    pub fn predecessors_of(&self, key: &ResourceKey) -> impl Iterator<Item = &ResourceKey> {
        self.predecessors.get(key).into_iter().flatten()
    }

    /// Successors of `key`; empty for unregistered keys.
    pub fn successors_of(&self, key: &ResourceKey) -> impl Iterator<Item = &ResourceKey> {
        self.successors.get(key).into_iter().flatten()
    }

    /// Every registered key.
    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.predecessors.keys()
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.predecessors.contains_key(key)
    }
}

/// Accumulates edges, registering both endpoints of every pair.
#[derive(Debug, Default)]
pub struct RelationshipsBuilder {
    predecessors: HashMap<ResourceKey, HashSet<ResourceKey>>,
    successors: HashMap<ResourceKey, HashSet<ResourceKey>>,
}

impl RelationshipsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key with no edges.
    pub fn register(&mut self, key: &ResourceKey) {
        self.predecessors.entry(key.clone()).or_default();
        self.successors.entry(key.clone()).or_default();
    }

    /// Record that `successor` depends on `predecessor`.
    pub fn edge(&mut self, predecessor: &ResourceKey, successor: &ResourceKey) {
        self.register(predecessor);
        self.register(successor);
        self.predecessors
            .get_mut(successor)
            .expect("registered above")
            .insert(predecessor.clone());
        self.successors
            .get_mut(predecessor)
            .expect("registered above")
            .insert(successor.clone());
    }

    pub fn build(self) -> EngineResult<Relationships> {
        Relationships::validated(self.predecessors, self.successors)
    }
}

/// Parse every file of a tree into resource keys, deduplicated.
pub async fn scan(source: &dyn FileSource, service_dir: &Path) -> EngineResult<Vec<ResourceKey>> {
    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    for path in source.service_files().await? {
        if let Some(key) = parse::parse_file(source, service_dir, &path).await? {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }
    Ok(keys)
}

/// Build validated relationships over the given keys, reading DTOs from
/// the source to resolve link and reference edges.
pub async fn build(
    source: &dyn FileSource,
    service_dir: &Path,
    keys: &[ResourceKey],
) -> EngineResult<Relationships> {
    let mut builder = RelationshipsBuilder::new();

    for key in keys {
        builder.register(key);

        if key.kind.parent().is_some() {
            if let Some(parent) = key.parent_key() {
                builder.edge(&parent, key);
            }
        }

        // successive ancestors order each other too, so ordering holds
        // across intermediate resources that have no file of their own
        // (an operation between an API and its operation policy)
        let mut ancestor: Option<ResourceKey> = None;
        for depth in 0..key.parents.len() {
            let (kind, name) = &key.parents.segments()[depth];
            let node = ResourceKey::new(*kind, name.clone(), key.parents.prefix(depth));
            if let Some(outer) = &ancestor {
                builder.edge(outer, &node);
            }
            ancestor = Some(node);
        }

        if let Some(composite) = key.kind.composite() {
            if let Some(primary) = key.parent_key() {
                builder.edge(&primary, key);
            }
            let secondary = secondary_key(source, service_dir, key, composite.secondary).await?;
            builder.edge(&secondary, key);
        }

        if !key.kind.references().is_empty() {
            let dto = parse::read_dto(source, service_dir, key).await?;
            if let Some(dto) = dto {
                for reference in key.kind.references() {
                    if let Some(target) = reference_key(key, reference.kind, reference.property, &dto)
                    {
                        builder.edge(&target, key);
                    }
                }
            }
        }

        if key.kind.is_revisioned() && !revision::is_root_name(key.name.as_str()) {
            let root = ResourceKey::new(
                key.kind,
                ResourceName::new(revision::root_name(key.name.as_str()))
                    .expect("root of a valid name is valid"),
                key.parents.clone(),
            );
            builder.edge(&root, key);
        }
    }

    builder.build()
}

/// Key of a composite's secondary half. Links carry the secondary's id in
/// their DTO; plain composites are named after the secondary directly.
async fn secondary_key(
    source: &dyn FileSource,
    service_dir: &Path,
    key: &ResourceKey,
    secondary: ResourceKind,
) -> EngineResult<ResourceKey> {
    let chain = reference_chain(&key.parents, secondary).ok_or_else(|| {
        EngineError::MissingSecondary {
            key: key.to_string(),
        }
    })?;

    let name = if let Some(link) = key.kind.link() {
        let dto = parse::read_dto(source, service_dir, key).await?;
        dto.as_ref()
            .and_then(|dto| dto.get("properties"))
            .and_then(|properties| properties.get(link.dto_property))
            .and_then(Value::as_str)
            .map(|id| parse::last_segment(id).to_string())
            .unwrap_or_else(|| key.name.to_string())
    } else {
        key.name.to_string()
    };

    let name = ResourceName::new(name).map_err(|_| EngineError::MissingSecondary {
        key: key.to_string(),
    })?;
    Ok(ResourceKey::new(secondary, name, chain))
}

/// Key of a referenced resource, when the id in `property` plausibly
/// points at `target` (its penultimate segment must be the target's
/// collection segment; a subscription scoped to a product never yields a
/// phantom API edge).
fn reference_key(
    key: &ResourceKey,
    target: ResourceKind,
    property: &str,
    dto: &Value,
) -> Option<ResourceKey> {
    let id = dto.get("properties")?.get(property)?.as_str()?;
    let mut segments = id.rsplit('/');
    let name = segments.next()?;
    let collection = segments.next()?;
    if !collection.eq_ignore_ascii_case(target.collection_uri_segment()) {
        return None;
    }
    let chain = reference_chain(&key.parents, target)?;
    let name = ResourceName::new(name).ok()?;
    Some(ResourceKey::new(target, name, chain))
}

/// Longest prefix of `current` matching the target kind's traversal
/// ancestor hierarchy.
fn reference_chain(current: &ParentChain, target: ResourceKind) -> Option<ParentChain> {
    let mut ancestor_kinds = Vec::new();
    let mut cursor = graph::predecessor_of(target);
    while let Some(kind) = cursor {
        ancestor_kinds.push(kind);
        cursor = graph::predecessor_of(kind);
    }
    ancestor_kinds.reverse();

    if current.len() < ancestor_kinds.len() {
        return None;
    }
    for (index, kind) in ancestor_kinds.iter().enumerate() {
        if current.segments()[index].0 != *kind {
            return None;
        }
    }
    Some(current.prefix(ancestor_kinds.len()))
}

fn validate_closure(
    predecessors: &HashMap<ResourceKey, HashSet<ResourceKey>>,
    successors: &HashMap<ResourceKey, HashSet<ResourceKey>>,
    messages: &mut Vec<String>,
) {
    for (owner, referenced) in predecessors
        .iter()
        .map(|(k, v)| (k, v))
        .chain(successors.iter().map(|(k, v)| (k, v)))
    {
        for key in referenced.iter().chain(std::iter::once(owner)) {
            if !predecessors.contains_key(key) {
                messages.push(format!("'{key}' is referenced but missing from predecessors"));
            }
            if !successors.contains_key(key) {
                messages.push(format!("'{key}' is referenced but missing from successors"));
            }
        }
    }
}

fn validate_mutuality(
    predecessors: &HashMap<ResourceKey, HashSet<ResourceKey>>,
    successors: &HashMap<ResourceKey, HashSet<ResourceKey>>,
    messages: &mut Vec<String>,
) {
    for (successor, keys) in predecessors {
        for predecessor in keys {
            let mutual = successors
                .get(predecessor)
                .is_some_and(|set| set.contains(successor));
            if !mutual {
                messages.push(format!(
                    "'{predecessor}' precedes '{successor}' but the successor edge is missing"
                ));
            }
        }
    }
    for (predecessor, keys) in successors {
        for successor in keys {
            let mutual = predecessors
                .get(successor)
                .is_some_and(|set| set.contains(predecessor));
            if !mutual {
                messages.push(format!(
                    "'{successor}' follows '{predecessor}' but the predecessor edge is missing"
                ));
            }
        }
    }
}

/// Depth-first colouring; a grey re-entry reports the cycle path from the
/// first occurrence of the re-entered vertex.
fn validate_acyclic(
    successors: &HashMap<ResourceKey, HashSet<ResourceKey>>,
    messages: &mut Vec<String>,
) {
    #[derive(Clone, Copy, PartialEq)]
    enum Colour {
        White,
        Grey,
        Black,
    }

    let mut colours: HashMap<&ResourceKey, Colour> =
        successors.keys().map(|key| (key, Colour::White)).collect();

    fn visit<'a>(
        key: &'a ResourceKey,
        successors: &'a HashMap<ResourceKey, HashSet<ResourceKey>>,
        colours: &mut HashMap<&'a ResourceKey, Colour>,
        path: &mut Vec<&'a ResourceKey>,
        messages: &mut Vec<String>,
    ) {
        colours.insert(key, Colour::Grey);
        path.push(key);
        if let Some(next) = successors.get(key) {
            let mut ordered: Vec<&ResourceKey> = next.iter().collect();
            ordered.sort_by_key(|key| key.to_string());
            for successor in ordered {
                match colours.get(successor).copied().unwrap_or(Colour::White) {
                    Colour::White => visit(successor, successors, colours, path, messages),
                    Colour::Grey => {
                        let start = path
                            .iter()
                            .position(|visited| *visited == successor)
                            .unwrap_or(0);
                        let cycle: Vec<String> = path[start..]
                            .iter()
                            .map(|key| key.to_string())
                            .chain(std::iter::once(successor.to_string()))
                            .collect();
                        messages.push(format!("cycle detected: {}", cycle.join(" -> ")));
                    }
                    Colour::Black => {}
                }
            }
        }
        path.pop();
        colours.insert(key, Colour::Black);
    }

    let mut roots: Vec<&ResourceKey> = successors.keys().collect();
    roots.sort_by_key(|key| key.to_string());
    for key in roots {
        if colours.get(key) == Some(&Colour::White) {
            let mut path = Vec::new();
            visit(key, successors, &mut colours, &mut path, messages);
        }
    }
}
