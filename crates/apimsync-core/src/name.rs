//! Resource identity types
//!
//! Newtype wrappers addressing a resource instance: its name, the ordered
//! chain of ancestors it sits under, and the combination of both with a
//! kind. Names compare and hash case-insensitively because the management
//! API treats `Api1` and `api1` as the same resource.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::kind::ResourceKind;

/// Name of a resource instance.
///
/// Never empty or whitespace. Equality and hashing ignore ASCII case; the
/// original spelling is preserved for display and for URI/path assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceName(String);

impl ResourceName {
    /// Create a resource name, rejecting empty or whitespace input.
    pub fn new(value: impl Into<String>) -> CoreResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CoreError::EmptyResourceName);
        }
        Ok(Self(value))
    }

    /// The original spelling.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for ResourceName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for ResourceName {}

impl Hash for ResourceName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Ordered chain of `(kind, name)` ancestors, outermost first.
///
/// The empty chain addresses a service-level resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ParentChain {
    segments: Vec<(ResourceKind, ResourceName)>,
}

impl ParentChain {
    /// The empty chain.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Chain with the given segment appended as the innermost ancestor.
    pub fn append(&self, kind: ResourceKind, name: ResourceName) -> Self {
        let mut segments = self.segments.clone();
        segments.push((kind, name));
        Self { segments }
    }

    /// Chain with the given segment prepended as the outermost ancestor.
    pub fn prepend(&self, kind: ResourceKind, name: ResourceName) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push((kind, name));
        segments.extend(self.segments.iter().cloned());
        Self { segments }
    }

    /// Prefix of this chain with the given number of segments.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            segments: self.segments.iter().take(len).cloned().collect(),
        }
    }

    /// The segments, outermost first.
    pub fn segments(&self) -> &[(ResourceKind, ResourceName)] {
        &self.segments
    }

    /// The innermost `(kind, name)` pair, if any.
    pub fn innermost(&self) -> Option<&(ResourceKind, ResourceName)> {
        self.segments.last()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for ParentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (kind, name) in &self.segments {
            write!(f, "/{}/{}", kind.collection_uri_segment(), name)?;
        }
        Ok(())
    }
}

/// Addressable resource instance: `(kind, name, parents)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: ResourceName,
    pub parents: ParentChain,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: ResourceName, parents: ParentChain) -> Self {
        Self {
            kind,
            name,
            parents,
        }
    }

    /// Key for a root-level resource (empty parent chain).
    pub fn root(kind: ResourceKind, name: ResourceName) -> Self {
        Self::new(kind, name, ParentChain::empty())
    }

    /// Key for this resource's parent, when the chain is non-empty.
    pub fn parent_key(&self) -> Option<ResourceKey> {
        let (kind, name) = self.parents.innermost()?;
        Some(ResourceKey::new(
            *kind,
            name.clone(),
            self.parents.prefix(self.parents.len() - 1),
        ))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.parents,
            self.kind.collection_uri_segment(),
            self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_reject_empty_and_whitespace() {
        assert!(ResourceName::new("").is_err());
        assert!(ResourceName::new("   ").is_err());
        assert!(ResourceName::new("\t\n").is_err());
        assert!(ResourceName::new("api1").is_ok());
    }

    #[test]
    fn names_compare_case_insensitively() {
        let a = ResourceName::new("MyApi").unwrap();
        let b = ResourceName::new("myapi").unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn names_preserve_spelling() {
        let name = ResourceName::new("MyApi").unwrap();
        assert_eq!(name.as_str(), "MyApi");
        assert_eq!(name.to_string(), "MyApi");
    }

    #[test]
    fn chain_append_and_prefix() {
        let api = ResourceName::new("api1").unwrap();
        let op = ResourceName::new("getOrders").unwrap();
        let chain = ParentChain::empty()
            .append(ResourceKind::Api, api.clone())
            .append(ResourceKind::ApiOperation, op);

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.prefix(1).segments(), &[(ResourceKind::Api, api)]);
        assert!(chain.prefix(0).is_empty());
    }

    #[test]
    fn chain_equality_is_elementwise_and_case_insensitive() {
        let a = ParentChain::empty().append(
            ResourceKind::Product,
            ResourceName::new("Starter").unwrap(),
        );
        let b = ParentChain::empty().append(
            ResourceKind::Product,
            ResourceName::new("starter").unwrap(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn key_canonical_form() {
        let key = ResourceKey::new(
            ResourceKind::ApiPolicy,
            ResourceName::new("policy").unwrap(),
            ParentChain::empty().append(ResourceKind::Api, ResourceName::new("api1").unwrap()),
        );
        assert_eq!(key.to_string(), "/apis/api1/policies/policy");
    }

    #[test]
    fn parent_key_walks_up() {
        let key = ResourceKey::new(
            ResourceKind::ApiOperationPolicy,
            ResourceName::new("policy").unwrap(),
            ParentChain::empty()
                .append(ResourceKind::Api, ResourceName::new("api1").unwrap())
                .append(
                    ResourceKind::ApiOperation,
                    ResourceName::new("getOrders").unwrap(),
                ),
        );
        let parent = key.parent_key().unwrap();
        assert_eq!(parent.kind, ResourceKind::ApiOperation);
        assert_eq!(parent.name.as_str(), "getOrders");
        assert_eq!(parent.parents.len(), 1);

        let grandparent = parent.parent_key().unwrap();
        assert_eq!(grandparent.kind, ResourceKind::Api);
        assert!(grandparent.parent_key().is_none());
    }
}
