//! Resource graph
//!
//! Two distinct edge sets over [`ResourceKind`]:
//!
//! - *Traversal* edges form a forest: a kind's predecessor is its parent
//!   (child kinds) or its primary (composites); kinds without one are roots.
//!   The extractor walks this forest top-down.
//! - *Dependency* edges form a DAG: traversal edges plus reference targets
//!   plus the policy → named-value rule. The publisher orders operations
//!   along these.

use crate::kind::ResourceKind;

/// Kinds whose resources must exist before a resource of `kind` can.
///
/// Derived from the facets: the declared parent, both halves of a composite,
/// every reference target, and (for policy kinds) the named-value kind,
/// since policy XML may interpolate named values.
pub fn dependencies_of(kind: ResourceKind) -> Vec<ResourceKind> {
    let mut dependencies = Vec::new();

    if let Some(parent) = kind.parent() {
        dependencies.push(parent);
    }
    if let Some(composite) = kind.composite() {
        dependencies.push(composite.primary);
        dependencies.push(composite.secondary);
    }
    for reference in kind.references() {
        dependencies.push(reference.kind);
    }
    if kind.policy().is_some() {
        dependencies.push(ResourceKind::NamedValue);
    }

    dependencies.sort();
    dependencies.dedup();
    dependencies
}

/// Traversal predecessor: the parent for child kinds, the primary for
/// composites, none for roots.
pub fn predecessor_of(kind: ResourceKind) -> Option<ResourceKind> {
    kind.parent().or_else(|| kind.composite().map(|c| c.primary))
}

/// Kinds whose traversal predecessor is `kind`.
pub fn successors_of(kind: ResourceKind) -> Vec<ResourceKind> {
    ResourceKind::ALL
        .into_iter()
        .filter(|candidate| predecessor_of(*candidate) == Some(kind))
        .collect()
}

/// Roots of the traversal forest.
pub fn root_kinds() -> Vec<ResourceKind> {
    ResourceKind::ALL
        .into_iter()
        .filter(|kind| predecessor_of(*kind).is_none())
        .collect()
}

/// All kinds ordered so every kind appears after its dependencies.
///
/// Deterministic: ties break on registry declaration order. The file parser
/// walks this in reverse so the most derived kinds are tried first.
pub fn topological_order() -> Vec<ResourceKind> {
    let mut order = Vec::with_capacity(ResourceKind::ALL.len());
    let mut visited = [false; ResourceKind::ALL.len()];

    fn visit(kind: ResourceKind, visited: &mut [bool], order: &mut Vec<ResourceKind>) {
        let index = ResourceKind::ALL
            .iter()
            .position(|k| *k == kind)
            .expect("kind present in registry");
        if visited[index] {
            return;
        }
        visited[index] = true;
        for dependency in dependencies_of(kind) {
            visit(dependency, visited, order);
        }
        order.push(kind);
    }

    for kind in ResourceKind::ALL {
        visit(kind, &mut visited, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceKind::*;

    #[test]
    fn policies_depend_on_named_values() {
        for kind in ResourceKind::ALL {
            if kind.policy().is_some() {
                assert!(
                    dependencies_of(kind).contains(&NamedValue),
                    "{kind:?} must depend on named values"
                );
            }
        }
    }

    #[test]
    fn composites_depend_on_both_halves() {
        let deps = dependencies_of(ProductApi);
        assert!(deps.contains(&Product));
        assert!(deps.contains(&Api));
    }

    #[test]
    fn references_become_dependencies() {
        assert!(dependencies_of(Diagnostic).contains(&Logger));
        assert!(dependencies_of(Api).contains(&VersionSet));
    }

    #[test]
    fn roots_have_no_predecessor() {
        let roots = root_kinds();
        assert!(roots.contains(&Api));
        assert!(roots.contains(&Product));
        assert!(roots.contains(&Workspace));
        assert!(!roots.contains(&ApiPolicy));
        assert!(!roots.contains(&ProductApi));
        for root in roots {
            assert_eq!(predecessor_of(root), None);
        }
    }

    #[test]
    fn successors_invert_predecessors() {
        for kind in ResourceKind::ALL {
            for successor in successors_of(kind) {
                assert_eq!(predecessor_of(successor), Some(kind));
            }
            if let Some(predecessor) = predecessor_of(kind) {
                assert!(successors_of(predecessor).contains(&kind));
            }
        }
    }

    #[test]
    fn api_successors_include_operations_and_releases() {
        let successors = successors_of(Api);
        assert!(successors.contains(&ApiPolicy));
        assert!(successors.contains(&ApiOperation));
        assert!(successors.contains(&ApiRelease));
        assert!(successors.contains(&ApiTag));
    }

    #[test]
    fn topological_order_is_complete_and_consistent() {
        let order = topological_order();
        assert_eq!(order.len(), ResourceKind::ALL.len());

        let position = |kind: ResourceKind| order.iter().position(|k| *k == kind).unwrap();
        for kind in ResourceKind::ALL {
            for dependency in dependencies_of(kind) {
                assert!(
                    position(dependency) < position(kind),
                    "{dependency:?} must precede {kind:?}"
                );
            }
        }
    }
}
