//! Resource kind registry
//!
//! The closed catalogue of resource kinds the engine understands, with their
//! capability facets: where they live on disk, how they appear on the wire,
//! which parent they nest under, which composite/link relationships they
//! express, and which reference properties point at other resources.
//!
//! Facets are modelled as accessor methods over a flat enum rather than a
//! trait hierarchy; orchestrator code dispatches on the facet it needs
//! (`policy()`, `link()`, `parent()`) and stays agnostic of concrete kinds.

use std::fmt;

/// A kind of managed resource in the API Management service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    NamedValue,
    Tag,
    Gateway,
    GatewayApi,
    VersionSet,
    Backend,
    Logger,
    Diagnostic,
    PolicyFragment,
    ServicePolicy,
    Product,
    ProductPolicy,
    ProductGroup,
    ProductTag,
    ProductApi,
    Group,
    Subscription,
    Api,
    ApiPolicy,
    ApiTag,
    ApiDiagnostic,
    ApiOperation,
    ApiOperationPolicy,
    ApiRelease,
    Workspace,
    WorkspaceNamedValue,
    WorkspaceTag,
    WorkspaceVersionSet,
    WorkspaceBackend,
    WorkspacePolicyFragment,
    WorkspacePolicy,
    WorkspaceProduct,
    WorkspaceProductPolicy,
    WorkspaceProductGroup,
    WorkspaceGroup,
    WorkspaceSubscription,
    WorkspaceApi,
    WorkspaceApiPolicy,
    WorkspaceApiRelease,
}

/// Composite relationship: the kind's identity is "secondary under primary".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Composite {
    pub primary: ResourceKind,
    pub secondary: ResourceKind,
}

/// Link payload for composites whose DTO carries the secondary's resource id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// JSON property under `properties` holding the secondary's absolute id.
    pub dto_property: &'static str,
}

/// Where a policy kind's XML body lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyPlacement {
    /// `<serviceDir>/<name>.xml`.
    Service,
    /// `<parentDir>/<name>.xml`.
    PerParent,
    /// `<collectionDir>/<name>/policy.xml`, next to the information file.
    Fragment,
}

/// A reference-typed DTO property pointing at another resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub kind: ResourceKind,
    /// Property under `properties` carrying the absolute resource id.
    pub property: &'static str,
    pub mandatory: bool,
}

use ResourceKind::*;

impl ResourceKind {
    /// Every kind, in registry declaration order.
    pub const ALL: [ResourceKind; 39] = [
        NamedValue,
        Tag,
        Gateway,
        GatewayApi,
        VersionSet,
        Backend,
        Logger,
        Diagnostic,
        PolicyFragment,
        ServicePolicy,
        Product,
        ProductPolicy,
        ProductGroup,
        ProductTag,
        ProductApi,
        Group,
        Subscription,
        Api,
        ApiPolicy,
        ApiTag,
        ApiDiagnostic,
        ApiOperation,
        ApiOperationPolicy,
        ApiRelease,
        Workspace,
        WorkspaceNamedValue,
        WorkspaceTag,
        WorkspaceVersionSet,
        WorkspaceBackend,
        WorkspacePolicyFragment,
        WorkspacePolicy,
        WorkspaceProduct,
        WorkspaceProductPolicy,
        WorkspaceProductGroup,
        WorkspaceGroup,
        WorkspaceSubscription,
        WorkspaceApi,
        WorkspaceApiPolicy,
        WorkspaceApiRelease,
    ];

    /// Plural noun, used as the configuration section name.
    pub fn plural(self) -> &'static str {
        match self {
            NamedValue | WorkspaceNamedValue => "namedValues",
            Tag | WorkspaceTag | ProductTag | ApiTag => "tags",
            Gateway => "gateways",
            GatewayApi | ProductApi => "apiLinks",
            VersionSet | WorkspaceVersionSet => "versionSets",
            Backend | WorkspaceBackend => "backends",
            Logger => "loggers",
            Diagnostic | ApiDiagnostic => "diagnostics",
            PolicyFragment | WorkspacePolicyFragment => "policyFragments",
            ServicePolicy | ProductPolicy | ApiPolicy | ApiOperationPolicy | WorkspacePolicy
            | WorkspaceProductPolicy | WorkspaceApiPolicy => "policies",
            Product | WorkspaceProduct => "products",
            ProductGroup | WorkspaceProductGroup => "groupLinks",
            Group | WorkspaceGroup => "groups",
            Subscription | WorkspaceSubscription => "subscriptions",
            Api | WorkspaceApi => "apis",
            ApiOperation => "operations",
            ApiRelease | WorkspaceApiRelease => "releases",
            Workspace => "workspaces",
        }
    }

    /// Singular noun.
    pub fn singular(self) -> &'static str {
        match self {
            NamedValue | WorkspaceNamedValue => "named value",
            Tag | WorkspaceTag | ProductTag | ApiTag => "tag",
            Gateway => "gateway",
            GatewayApi | ProductApi => "api link",
            VersionSet | WorkspaceVersionSet => "version set",
            Backend | WorkspaceBackend => "backend",
            Logger => "logger",
            Diagnostic | ApiDiagnostic => "diagnostic",
            PolicyFragment | WorkspacePolicyFragment => "policy fragment",
            ServicePolicy | ProductPolicy | ApiPolicy | ApiOperationPolicy | WorkspacePolicy
            | WorkspaceProductPolicy | WorkspaceApiPolicy => "policy",
            Product | WorkspaceProduct => "product",
            ProductGroup | WorkspaceProductGroup => "group link",
            Group | WorkspaceGroup => "group",
            Subscription | WorkspaceSubscription => "subscription",
            Api | WorkspaceApi => "api",
            ApiOperation => "operation",
            ApiRelease | WorkspaceApiRelease => "release",
            Workspace => "workspace",
        }
    }

    /// URI segment for the kind's collection endpoint.
    ///
    /// Link kinds use the fixed `<secondary singular>Links` segment.
    pub fn collection_uri_segment(self) -> &'static str {
        match self {
            NamedValue | WorkspaceNamedValue => "namedValues",
            Tag | WorkspaceTag | ProductTag | ApiTag => "tags",
            Gateway => "gateways",
            GatewayApi | ProductApi => "apiLinks",
            VersionSet | WorkspaceVersionSet => "apiVersionSets",
            Backend | WorkspaceBackend => "backends",
            Logger => "loggers",
            Diagnostic | ApiDiagnostic => "diagnostics",
            PolicyFragment | WorkspacePolicyFragment => "policyFragments",
            ServicePolicy | ProductPolicy | ApiPolicy | ApiOperationPolicy | WorkspacePolicy
            | WorkspaceProductPolicy | WorkspaceApiPolicy => "policies",
            Product | WorkspaceProduct => "products",
            ProductGroup | WorkspaceProductGroup => "groupLinks",
            Group | WorkspaceGroup => "groups",
            Subscription | WorkspaceSubscription => "subscriptions",
            Api | WorkspaceApi => "apis",
            ApiOperation => "operations",
            ApiRelease | WorkspaceApiRelease => "releases",
            Workspace => "workspaces",
        }
    }

    /// Collection directory name on disk, for kinds that occupy a subtree.
    ///
    /// Per-parent and service-level policies store a single XML file in the
    /// parent (or service) directory and have no collection directory.
    pub fn collection_directory(self) -> Option<&'static str> {
        match self {
            NamedValue | WorkspaceNamedValue => Some("named values"),
            Tag | WorkspaceTag | ProductTag | ApiTag => Some("tags"),
            Gateway => Some("gateways"),
            GatewayApi | ProductApi => Some("api links"),
            VersionSet | WorkspaceVersionSet => Some("version sets"),
            Backend | WorkspaceBackend => Some("backends"),
            Logger => Some("loggers"),
            Diagnostic | ApiDiagnostic => Some("diagnostics"),
            PolicyFragment | WorkspacePolicyFragment => Some("policy fragments"),
            Product | WorkspaceProduct => Some("products"),
            ProductGroup | WorkspaceProductGroup => Some("group links"),
            Group | WorkspaceGroup => Some("groups"),
            Subscription | WorkspaceSubscription => Some("subscriptions"),
            Api | WorkspaceApi => Some("apis"),
            ApiOperation => Some("operations"),
            ApiRelease | WorkspaceApiRelease => Some("releases"),
            Workspace => Some("workspaces"),
            ServicePolicy | ProductPolicy | ApiPolicy | ApiOperationPolicy | WorkspacePolicy
            | WorkspaceProductPolicy | WorkspaceApiPolicy => None,
        }
    }

    /// Information-file name inside the per-instance directory.
    pub fn information_file(self) -> Option<&'static str> {
        match self {
            NamedValue | WorkspaceNamedValue => Some("namedValueInformation.json"),
            Tag | WorkspaceTag | ProductTag | ApiTag => Some("tagInformation.json"),
            Gateway => Some("gatewayInformation.json"),
            GatewayApi | ProductApi => Some("apiLinkInformation.json"),
            VersionSet | WorkspaceVersionSet => Some("apiVersionSetInformation.json"),
            Backend | WorkspaceBackend => Some("backendInformation.json"),
            Logger => Some("loggerInformation.json"),
            Diagnostic | ApiDiagnostic => Some("diagnosticInformation.json"),
            PolicyFragment | WorkspacePolicyFragment => Some("policyFragmentInformation.json"),
            Product | WorkspaceProduct => Some("productInformation.json"),
            ProductGroup | WorkspaceProductGroup => Some("groupLinkInformation.json"),
            Group | WorkspaceGroup => Some("groupInformation.json"),
            Subscription | WorkspaceSubscription => Some("subscriptionInformation.json"),
            Api | WorkspaceApi => Some("apiInformation.json"),
            ApiRelease | WorkspaceApiRelease => Some("apiReleaseInformation.json"),
            Workspace => Some("workspaceInformation.json"),
            ApiOperation
            | ServicePolicy
            | ProductPolicy
            | ApiPolicy
            | ApiOperationPolicy
            | WorkspacePolicy
            | WorkspaceProductPolicy
            | WorkspaceApiPolicy => None,
        }
    }

    /// True when the kind has a wire DTO.
    ///
    /// Operations are defined by the API specification and carry none.
    pub fn has_dto(self) -> bool {
        self != ApiOperation
    }

    /// Declared parent, for kinds that only occur nested under one.
    pub fn parent(self) -> Option<ResourceKind> {
        match self {
            ProductPolicy => Some(Product),
            ApiPolicy | ApiDiagnostic | ApiOperation | ApiRelease => Some(Api),
            ApiOperationPolicy => Some(ApiOperation),
            WorkspaceNamedValue | WorkspaceTag | WorkspaceVersionSet | WorkspaceBackend
            | WorkspacePolicyFragment | WorkspacePolicy | WorkspaceProduct | WorkspaceGroup
            | WorkspaceSubscription | WorkspaceApi => Some(Workspace),
            WorkspaceProductPolicy => Some(WorkspaceProduct),
            WorkspaceApiPolicy | WorkspaceApiRelease => Some(WorkspaceApi),
            _ => None,
        }
    }

    /// Composite relationship, for kinds whose identity is
    /// "secondary under primary".
    pub fn composite(self) -> Option<Composite> {
        match self {
            GatewayApi => Some(Composite {
                primary: Gateway,
                secondary: Api,
            }),
            ProductGroup => Some(Composite {
                primary: Product,
                secondary: Group,
            }),
            ProductTag => Some(Composite {
                primary: Product,
                secondary: Tag,
            }),
            ProductApi => Some(Composite {
                primary: Product,
                secondary: Api,
            }),
            ApiTag => Some(Composite {
                primary: Api,
                secondary: Tag,
            }),
            WorkspaceProductGroup => Some(Composite {
                primary: WorkspaceProduct,
                secondary: WorkspaceGroup,
            }),
            _ => None,
        }
    }

    /// Link payload, for composites whose DTO carries the secondary's id.
    pub fn link(self) -> Option<Link> {
        match self {
            GatewayApi | ProductApi => Some(Link {
                dto_property: "apiId",
            }),
            ProductGroup | WorkspaceProductGroup => Some(Link {
                dto_property: "groupId",
            }),
            _ => None,
        }
    }

    /// Policy placement, for kinds whose XML body is side-stored.
    pub fn policy(self) -> Option<PolicyPlacement> {
        match self {
            ServicePolicy => Some(PolicyPlacement::Service),
            ProductPolicy | ApiPolicy | ApiOperationPolicy | WorkspacePolicy
            | WorkspaceProductPolicy | WorkspaceApiPolicy => Some(PolicyPlacement::PerParent),
            PolicyFragment | WorkspacePolicyFragment => Some(PolicyPlacement::Fragment),
            _ => None,
        }
    }

    /// Reference properties carrying absolute resource ids.
    pub fn references(self) -> &'static [Reference] {
        match self {
            Diagnostic | ApiDiagnostic => &[Reference {
                kind: Logger,
                property: "loggerId",
                mandatory: true,
            }],
            Api => &[Reference {
                kind: VersionSet,
                property: "apiVersionSetId",
                mandatory: false,
            }],
            WorkspaceApi => &[Reference {
                kind: WorkspaceVersionSet,
                property: "apiVersionSetId",
                mandatory: false,
            }],
            Subscription => &[
                Reference {
                    kind: Product,
                    property: "scope",
                    mandatory: false,
                },
                Reference {
                    kind: Api,
                    property: "scope",
                    mandatory: false,
                },
            ],
            WorkspaceSubscription => &[Reference {
                kind: WorkspaceProduct,
                property: "scope",
                mandatory: false,
            }],
            _ => &[],
        }
    }

    /// True for the revision-carrying API kinds.
    pub fn is_revisioned(self) -> bool {
        matches!(self, Api | WorkspaceApi)
    }

    /// True for the release kinds that flip an API's current revision.
    pub fn is_release(self) -> bool {
        matches!(self, ApiRelease | WorkspaceApiRelease)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

/// Reserved instance names the tools never create or delete.
pub mod reserved {
    use super::ResourceKind;

    /// System-created subscription covering every product.
    pub const MASTER_SUBSCRIPTION: &str = "master";

    /// System-created groups present in every service.
    pub const SYSTEM_GROUPS: [&str; 3] = ["administrators", "developers", "guests"];

    /// True when the `(kind, name)` pair names a system-reserved resource.
    pub fn is_reserved(kind: ResourceKind, name: &str) -> bool {
        match kind {
            ResourceKind::Subscription | ResourceKind::WorkspaceSubscription => {
                name.eq_ignore_ascii_case(MASTER_SUBSCRIPTION)
            }
            ResourceKind::Group | ResourceKind::WorkspaceGroup => SYSTEM_GROUPS
                .iter()
                .any(|group| name.eq_ignore_ascii_case(group)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_and_composite_are_exclusive() {
        for kind in ResourceKind::ALL {
            assert!(
                !(kind.parent().is_some() && kind.composite().is_some()),
                "{kind:?} declares both a parent and a composite relationship"
            );
        }
    }

    #[test]
    fn links_are_composites_with_secondary_singular_segment() {
        for kind in ResourceKind::ALL {
            if let Some(link) = kind.link() {
                let composite = kind
                    .composite()
                    .unwrap_or_else(|| panic!("{kind:?} is a link but not a composite"));
                let expected = format!("{}Links", composite.secondary.singular().replace(' ', ""));
                assert_eq!(
                    kind.collection_uri_segment(),
                    expected,
                    "{kind:?} link segment"
                );
                assert!(!link.dto_property.is_empty());
            }
        }
    }

    #[test]
    fn policy_kinds_use_policies_plural() {
        for kind in [
            ServicePolicy,
            ProductPolicy,
            ApiPolicy,
            ApiOperationPolicy,
            WorkspacePolicy,
            WorkspaceProductPolicy,
            WorkspaceApiPolicy,
        ] {
            assert_eq!(kind.plural(), "policies");
            assert!(kind.policy().is_some());
        }
    }

    #[test]
    fn information_file_implies_directory() {
        for kind in ResourceKind::ALL {
            if kind.information_file().is_some() {
                assert!(
                    kind.collection_directory().is_some(),
                    "{kind:?} has an information file but no collection directory"
                );
            }
        }
    }

    #[test]
    fn reserved_names_match_case_insensitively() {
        assert!(reserved::is_reserved(Subscription, "Master"));
        assert!(reserved::is_reserved(Group, "Developers"));
        assert!(!reserved::is_reserved(Product, "master"));
        assert!(!reserved::is_reserved(Group, "partners"));
    }
}
