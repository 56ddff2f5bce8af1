//! API specification formats
//!
//! Tagged representation of the specification document attached to an API,
//! plus the mappings to file extensions and to the export/import format
//! identifiers the management service understands.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Serialization format of an OpenAPI document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenApiFormat {
    Json,
    Yaml,
}

/// OpenAPI specification version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenApiVersion {
    V2,
    V3,
}

/// Specification variant attached to an API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiSpecification {
    GraphQl,
    Wadl,
    Wsdl,
    OpenApi {
        format: OpenApiFormat,
        version: OpenApiVersion,
    },
}

impl ApiSpecification {
    /// The variants distinguishable by their on-disk extension, used when
    /// probing which specification file exists for an API. One entry per
    /// extension: OpenAPI v2 documents share the v3 extensions (the
    /// version marker lives in the document) and resolve to v3 here, like
    /// [`ApiSpecification::from_extension`].
    pub const DISK_VARIANTS: [ApiSpecification; 5] = [
        ApiSpecification::GraphQl,
        ApiSpecification::Wadl,
        ApiSpecification::Wsdl,
        ApiSpecification::OpenApi {
            format: OpenApiFormat::Json,
            version: OpenApiVersion::V3,
        },
        ApiSpecification::OpenApi {
            format: OpenApiFormat::Yaml,
            version: OpenApiVersion::V3,
        },
    ];

    /// Default when `API_SPECIFICATION_FORMAT` is unset: OpenAPI v3 YAML.
    pub fn default_openapi() -> Self {
        ApiSpecification::OpenApi {
            format: OpenApiFormat::Yaml,
            version: OpenApiVersion::V3,
        }
    }

    /// File extension of `specification.<ext>`.
    pub fn extension(self) -> &'static str {
        match self {
            ApiSpecification::GraphQl => "graphql",
            ApiSpecification::Wadl => "wadl",
            ApiSpecification::Wsdl => "wsdl",
            ApiSpecification::OpenApi {
                format: OpenApiFormat::Json,
                ..
            } => "json",
            ApiSpecification::OpenApi {
                format: OpenApiFormat::Yaml,
                ..
            } => "yaml",
        }
    }

    /// Variant matching a `specification.<ext>` file name, if any.
    ///
    /// JSON and YAML extensions resolve to OpenAPI v3; the stored document
    /// carries its own version marker.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "graphql" => Some(ApiSpecification::GraphQl),
            "wadl" => Some(ApiSpecification::Wadl),
            "wsdl" => Some(ApiSpecification::Wsdl),
            "json" => Some(ApiSpecification::OpenApi {
                format: OpenApiFormat::Json,
                version: OpenApiVersion::V3,
            }),
            "yaml" => Some(ApiSpecification::OpenApi {
                format: OpenApiFormat::Yaml,
                version: OpenApiVersion::V3,
            }),
            _ => None,
        }
    }

    /// `?format=` value for the export endpoint.
    ///
    /// The service exports OpenAPI v2 only as JSON; the v2-YAML variant
    /// requests the JSON link and re-serialises after download.
    pub fn export_format(self) -> Option<&'static str> {
        match self {
            ApiSpecification::GraphQl => None,
            ApiSpecification::Wadl => Some("wadl-link"),
            ApiSpecification::Wsdl => Some("wsdl-link"),
            ApiSpecification::OpenApi {
                version: OpenApiVersion::V2,
                ..
            } => Some("swagger-link"),
            ApiSpecification::OpenApi {
                format: OpenApiFormat::Json,
                version: OpenApiVersion::V3,
            } => Some("openapi+json-link"),
            ApiSpecification::OpenApi {
                format: OpenApiFormat::Yaml,
                version: OpenApiVersion::V3,
            } => Some("openapi-link"),
        }
    }

    /// `properties.format` value for the import PUT.
    pub fn import_format(self) -> Option<&'static str> {
        match self {
            ApiSpecification::GraphQl => None,
            ApiSpecification::Wadl => Some("wadl-xml"),
            ApiSpecification::Wsdl => Some("wsdl"),
            ApiSpecification::OpenApi { format, version } => Some(match (version, format) {
                (OpenApiVersion::V2, OpenApiFormat::Json) => "swagger+json",
                (OpenApiVersion::V2, OpenApiFormat::Yaml) => "swagger+yaml",
                (OpenApiVersion::V3, OpenApiFormat::Json) => "openapi+json",
                (OpenApiVersion::V3, OpenApiFormat::Yaml) => "openapi+yaml",
            }),
        }
    }

    /// True when the import PUT needs `?import=true` (XML-bodied formats).
    pub fn import_requires_query(self) -> bool {
        matches!(self, ApiSpecification::Wadl | ApiSpecification::Wsdl)
    }
}

impl fmt::Display for ApiSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiSpecification::GraphQl => f.write_str("GraphQL"),
            ApiSpecification::Wadl => f.write_str("WADL"),
            ApiSpecification::Wsdl => f.write_str("WSDL"),
            ApiSpecification::OpenApi { format, version } => {
                let version = match version {
                    OpenApiVersion::V2 => "v2",
                    OpenApiVersion::V3 => "v3",
                };
                let format = match format {
                    OpenApiFormat::Json => "JSON",
                    OpenApiFormat::Yaml => "YAML",
                };
                write!(f, "OpenAPI {version} {format}")
            }
        }
    }
}

impl FromStr for ApiSpecification {
    type Err = CoreError;

    /// Parse an `API_SPECIFICATION_FORMAT` setting value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "wadl" => Ok(ApiSpecification::Wadl),
            "json" | "openapiv3json" => Ok(ApiSpecification::OpenApi {
                format: OpenApiFormat::Json,
                version: OpenApiVersion::V3,
            }),
            "yaml" | "openapiv3yaml" => Ok(ApiSpecification::OpenApi {
                format: OpenApiFormat::Yaml,
                version: OpenApiVersion::V3,
            }),
            "openapiv2json" => Ok(ApiSpecification::OpenApi {
                format: OpenApiFormat::Json,
                version: OpenApiVersion::V2,
            }),
            "openapiv2yaml" => Ok(ApiSpecification::OpenApi {
                format: OpenApiFormat::Yaml,
                version: OpenApiVersion::V2,
            }),
            _ => Err(CoreError::malformed_configuration(format!(
                "unknown specification format '{s}'"
            ))),
        }
    }
}
