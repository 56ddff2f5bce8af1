//! Extractor integration tests against a mock management service.
//!
//! Each test mounts the specific endpoints it cares about first, then a
//! permissive catch-all returning empty collections so the full traversal
//! can run without enumerating every kind.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use apimsync_core::config::ConfigurationMatcher;
use apimsync_core::specification::ApiSpecification;
use apimsync_engine::{ApimClient, Extractor, ExtractorOptions};

// =============================================================================
// Test Helpers
// =============================================================================

async fn mount_empty_collections(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(server)
        .await;
}

fn extractor(server: &MockServer, service_dir: &Path) -> Extractor {
    let client = Arc::new(ApimClient::new(server.uri()).unwrap());
    Extractor::new(
        client,
        Arc::new(ConfigurationMatcher::disabled()),
        ExtractorOptions {
            service_dir: service_dir.to_path_buf(),
            default_specification: ApiSpecification::default_openapi(),
        },
    )
}

fn extractor_with_config(server: &MockServer, service_dir: &Path, yaml: &str) -> Extractor {
    let value: Value = serde_yaml::from_str(yaml).unwrap();
    let client = Arc::new(ApimClient::new(server.uri()).unwrap());
    Extractor::new(
        client,
        Arc::new(ConfigurationMatcher::from_value(value)),
        ExtractorOptions {
            service_dir: service_dir.to_path_buf(),
            default_specification: ApiSpecification::default_openapi(),
        },
    )
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

// =============================================================================
// Products
// =============================================================================

#[tokio::test]
async fn extracts_products_into_information_files() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {
                    "name": "p1",
                    "properties": {"displayName": "Product One", "state": "published"}
                },
                {
                    "name": "p2",
                    "properties": {"displayName": "Product Two", "bogusField": 1}
                }
            ]
        })))
        .mount(&server)
        .await;
    mount_empty_collections(&server).await;

    let dir = tempfile::tempdir().unwrap();
    extractor(&server, dir.path()).run().await.unwrap();

    let p1 = read_json(&dir.path().join("products/p1/productInformation.json"));
    assert_eq!(
        p1,
        json!({"properties": {"displayName": "Product One", "state": "published"}})
    );

    // unknown fields are dropped by normalization
    let p2 = read_json(&dir.path().join("products/p2/productInformation.json"));
    assert_eq!(p2, json!({"properties": {"displayName": "Product Two"}}));
}

// =============================================================================
// API revisions
// =============================================================================

#[tokio::test]
async fn extracts_current_and_noncurrent_revisions() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/apis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {
                    "name": "orders",
                    "properties": {
                        "displayName": "Orders",
                        "path": "orders",
                        "apiRevision": "1",
                        "isCurrent": true
                    }
                },
                {
                    "name": "orders;rev=2",
                    "properties": {
                        "displayName": "Orders",
                        "path": "orders",
                        "apiRevision": "2"
                    }
                }
            ]
        })))
        .mount(&server)
        .await;

    for api in ["orders", "orders;rev=2"] {
        Mock::given(method("GET"))
            .and(path(format!("/apis/{api}")))
            .and(query_param("export", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": {"link": format!("{}/export-download", server.uri())}
            })))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/export-download"))
        .respond_with(ResponseTemplate::new(200).set_body_string("openapi: 3.0.1\n"))
        .mount(&server)
        .await;
    mount_empty_collections(&server).await;

    let dir = tempfile::tempdir().unwrap();
    extractor(&server, dir.path()).run().await.unwrap();

    assert!(dir.path().join("apis/orders/apiInformation.json").exists());
    assert!(dir.path().join("apis/orders;rev=2/apiInformation.json").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("apis/orders/specification.yaml")).unwrap(),
        "openapi: 3.0.1\n"
    );

    // releases are only enumerated under the current revision
    let release_listings: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| request.url.path().to_string())
        .filter(|p| p.ends_with("/releases"))
        .collect();
    assert_eq!(release_listings, vec!["/apis/orders/releases".to_string()]);
}

// =============================================================================
// Policy fragments
// =============================================================================

#[tokio::test]
async fn policy_fragment_xml_is_side_stored() {
    let server = MockServer::start().await;
    let xml = "<fragment>\n  <set-header name=\"x\" />\n</fragment>";

    Mock::given(method("GET"))
        .and(path("/policyFragments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": "f1", "properties": {"description": "shared"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/policyFragments/f1"))
        .and(query_param("format", "rawxml"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "f1",
            "properties": {"description": "shared", "format": "rawxml", "value": xml}
        })))
        .mount(&server)
        .await;
    mount_empty_collections(&server).await;

    let dir = tempfile::tempdir().unwrap();
    extractor(&server, dir.path()).run().await.unwrap();

    let information = read_json(&dir.path().join("policy fragments/f1/policyFragmentInformation.json"));
    assert!(information["properties"].get("format").is_none());
    assert!(information["properties"].get("value").is_none());
    assert_eq!(information["properties"]["description"], json!("shared"));

    // byte-for-byte body
    assert_eq!(
        std::fs::read_to_string(dir.path().join("policy fragments/f1/policy.xml")).unwrap(),
        xml
    );
}

// =============================================================================
// SKU gating
// =============================================================================

#[tokio::test]
async fn unsupported_kinds_are_skipped_not_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/workspaces"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string("MethodNotAllowedInPricingTier: workspaces need Premium"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gateways"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("Request processing failed due to internal error"),
        )
        .mount(&server)
        .await;
    mount_empty_collections(&server).await;

    let dir = tempfile::tempdir().unwrap();
    extractor(&server, dir.path()).run().await.unwrap();

    assert!(!dir.path().join("workspaces").exists());
    assert!(!dir.path().join("gateways").exists());
}

#[tokio::test]
async fn unclassified_probe_errors_abort_the_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;
    mount_empty_collections(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let error = extractor(&server, dir.path()).run().await.unwrap_err();
    assert!(error.to_string().contains("403"));
}

// =============================================================================
// Configuration and reserved names
// =============================================================================

#[tokio::test]
async fn configuration_excludes_unlisted_resources() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"name": "keep", "properties": {"displayName": "Keep"}},
                {"name": "drop", "properties": {"displayName": "Drop"}}
            ]
        })))
        .mount(&server)
        .await;
    mount_empty_collections(&server).await;

    let dir = tempfile::tempdir().unwrap();
    extractor_with_config(&server, dir.path(), "products:\n  - keep\n")
        .run()
        .await
        .unwrap();

    assert!(dir.path().join("products/keep/productInformation.json").exists());
    assert!(!dir.path().join("products/drop").exists());
}

#[tokio::test]
async fn reserved_names_are_never_extracted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"name": "master", "properties": {"scope": "/products", "displayName": "m"}},
                {"name": "user-sub", "properties": {"scope": "/products/p1", "displayName": "s"}}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"name": "administrators", "properties": {"displayName": "Administrators"}},
                {"name": "partners", "properties": {"displayName": "Partners"}}
            ]
        })))
        .mount(&server)
        .await;
    mount_empty_collections(&server).await;

    let dir = tempfile::tempdir().unwrap();
    extractor(&server, dir.path()).run().await.unwrap();

    assert!(!dir.path().join("subscriptions/master").exists());
    assert!(dir.path().join("subscriptions/user-sub/subscriptionInformation.json").exists());
    assert!(!dir.path().join("groups/administrators").exists());
    assert!(dir.path().join("groups/partners/groupInformation.json").exists());
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn collection_listing_follows_next_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": "t1", "properties": {"displayName": "T1"}}],
            "nextLink": format!("{}/tags-page-2", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tags-page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": "t2", "properties": {"displayName": "T2"}}]
        })))
        .mount(&server)
        .await;
    mount_empty_collections(&server).await;

    let dir = tempfile::tempdir().unwrap();
    extractor(&server, dir.path()).run().await.unwrap();

    assert!(dir.path().join("tags/t1/tagInformation.json").exists());
    assert!(dir.path().join("tags/t2/tagInformation.json").exists());
}
