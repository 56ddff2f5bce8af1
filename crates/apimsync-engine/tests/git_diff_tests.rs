//! Diff-scoped publishing against a real git repository.
//!
//! These tests build a small repository with two commits and verify that
//! only the resources the head commit touched are processed, with deletes
//! resolving through the parent commit.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use apimsync_core::config::ConfigurationMatcher;
use apimsync_engine::{ApimClient, Publisher, PublisherOptions};

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.email=ci@example.net",
            "-c",
            "user.name=ci",
        ])
        .args(args)
        .status()
        .expect("git is available");
    assert!(status.success(), "git {args:?} failed");
}

fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

async fn mount_permissive(server: &MockServer) {
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(server)
        .await;
}

async fn publish_commit(server: &MockServer, service_dir: &Path, commit: &str) {
    let client = Arc::new(ApimClient::new(server.uri()).unwrap());
    let publisher = Publisher::prepare(
        client,
        Arc::new(ConfigurationMatcher::disabled()),
        PublisherOptions {
            service_dir: service_dir.to_path_buf(),
            commit: Some(commit.to_string()),
        },
    )
    .await
    .unwrap();
    publisher.run().await.unwrap();
}

async fn requests_of(server: &MockServer, wanted: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.method.to_string().to_ascii_uppercase() == wanted)
        .map(|request| request.url.path().to_string())
        .collect()
}

#[tokio::test]
async fn removed_backend_is_deleted_and_nothing_else() {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q"]);
    write(
        dir.path(),
        "backends/b1/backendInformation.json",
        r#"{"properties": {"url": "https://backend.example.net", "protocol": "http"}}"#,
    );
    write(
        dir.path(),
        "products/p1/productInformation.json",
        r#"{"properties": {"displayName": "P1"}}"#,
    );
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "seed"]);

    std::fs::remove_dir_all(dir.path().join("backends")).unwrap();
    git(dir.path(), &["add", "-A"]);
    git(dir.path(), &["commit", "-q", "-m", "remove backend"]);

    let server = MockServer::start().await;
    mount_permissive(&server).await;

    publish_commit(&server, dir.path(), "HEAD").await;

    let deletes = requests_of(&server, "DELETE").await;
    assert_eq!(deletes, vec!["/backends/b1".to_string()]);

    // the untouched product is outside the target set
    let puts = requests_of(&server, "PUT").await;
    assert!(puts.is_empty(), "{puts:?}");
}

#[tokio::test]
async fn modified_resource_is_put_with_commit_contents() {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q"]);
    write(
        dir.path(),
        "products/p1/productInformation.json",
        r#"{"properties": {"displayName": "P1"}}"#,
    );
    write(
        dir.path(),
        "products/p2/productInformation.json",
        r#"{"properties": {"displayName": "P2"}}"#,
    );
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "seed"]);

    write(
        dir.path(),
        "products/p1/productInformation.json",
        r#"{"properties": {"displayName": "P1 renamed"}}"#,
    );
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "rename p1"]);

    // dirty working tree on top; the commit view must win over the live file
    write(
        dir.path(),
        "products/p1/productInformation.json",
        r#"{"properties": {"displayName": "uncommitted"}}"#,
    );

    let server = MockServer::start().await;
    mount_permissive(&server).await;

    publish_commit(&server, dir.path(), "HEAD").await;

    let puts: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.to_string().to_ascii_uppercase() == "PUT")
        .collect();
    let paths: Vec<String> = puts.iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(paths, vec!["/products/p1".to_string()]);

    let body: serde_json::Value = serde_json::from_slice(&puts[0].body).unwrap();
    assert_eq!(body["properties"]["displayName"], json!("P1 renamed"));
}
