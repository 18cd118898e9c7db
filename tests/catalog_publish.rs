//! Integration tests for the Federation Registry client using wiremock

use fedreg_feeder::catalog::{publish, CatalogClient, FederatedProvider};
use fedreg_feeder::config::{infer_endpoints, ApiVersions};
use fedreg_feeder::model::ProviderStatus;
use serde_json::json;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{bearer_token, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "registry-token";

fn client(server: &MockServer) -> CatalogClient {
    let base = Url::parse(&server.uri()).unwrap();
    let endpoints = infer_endpoints(&base, &ApiVersions::default()).unwrap();
    CatalogClient::new(&endpoints, TOKEN, Duration::from_secs(5)).unwrap()
}

fn provider(name: &str) -> FederatedProvider {
    FederatedProvider {
        name: name.to_string(),
        description: String::new(),
        provider_type: "openstack".to_string(),
        status: ProviderStatus::Active,
        is_public: false,
        support_emails: vec!["ops@example.org".to_string()],
        identity_providers: vec![],
        projects: vec![],
        regions: vec![],
    }
}

async fn mount_stored(server: &MockServer, stored: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v1/providers"))
        .and(query_param("with_conn", "true"))
        .and(bearer_token(TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored))
        .expect(1)
        .mount(server)
        .await;
}

/// New providers are created, known ones updated and stale ones removed
#[tokio::test]
async fn test_publish_synchronizes_registry() {
    let server = MockServer::start().await;
    mount_stored(
        &server,
        json!([
            { "uid": "b-1", "name": "beta", "type": "openstack", "status": "active" },
            { "uid": "g-1", "name": "gamma", "type": "openstack", "status": "active" },
            { "uid": "d-1", "name": "delta", "type": "kubernetes", "status": "active" }
        ]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/providers"))
        .and(bearer_token(TOKEN))
        .and(body_partial_json(json!({ "name": "alpha", "type": "openstack", "status": "active" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "uid": "a-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/providers/b-1"))
        .and(body_partial_json(json!({ "name": "beta" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/providers/g-1"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/providers/d-1"))
        .and(bearer_token(TOKEN))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let providers = vec![provider("alpha"), provider("beta"), provider("gamma")];
    let summary = publish(&client(&server), &providers, true).await.unwrap();

    assert_eq!(summary.created, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.removed, 1);
}

/// Stored providers are kept when the run did not load every site
#[tokio::test]
async fn test_publish_keeps_stale_providers_on_partial_load() {
    let server = MockServer::start().await;
    mount_stored(
        &server,
        json!([
            { "uid": "b-1", "name": "beta" },
            { "uid": "d-1", "name": "delta" }
        ]),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/providers/b-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let summary = publish(&client(&server), &[provider("beta")], false).await.unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.removed, 0);
}

/// An empty registry only receives creations
#[tokio::test]
async fn test_publish_into_empty_registry() {
    let server = MockServer::start().await;
    mount_stored(&server, json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/providers"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let summary = publish(&client(&server), &[provider("alpha"), provider("beta")], true)
        .await
        .unwrap();

    assert_eq!(summary.created, 2);
    assert_eq!(summary.removed, 0);
}

/// A rejected creation stops the run before any removal
#[tokio::test]
async fn test_publish_stops_on_rejected_write() {
    let server = MockServer::start().await;
    mount_stored(&server, json!([{ "uid": "d-1", "name": "delta" }])).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/providers"))
        .respond_with(ResponseTemplate::new(422).set_body_string(r#"{"detail": "invalid"}"#))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let err = publish(&client(&server), &[provider("alpha")], true).await.unwrap_err();

    assert!(err.to_string().contains("alpha"));
    assert!(err.to_string().contains("422"));
}

/// A registry that cannot be read is an error
#[tokio::test]
async fn test_unreadable_registry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/providers"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client(&server).read().await;

    assert!(result.is_err());
}

/// An update answered with an unexpected status is an error
#[tokio::test]
async fn test_update_unexpected_status() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/providers/b-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client(&server).update("b-1", &provider("beta")).await;

    assert!(result.is_err());
}
