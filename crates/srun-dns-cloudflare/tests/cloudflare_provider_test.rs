// Integration tests for `CloudflareProvider` using wiremock.

use serde_json::json;
use wiremock::matchers::{bearer_token, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use srun_core::traits::{DnsProvider, DnsUpdateRequest};
use srun_core::Error;
use srun_dns_cloudflare::{CloudflareConfig, CloudflareProvider};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(zone_id: Option<&str>) -> (MockServer, CloudflareProvider) {
    let server = MockServer::start().await;
    let mut config = CloudflareConfig::new("cf-token");
    config.api_base = server.uri();
    config.zone_id = zone_id.map(String::from);
    (server, CloudflareProvider::new(config).unwrap())
}

fn request(ip: &str) -> DnsUpdateRequest {
    DnsUpdateRequest {
        domain: "home.example.com".into(),
        ip: ip.into(),
        ttl: 600,
        config: json!({}),
    }
}

fn records(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "result": result
    }))
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_existing_record_is_updated() {
    let (server, provider) = setup(Some("zone-1")).await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .and(query_param("name", "home.example.com"))
        .and(query_param("type", "A"))
        .and(bearer_token("cf-token"))
        .respond_with(records(json!([{ "id": "rec-1", "content": "10.0.0.1" }])))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/zones/zone-1/dns_records/rec-1"))
        .and(body_partial_json(json!({ "content": "10.0.0.2", "type": "A", "ttl": 600 })))
        .respond_with(records(json!({ "id": "rec-1", "content": "10.0.0.2" })))
        .expect(1)
        .mount(&server)
        .await;

    provider
        .update(&reqwest::Client::new(), &request("10.0.0.2"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_record_is_created() {
    let (server, provider) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "example.com"))
        .respond_with(records(json!([{ "id": "zone-2", "name": "example.com" }])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-2/dns_records"))
        .and(query_param("type", "AAAA"))
        .respond_with(records(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/zones/zone-2/dns_records"))
        .and(body_partial_json(json!({ "name": "home.example.com", "type": "AAAA" })))
        .respond_with(records(json!({ "id": "rec-new" })))
        .expect(1)
        .mount(&server)
        .await;

    provider
        .update(&reqwest::Client::new(), &request("2001:db8::1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_matching_record_is_left_alone() {
    let (server, provider) = setup(Some("zone-1")).await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(records(json!([{ "id": "rec-1", "content": "10.0.0.3" }])))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    provider
        .update(&reqwest::Client::new(), &request("10.0.0.3"))
        .await
        .unwrap();
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_auth_failure_is_delivery_error() {
    let (server, provider) = setup(Some("zone-1")).await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    match provider.update(&reqwest::Client::new(), &request("10.0.0.4")).await {
        Err(Error::Delivery(msg)) => assert!(msg.contains("Authentication failed")),
        other => panic!("expected delivery error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_zone_is_delivery_error() {
    let (server, provider) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(records(json!([])))
        .mount(&server)
        .await;

    assert!(matches!(
        provider.update(&reqwest::Client::new(), &request("10.0.0.5")).await,
        Err(Error::Delivery(_))
    ));
}

#[tokio::test]
async fn test_invalid_ip_is_config_error() {
    let (_server, provider) = setup(Some("zone-1")).await;

    assert!(matches!(
        provider.update(&reqwest::Client::new(), &request("not-an-ip")).await,
        Err(Error::Config(_))
    ));
}

#[tokio::test]
async fn test_dry_run_skips_write() {
    let server = MockServer::start().await;
    let mut config = CloudflareConfig::new("cf-token");
    config.api_base = server.uri();
    config.zone_id = Some("zone-1".into());
    config.dry_run = true;
    let provider = CloudflareProvider::new(config).unwrap();

    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(records(json!([{ "id": "rec-1", "content": "10.0.0.1" }])))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    provider
        .update(&reqwest::Client::new(), &request("10.0.0.9"))
        .await
        .unwrap();
}
