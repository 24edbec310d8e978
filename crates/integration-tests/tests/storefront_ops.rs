//! Integration tests for health checks and response headers.
//!
//! These tests require the storefront running (cargo run -p orchard-storefront).

use orchard_integration_tests::{browser_client, storefront_base_url};
use reqwest::StatusCode;

#[tokio::test]
#[ignore = "Requires running storefront"]
async fn test_health() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .expect("Failed to get health");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.expect("Failed to read body"), "ok");

    let resp = client
        .get(format!("{base_url}/health/ready"))
        .send()
        .await
        .expect("Failed to get readiness");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running storefront"]
async fn test_security_headers_present() {
    let client = browser_client();
    let resp = client
        .get(format!("{}/auth/session", storefront_base_url()))
        .send()
        .await
        .expect("Failed to get session");

    let headers = resp.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.contains_key("content-security-policy"));
}

#[tokio::test]
#[ignore = "Requires running storefront"]
async fn test_request_id_echoed() {
    let client = browser_client();
    let resp = client
        .get(format!("{}/health", storefront_base_url()))
        .header("x-request-id", "it-request-1")
        .send()
        .await
        .expect("Failed to get health");

    assert_eq!(resp.headers()["x-request-id"], "it-request-1");
}
