use std::time::Duration;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use storefront_api::config::CaptureGatewayConfig;
use storefront_api::errors::ServiceError;
use storefront_api::gateways::{
    CaptureGateway, GatewayLineItem, GatewayOrderRequest, GatewayOutcome, PaymentGateway,
};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_for(server: &MockServer) -> CaptureGateway {
    CaptureGateway::new(
        CaptureGatewayConfig {
            base_url: server.uri(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        },
        Duration::from_secs(5),
    )
    .expect("build gateway")
}

fn order_request() -> GatewayOrderRequest {
    GatewayOrderRequest {
        order_id: Uuid::new_v4(),
        amount: dec!(25.00),
        currency: "USD".to_string(),
        line_items: vec![GatewayLineItem {
            name: "Widget".to_string(),
            quantity: 2,
            unit_amount: dec!(12.50),
        }],
        return_url: "https://shop.example/return".to_string(),
        cancel_url: "https://shop.example/cancel".to_string(),
    }
}

async fn mock_token(server: &MockServer, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-1",
            "expires_in": expires_in,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn begin_checkout_creates_a_remote_order() {
    let server = MockServer::start().await;
    mock_token(&server, 3600).await;
    Mock::given(method("POST"))
        .and(path("/checkout/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "GW-ORDER-1",
            "status": "CREATED",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let handoff = gateway.begin_checkout(&order_request()).await.unwrap();
    assert_eq!(handoff.gateway_order_id, "GW-ORDER-1");
    assert!(handoff.redirect_url.is_none());
}

#[tokio::test]
async fn token_is_cached_across_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-1",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/checkout/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "GW-ORDER-1",
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    gateway.begin_checkout(&order_request()).await.unwrap();
    gateway.begin_checkout(&order_request()).await.unwrap();
}

#[tokio::test]
async fn expired_token_is_refreshed() {
    let server = MockServer::start().await;
    // expires_in below the refresh skew, so the second call re-exchanges.
    mock_token(&server, 30).await;
    Mock::given(method("POST"))
        .and(path("/checkout/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "GW-ORDER-1",
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    gateway.begin_checkout(&order_request()).await.unwrap();
    gateway.begin_checkout(&order_request()).await.unwrap();

    let token_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/oauth2/token")
        .count();
    assert_eq!(token_calls, 2);
}

#[tokio::test]
async fn rejected_credentials_surface_as_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = gateway.begin_checkout(&order_request()).await.unwrap_err();
    assert_matches!(err, ServiceError::GatewayAuthFailure(_));
}

#[tokio::test]
async fn completed_capture_settles() {
    let server = MockServer::start().await;
    mock_token(&server, 3600).await;
    Mock::given(method("POST"))
        .and(path("/checkout/orders/GW-ORDER-1/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "GW-ORDER-1",
            "status": "COMPLETED",
            "capture_id": "CAP-1",
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let result = gateway.capture("GW-ORDER-1").await.unwrap();
    assert_eq!(result.outcome, GatewayOutcome::Settled);
    assert_eq!(result.transaction_id.as_deref(), Some("CAP-1"));
    assert!(result.paid_at.is_some());
}

#[tokio::test]
async fn declined_capture_is_a_failed_outcome_not_an_error() {
    let server = MockServer::start().await;
    mock_token(&server, 3600).await;
    Mock::given(method("POST"))
        .and(path("/checkout/orders/GW-ORDER-2/capture"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "GW-ORDER-2",
            "status": "DECLINED",
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let result = gateway.capture("GW-ORDER-2").await.unwrap();
    assert_eq!(result.outcome, GatewayOutcome::Failed);
    assert!(result.paid_at.is_none());
}

#[tokio::test]
async fn gateway_error_response_carries_status_and_body() {
    let server = MockServer::start().await;
    mock_token(&server, 3600).await;
    Mock::given(method("POST"))
        .and(path("/checkout/orders/GW-ORDER-3/capture"))
        .respond_with(ResponseTemplate::new(422).set_body_string("ORDER_NOT_APPROVED"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = gateway.capture("GW-ORDER-3").await.unwrap_err();
    match err {
        ServiceError::GatewayRequestFailure { status, body } => {
            assert_eq!(status, 422);
            assert!(body.contains("ORDER_NOT_APPROVED"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
