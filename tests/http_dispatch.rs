//! End-to-end HTTP proxying through a live gateway.

use api_gateway::routing::Protocol;
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

async fn gateway_with_services() -> (common::TestGateway, common::ServiceStats) {
    let (users, stats) = common::start_counted_user_service().await;
    let matches = common::start_match_service().await;
    let gateway = common::start_gateway(common::gateway_config(vec![
        common::route("users", "/api/v1/users", users, Protocol::Http),
        common::route("matches", "/api/v1/matches", matches, Protocol::Http),
    ]))
    .await;
    (gateway, stats)
}

#[tokio::test]
async fn valid_token_reaches_backend_with_identity() {
    let (gateway, users) = gateway_with_services().await;

    let res = common::client()
        .get(gateway.http_url("/api/v1/users/me?fields=name"))
        .header("authorization", common::bearer(&common::token_for(42)))
        .send()
        .await
        .expect("Gateway unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    let seen: Value = res.json().await.unwrap();
    assert_eq!(seen["method"], "GET");
    assert_eq!(seen["uri"], "/api/v1/users/me?fields=name");
    assert_eq!(seen["user_ids"], json!(["42"]));
    assert_eq!(seen["authorization"], Value::Null);
    assert_eq!(seen["forwarded_for"], "127.0.0.1");
    assert_eq!(seen["forwarded_host"], gateway.addr.to_string());
    assert_eq!(users.hits(), 1);
}

#[tokio::test]
async fn client_supplied_identity_is_replaced() {
    let (gateway, _) = gateway_with_services().await;

    let res = common::client()
        .get(gateway.http_url("/api/v1/users/me"))
        .header("authorization", common::bearer(&common::token_for(7)))
        .header("x-user-id", "1")
        .send()
        .await
        .unwrap();

    let seen: Value = res.json().await.unwrap();
    assert_eq!(seen["user_ids"], json!(["7"]));
}

#[tokio::test]
async fn request_body_and_request_id_pass_through() {
    let (gateway, _) = gateway_with_services().await;

    let res = common::client()
        .post(gateway.http_url("/api/v1/users"))
        .header("authorization", common::bearer(&common::token_for(3)))
        .header("x-request-id", "trace-me")
        .body(r#"{"name":"ada"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "trace-me");
    let seen: Value = res.json().await.unwrap();
    assert_eq!(seen["method"], "POST");
    assert_eq!(seen["body"], r#"{"name":"ada"}"#);
    assert_eq!(seen["request_id"], "trace-me");
}

#[tokio::test]
async fn invalid_tokens_are_rejected_without_backend_contact() {
    let (gateway, users) = gateway_with_services().await;
    let client = common::client();

    let forged = common::sign_claims_with(common::OTHER_PRIVATE_KEY, &json!({"user_id": 42}));
    let cases = [
        (None, "invalid_format"),
        (Some("Bearer invalid".to_string()), "invalid_format"),
        (Some("Basic dXNlcjpwYXNz".to_string()), "invalid_format"),
        (Some(common::bearer(&forged)), "bad_signature"),
        (
            Some(common::bearer(&common::sign_claims_with(
                common::PRIVATE_KEY,
                &json!({"email": "no-id@example.com"}),
            ))),
            "missing_claim",
        ),
    ];

    for (authorization, kind) in cases {
        let mut request = client.get(gateway.http_url("/api/v1/users/me"));
        if let Some(value) = &authorization {
            request = request.header("authorization", value);
        }
        let res = request.send().await.unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{authorization:?}");
        assert_eq!(res.headers()["content-type"], "application/json");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], kind, "{authorization:?}");
        assert_eq!(users.hits(), 0, "backend contacted for {authorization:?}");
    }
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (gateway, users) = gateway_with_services().await;

    let res = common::client()
        .get(gateway.http_url("/api/v1/usersettings"))
        .header("authorization", common::bearer(&common::token_for(1)))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(users.hits(), 0);
}

#[tokio::test]
async fn backend_validation_error_passes_through_verbatim() {
    let (gateway, _) = gateway_with_services().await;

    let res = common::client()
        .post(gateway.http_url("/api/v1/matches"))
        .header("authorization", common::bearer(&common::token_for(5)))
        .json(&json!({"score": "not-a-number"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["x-backend"], "match");
    assert_eq!(
        res.text().await.unwrap(),
        r#"{"detail":"invalid match payload","field":"score"}"#
    );
}

#[tokio::test]
async fn ping_is_public() {
    let (gateway, _) = gateway_with_services().await;

    let res = common::client()
        .get(gateway.http_url("/ping"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"message": "pong"}));
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let users = common::start_user_service().await;
    let mut config = common::gateway_config(vec![common::route("users", "/api/v1/users", users, Protocol::Http)]);
    config.limits.max_body_bytes = 16;
    let gateway = common::start_gateway(config).await;

    let res = common::client()
        .post(gateway.http_url("/api/v1/users"))
        .header("authorization", common::bearer(&common::token_for(5)))
        .body(vec![b'x'; 1024])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
