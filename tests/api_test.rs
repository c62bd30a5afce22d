mod common;

use {
    axum::{
        body::Body,
        http::{Request, StatusCode, header},
    },
    bankpay::{
        domain::{
            error::{ErrorCode, PaymentError},
            id::PaymentId,
            payment::PaymentStatus,
            store::PaymentStore,
            taxonomy::classify_provider_error,
        },
        infra::memory::InMemoryPaymentStore,
    },
    common::*,
    serde_json::json,
    std::sync::{Arc, atomic::Ordering},
    tower::ServiceExt,
};

fn fixtures() -> (Arc<MockGateway>, Arc<InMemoryPaymentStore>) {
    (MockGateway::new(), Arc::new(InMemoryPaymentStore::new()))
}

// ── health ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_ok() {
    let (gateway, store) = fixtures();
    let response = app(gateway, store).oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ── creation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_returns_payment_id_and_hpp_url() {
    let (gateway, store) = fixtures();
    let response = app(gateway.clone(), store.clone())
        .oneshot(create_request(json!({
            "amount": 10000,
            "provider_id": "mock",
            "currency": "EUR",
            "metadata": { "orderId": "order-1", "note": null }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["paymentId"], "pay_1");
    assert_eq!(body["hppUrl"], "https://hpp.example/pay_1");

    let stored = store.get(&PaymentId::new("pay_1").unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.status(), PaymentStatus::Authorizing);
    assert_eq!(stored.hpp_url(), Some("https://hpp.example/pay_1"));
    assert_eq!(stored.money().unwrap().amount().minor(), 10000);
    assert_eq!(stored.metadata().get("orderId"), Some(&json!("order-1")));
    assert!(stored.metadata().get("note").is_none());
    assert!(stored.metadata().get("authorizationStartedAt").is_some());
}

#[tokio::test]
async fn create_defaults_to_merchant_currency() {
    let (gateway, store) = fixtures();
    let response = app(gateway, store.clone())
        .oneshot(create_request(json!({ "amount": 250, "provider_id": "mock" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = store.get(&PaymentId::new("pay_1").unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.money().unwrap().currency().as_str(), "EUR");
}

#[tokio::test]
async fn create_rejects_invalid_input_without_calling_provider() {
    let bodies = [
        json!({ "amount": 0, "provider_id": "mock" }),
        json!({ "amount": -5, "provider_id": "mock" }),
        json!({ "amount": "100", "provider_id": "mock" }),
        json!({ "amount": 100 }),
        json!({ "amount": 100, "provider_id": "   " }),
        json!({ "amount": 100, "provider_id": "mock", "currency": "XYZ" }),
    ];
    for body in bodies {
        let (gateway, store) = fixtures();
        let response = app(gateway.clone(), store.clone())
            .oneshot(create_request(body.clone()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        let envelope = body_json(response).await;
        assert_eq!(envelope["code"], "VALIDATION_ERROR", "{body}");
        assert_eq!(envelope["details"]["retryable"], false);
        assert_eq!(gateway.create_calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }
}

#[tokio::test]
async fn create_rejects_malformed_json() {
    let (gateway, store) = fixtures();
    let request = Request::builder()
        .method("POST")
        .uri("/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app(gateway, store).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn create_surfaces_classified_provider_error() {
    let (gateway, store) = fixtures();
    gateway.fail_create_with(|| {
        classify_provider_error(422, Some("insufficient_funds"), "balance too low on acct 99")
    });

    let response = app(gateway, store.clone())
        .oneshot(create_request(json!({ "amount": 100, "provider_id": "mock" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");
    assert_eq!(body["details"]["retryable"], false);
    assert!(!body.to_string().contains("acct 99"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn create_marks_transient_provider_errors_retryable() {
    let (gateway, store) = fixtures();
    gateway.fail_create_with(|| classify_provider_error(503, None, "upstream down"));

    let response = app(gateway, store)
        .oneshot(create_request(json!({ "amount": 100, "provider_id": "mock" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(body["details"]["retryable"], true);
}

#[tokio::test(start_paused = true)]
async fn create_past_request_deadline_times_out() {
    let (gateway, store) = fixtures();
    gateway.hang_create();

    let response = app(gateway, store.clone())
        .oneshot(create_request(json!({ "amount": 100, "provider_id": "mock" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(store.is_empty());
}

// ── callback ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn callback_redirects_to_results_page() {
    let (gateway, store) = fixtures();
    let app = app(gateway.clone(), store.clone());
    app.clone()
        .oneshot(create_request(json!({ "amount": 10000, "provider_id": "mock" })))
        .await
        .unwrap();
    gateway.set_provider_status("pay_1", PaymentStatus::Executed);

    let response = app.oneshot(get("/payments/callback?payment_id=pay_1")).await.unwrap();

    assert!(response.status().is_redirection());
    let target = location(&response);
    assert!(target.as_str().starts_with(RESULTS_URL));
    assert_eq!(query_param(&target, "payment_id").as_deref(), Some("pay_1"));
    assert_eq!(query_param(&target, "status").as_deref(), Some("executed"));
    assert_eq!(query_param(&target, "amount").as_deref(), Some("10000"));
    assert_eq!(query_param(&target, "currency").as_deref(), Some("EUR"));

    let stored = store.get(&PaymentId::new("pay_1").unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.status(), PaymentStatus::Executed);
    assert!(stored.metadata().get("callbackReceivedAt").is_some());
}

#[tokio::test]
async fn callback_without_payment_id_is_bad_request() {
    let (gateway, store) = fixtures();
    for uri in ["/payments/callback", "/payments/callback?payment_id="] {
        let response = app(gateway.clone(), store.clone()).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Missing 'payment_id' parameter." })
        );
    }
    assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn callback_rejects_other_methods() {
    let (gateway, store) = fixtures();
    let request = Request::builder()
        .method("POST")
        .uri("/payments/callback?payment_id=pay_1")
        .body(Body::empty())
        .unwrap();

    let response = app(gateway.clone(), store).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET");
    assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn callback_failure_redirects_to_error_page() {
    let (gateway, store) = fixtures();
    gateway.fail_status_with(|| {
        PaymentError::new(ErrorCode::ServiceUnavailable, "status endpoint 502")
            .with_user_message("Service unavailable")
    });

    let response = app(gateway, store.clone())
        .oneshot(get("/payments/callback?payment_id=pay_9"))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    let target = location(&response);
    assert_eq!(target.path(), "/result/payment-result.html");
    assert_eq!(query_param(&target, "error").as_deref(), Some("Service unavailable"));
    assert_eq!(query_param(&target, "error_code").as_deref(), Some("SERVICE_UNAVAILABLE"));
    assert_eq!(query_param(&target, "payment_id").as_deref(), Some("pay_9"));
    assert!(store.is_empty());
}

// ── webhook ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn webhook_without_signature_is_unauthorized() {
    let (gateway, store) = fixtures();
    let body = event("payment_settled", "pay_1", "evt_1", json!({}));

    let response = app(gateway.clone(), store.clone())
        .oneshot(webhook_request(None, &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({ "error": "Missing signature." }));
    assert_eq!(gateway.verify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn webhook_with_bad_signature_changes_nothing() {
    let (gateway, store) = fixtures();
    let body = event("payment_settled", "pay_1", "evt_1", json!({}));

    let response = app(gateway, store.clone())
        .oneshot(webhook_request(Some("header..forged"), &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({ "error": "Invalid signature." }));
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn webhook_with_unknown_type_is_acknowledged() {
    let (gateway, store) = fixtures();
    let body = event("payment_teleported", "pay_1", "evt_1", json!({}));

    let response = app(gateway, store.clone())
        .oneshot(webhook_request(Some(VALID_SIGNATURE), &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "received": true }));
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn webhook_without_string_type_is_acknowledged() {
    let (gateway, store) = fixtures();
    let bodies = [
        json!({ "event_id": "evt_1", "event_version": 1, "payment_id": "pay_1" }),
        json!({ "type": 7, "event_id": "evt_2", "event_version": 1, "payment_id": "pay_1" }),
    ];

    for body in bodies {
        let response = app(gateway.clone(), store.clone())
            .oneshot(webhook_request(Some(VALID_SIGNATURE), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "body: {body}");
        assert_eq!(body_json(response).await, json!({ "received": true }));
    }
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn webhook_without_payment_id_is_acknowledged() {
    let (gateway, store) = fixtures();
    let body = json!({ "type": "payment_settled", "event_id": "evt_1" });

    let response = app(gateway, store.clone())
        .oneshot(webhook_request(Some(VALID_SIGNATURE), &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn webhook_with_malformed_body_is_bad_request() {
    let (gateway, store) = fixtures();
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Tl-Signature", VALID_SIGNATURE)
        .body(Body::from("{\"type\":"))
        .unwrap();

    let response = app(gateway, store.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn webhook_rejects_get() {
    let (gateway, store) = fixtures();
    let response = app(gateway, store).oneshot(get("/webhook")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "POST");
}

#[tokio::test]
async fn webhook_body_over_limit_is_rejected() {
    let (gateway, store) = fixtures();
    let padding = "x".repeat(70 * 1024);
    let body = event("payment_settled", "pay_1", "evt_1", json!({ "padding": padding }));

    let response = app(gateway.clone(), store)
        .oneshot(webhook_request(Some(VALID_SIGNATURE), &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(gateway.verify_calls.load(Ordering::SeqCst), 0);
}

// ── lookup ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lookup_returns_stored_record() {
    let (gateway, store) = fixtures();
    let app = app(gateway, store);
    app.clone()
        .oneshot(create_request(json!({ "amount": 500, "provider_id": "mock" })))
        .await
        .unwrap();

    let response = app.oneshot(get("/payments/pay_1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "pay_1");
    assert_eq!(body["status"], "authorizing");
    assert_eq!(body["hpp_url"], "https://hpp.example/pay_1");
}

#[tokio::test]
async fn lookup_of_unknown_payment_is_not_found() {
    let (gateway, store) = fixtures();
    let response = app(gateway, store).oneshot(get("/payments/pay_404")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_PAYMENT_REQUEST");
    assert_eq!(body["message"], "Payment not found.");
    assert_eq!(body["details"]["payment_id"], "pay_404");
}
