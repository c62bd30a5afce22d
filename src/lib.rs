pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    adapters::handlers,
    axum::{
        Router,
        extract::DefaultBodyLimit,
        http::StatusCode,
        routing::{any, get, post},
    },
    services::{dispatcher::WebhookDispatcher, payments::PaymentService},
    std::{sync::Arc, time::Duration},
    tower_http::{timeout::TimeoutLayer, trace::TraceLayer},
};

/// Upper bound for a single inbound request, provider round-trips included.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub webhooks: Arc<WebhookDispatcher>,
    /// Results page the browser callback redirects to.
    pub frontend_url: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/payments", post(handlers::create_payment_handler))
        .route("/payments/callback", any(handlers::payment_callback_handler))
        .route("/payments/{payment_id}", get(handlers::get_payment_handler))
        .route("/webhook", any(handlers::webhook_handler))
        .layer(DefaultBodyLimit::max(64 * 1024)) // 64 KB, provider webhooks are a few KB
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_DEADLINE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
