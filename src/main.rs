use {
    bankpay::{
        AppState,
        adapters::{
            http::ReqwestClient,
            truelayer::{RequestSigner, TrueLayerClient},
        },
        config::Config,
        domain::{provider::PaymentGateway, store::PaymentStore},
        infra::{memory::InMemoryPaymentStore, postgres::PgPaymentStore},
        services::{
            dispatcher::WebhookDispatcher,
            payments::{PaymentService, PaymentSettings},
        },
    },
    sqlx::postgres::PgPoolOptions,
    std::{process, sync::Arc, time::Duration},
    tokio::signal,
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::error!("invalid configuration: {e}");
        process::exit(1);
    });

    let store: Arc<dyn PaymentStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(3))
                .connect(database_url)
                .await
                .expect("failed to connect to database");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("failed to run migrations");
            Arc::new(PgPaymentStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, payments are kept in memory");
            Arc::new(InMemoryPaymentStore::new())
        }
    };

    let signer = RequestSigner::from_pem(config.key_id.clone(), &config.private_key_pem).unwrap_or_else(|e| {
        tracing::error!("invalid TRUELAYER_PRIVATE_KEY: {e}");
        process::exit(1);
    });
    let gateway: Arc<dyn PaymentGateway> = Arc::new(TrueLayerClient::new(
        ReqwestClient::new(),
        config.provider.clone(),
        signer,
        config.retry.clone(),
    ));

    if config.callback_url.is_none() {
        tracing::warn!("TRUELAYER_CALLBACK_URL not set, payment creation will fail");
    }

    let state = AppState {
        payments: Arc::new(PaymentService::new(
            gateway.clone(),
            store.clone(),
            config.retry.clone(),
            PaymentSettings {
                callback_url: config.callback_url.clone(),
                merchant_currency: config.merchant_currency,
            },
        )),
        webhooks: Arc::new(WebhookDispatcher::new(gateway, store, config.retry.clone())),
        frontend_url: config.results_url.as_str().into(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, bankpay::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
