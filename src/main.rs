use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::handlers;
use slotbook::services::gateway::hitpay::HitPayGateway;
use slotbook::services::gateway::sandbox::SandboxGateway;
use slotbook::services::gateway::PaymentGateway;
use slotbook::services::notify::telegram::TelegramNotifier;
use slotbook::services::notify::{LogNotifier, Notifier};
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::open_db(&config.database_url, config.db_busy_timeout)?;

    let gateway: Box<dyn PaymentGateway> = if config.hitpay_api_key.is_empty() {
        tracing::warn!("HITPAY_API_KEY not set, using sandbox payment gateway");
        Box::new(SandboxGateway::new(config.public_base_url.clone()))
    } else {
        anyhow::ensure!(
            !config.hitpay_salt.is_empty(),
            "HITPAY_SALT must be set when HITPAY_API_KEY is set"
        );
        tracing::info!("using HitPay payment gateway ({})", config.hitpay_api_url);
        Box::new(HitPayGateway::new(
            config.hitpay_api_url.clone(),
            config.hitpay_api_key.clone(),
            config.gateway_connect_timeout,
            config.gateway_timeout,
        )?)
    };

    let notifier: Box<dyn Notifier> =
        if config.telegram_bot_token.is_empty() || config.telegram_chat_id.is_empty() {
            tracing::info!("Telegram not configured, notifications are logged only");
            Box::new(LogNotifier)
        } else {
            Box::new(TelegramNotifier::new(
                config.telegram_bot_token.clone(),
                config.telegram_chat_id.clone(),
            ))
        };

    if config.admin_token.is_empty() {
        tracing::warn!("ADMIN_TOKEN is empty, admin endpoints are disabled");
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(conn, config, gateway, notifier));

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
