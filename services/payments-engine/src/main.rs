use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use ledger_core::LedgerStore;
use payments_engine::{
    config::Config,
    database::Database,
    handlers,
    providers::SignatureVerifier,
    services::{IntentService, RefundService, SettlementService, WebhookService},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Payments Engine...");

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    let db = Arc::new(
        Database::connect(&config.database.url, config.database.max_connections)
            .await
            .expect("Failed to connect to database"),
    );
    info!("Database connected");

    sqlx::migrate!("./migrations")
        .run(db.pool())
        .await
        .expect("Failed to run migrations");
    info!("Migrations applied");

    let ledger = Arc::new(LedgerStore::new(db.pool().clone()));
    ledger
        .seed_genesis()
        .await
        .expect("Failed to seed genesis accounts");

    let intents = Arc::new(IntentService::new(db.clone()));
    let refunds = Arc::new(RefundService::new(db.clone()));
    let settlement = Arc::new(SettlementService::new(
        db.clone(),
        ledger.clone(),
        Duration::from_secs(config.settlement.transaction_timeout_secs),
    ));
    let verifier = SignatureVerifier::new(
        config.webhooks.flutterwave_secret_hash.clone(),
        config.webhooks.allow_unverified,
    );
    let webhooks = Arc::new(WebhookService::new(
        db.clone(),
        intents.clone(),
        settlement.clone(),
        verifier,
    ));

    let intents_data = web::Data::new(intents);
    let refunds_data = web::Data::new(refunds);
    let settlement_data = web::Data::new(settlement);
    let webhooks_data = web::Data::new(webhooks);
    let ledger_data = web::Data::new(ledger);

    let server_config = config.server.clone();
    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(intents_data.clone())
            .app_data(refunds_data.clone())
            .app_data(settlement_data.clone())
            .app_data(webhooks_data.clone())
            .app_data(ledger_data.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await
}
