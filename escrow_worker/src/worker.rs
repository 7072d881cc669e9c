use std::time::Duration;

use actix_web::{http::KeepAlive, middleware::Logger, web, App, HttpServer};
use escrow_engine::{events::EventProducers, InvoiceApi, PriceTable, SqliteDatabase, WithdrawalApi};
use log::*;
use tokio::sync::watch;

use crate::{
    config::WorkerConfig,
    errors::WorkerError,
    moneropay::MoneroPayClient,
    price_feed::PriceFeed,
    routes::health,
    scheduler::{start_invoice_jobs, start_order_jobs, start_price_feed, start_price_refresh, start_reconciliation},
};

/// Connects to the database, starts every periodic task and serves the health check until the process is asked to
/// stop. The tasks are then signalled and awaited.
pub async fn run_worker(config: WorkerConfig) -> Result<(), WorkerError> {
    if config.database_url.is_empty() {
        return Err(WorkerError::ConfigurationError("ESC_DATABASE_URL is not set".into()));
    }
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| WorkerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| WorkerError::InitializeError(e.to_string()))?;
    }
    let provider = MoneroPayClient::new(&config.moneropay_url)?;
    let feed = PriceFeed::new(&config.price_feed_url, config.provider_timeout, config.price_feed_proxy.as_deref())?;
    let prices = PriceTable::new();
    if let Err(e) = prices.start(&db).await {
        warn!("🕰️ No stored prices yet ({e}). The health check reports unavailable until the price feed delivers.");
    }
    let feed_period = config.price_feed_interval.to_std().map_err(|e| WorkerError::ConfigurationError(e.to_string()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let producers = EventProducers::default();
    let invoice_api = || {
        InvoiceApi::new(db.clone(), provider.clone(), config.provider_timeout, producers.clone())
            .with_callback_url(config.callback_url.clone())
    };
    let withdrawal_api = WithdrawalApi::new(db.clone(), provider.clone(), config.provider_timeout);
    let handles = vec![
        start_order_jobs(db.clone(), prices.clone(), config.windows, producers.clone(), shutdown_rx.clone()),
        start_reconciliation(invoice_api(), withdrawal_api, config.windows.invoice_payment, shutdown_rx.clone()),
        start_invoice_jobs(invoice_api(), shutdown_rx.clone()),
        start_price_feed(db.clone(), feed, prices.clone(), feed_period, shutdown_rx.clone()),
        start_price_refresh(db.clone(), prices.clone(), feed_period, shutdown_rx),
    ];

    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %U").log_target("escrow::access_log"))
            .app_data(web::Data::new(prices.clone()))
            .service(health)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    let result = srv.await.map_err(WorkerError::from);

    info!("🕰️ Stopping the periodic tasks");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            error!("🕰️ A periodic task ended abnormally. {e}");
        }
    }
    result
}
