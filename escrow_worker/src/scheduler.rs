//! The periodic reconciliation tasks. Each task runs on its own interval until the shutdown signal fires. A failing
//! run is logged and retried on the next tick.
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use escrow_engine::{
    events::EventProducers,
    traits::JobReport,
    ExchangeRateApi,
    InvoiceApi,
    OrderFlowApi,
    OrderWindows,
    PriceTable,
    SqliteDatabase,
    WithdrawalApi,
};
use log::*;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, Interval, MissedTickBehavior},
};

use crate::{moneropay::MoneroPayClient, price_feed::PriceFeed};

pub const ORDER_JOB_PERIOD: StdDuration = StdDuration::from_secs(60);
pub const RECONCILIATION_PERIOD: StdDuration = StdDuration::from_secs(60);
pub const INVOICE_JOB_PERIOD: StdDuration = StdDuration::from_secs(5);
/// Maximum number of prepare-invoice jobs claimed per run
pub const INVOICE_JOB_BATCH: i64 = 10;

/// Waits for the next tick. Returns false once the worker is shutting down.
async fn next_tick(timer: &mut Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = timer.tick() => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

fn new_timer(period: StdDuration) -> Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

fn log_run<E: std::fmt::Display>(job: &str, result: Result<JobReport, E>) {
    match result {
        Ok(report) if report.is_empty() => trace!("🕰️ {job}: nothing to do"),
        Ok(report) => debug!("🕰️ {job}: {report}"),
        Err(e) => error!("🕰️ Error running the {job} job: {e}"),
    }
}

/// Starts the order jobs: paid orders, expired invoices, auto-finalization and unattended orders, in that order.
pub fn start_order_jobs(
    db: SqliteDatabase,
    prices: PriceTable,
    windows: OrderWindows,
    producers: EventProducers,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = new_timer(ORDER_JOB_PERIOD);
        let api = OrderFlowApi::new(db, prices, windows, producers);
        info!("🕰️ Order job worker started");
        while next_tick(&mut timer, &mut shutdown).await {
            log_run("process_paid", api.process_paid().await);
            log_run("cancel_expired", api.cancel_expired().await);
            let now = Utc::now();
            log_run("auto_finalize", api.auto_finalize(now).await);
            log_run("decline_unhandled", api.decline_unhandled(now).await);
        }
        info!("🕰️ Order job worker stopped");
    })
}

/// Starts the payment reconciliation: invoice progress, wallet deposits and withdrawals
pub fn start_reconciliation(
    invoices: InvoiceApi<SqliteDatabase, MoneroPayClient>,
    withdrawals: WithdrawalApi<SqliteDatabase, MoneroPayClient>,
    payment_window: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = new_timer(RECONCILIATION_PERIOD);
        info!("🕰️ Payment reconciliation worker started");
        while next_tick(&mut timer, &mut shutdown).await {
            let now = Utc::now();
            log_run("process_invoices", invoices.process_invoices(now, payment_window).await);
            log_run("handle_deposits", invoices.handle_deposits().await);
            log_run("handle_withdrawals", withdrawals.handle_withdrawals(now).await);
        }
        info!("🕰️ Payment reconciliation worker stopped");
    })
}

/// Starts the prepare-invoice job runner
pub fn start_invoice_jobs(
    invoices: InvoiceApi<SqliteDatabase, MoneroPayClient>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = new_timer(INVOICE_JOB_PERIOD);
        info!("🕰️ Invoice job runner started");
        while next_tick(&mut timer, &mut shutdown).await {
            log_run("prepare_invoice", invoices.run_prepare_invoice_jobs(INVOICE_JOB_BATCH, Utc::now()).await);
        }
        info!("🕰️ Invoice job runner stopped");
    })
}

/// Fetches and stores prices every `period`, reloading the price table after each successful fetch. The first fetch
/// happens immediately.
pub fn start_price_feed(
    db: SqliteDatabase,
    feed: PriceFeed,
    prices: PriceTable,
    period: StdDuration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = new_timer(period);
        let api = ExchangeRateApi::new(db.clone());
        info!("🕰️ Price feed started. Prices are fetched every {}s", period.as_secs());
        while next_tick(&mut timer, &mut shutdown).await {
            if let Err(e) = feed.update(&api).await {
                warn!("🕰️ Could not update prices. The stored prices remain in use. {e}");
                continue;
            }
            if let Err(e) = prices.load(&db).await {
                warn!("🕰️ Prices were stored but the price table could not be reloaded. {e}");
            }
        }
        info!("🕰️ Price feed stopped");
    })
}

/// Keeps the in-memory price table in step with the stored prices
pub fn start_price_refresh(
    db: SqliteDatabase,
    prices: PriceTable,
    period: StdDuration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move { prices.run_refresh(db, period, shutdown).await })
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn next_tick_stops_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let mut timer = new_timer(StdDuration::from_millis(5));
        assert!(next_tick(&mut timer, &mut rx).await);
        tx.send(true).unwrap();
        assert!(!next_tick(&mut timer, &mut rx).await);
    }

    #[tokio::test]
    async fn next_tick_stops_when_the_sender_is_gone() {
        let (tx, mut rx) = watch::channel(false);
        let mut timer = new_timer(StdDuration::from_secs(3600));
        // The first tick of an interval completes immediately
        assert!(next_tick(&mut timer, &mut rx).await);
        drop(tx);
        assert!(!next_tick(&mut timer, &mut rx).await);
    }
}
