use std::{collections::HashMap, time::Duration as StdDuration};

use chrono::{Duration, Utc};
use escrow_engine::{
    db_types::{DeliveryMethodId, DisputeOfferStatus, InvoiceStatus, OrderStatusType, Piconero, WithdrawalStatus},
    escrow_api::withdrawal_api::TRANSFER_SETTLE_TIME,
    events::EventProducers,
    fees::add_fee,
    test_utils::{fixtures, mock_provider::MockPaymentProvider},
    traits::{
        DisputeError,
        Funding,
        InvoiceError,
        InvoiceManagement,
        JobQueue,
        OrderFlowError,
        WalletManagement,
        WithdrawalError,
        WithdrawalManagement,
    },
    Currency,
    DisputeApi,
    InvoiceApi,
    OrderFlowApi,
    OrderWindows,
    PriceTable,
    SqliteDatabase,
    WithdrawalApi,
    WITHDRAWAL_FEE,
};
use rust_decimal_macros::dec;

use crate::support::{seed_cart, setup, tear_down, CUSTOMER, VENDOR};

mod support;

fn order_api(db: &SqliteDatabase) -> OrderFlowApi<SqliteDatabase> {
    let prices = PriceTable::with_prices(HashMap::from([(Currency::USD, 100.0)]));
    OrderFlowApi::new(db.clone(), prices, OrderWindows::default(), EventProducers::default())
}

/// A dispatched, wallet-funded order for 1 XMR
async fn dispatched_order(db: &SqliteDatabase, api: &OrderFlowApi<SqliteDatabase>) -> escrow_engine::db_types::Order {
    let dm = seed_cart(db, 10_000, 1).await;
    db.create_wallet(CUSTOMER).await.unwrap();
    db.create_wallet(VENDOR).await.unwrap();
    db.add_balance(CUSTOMER, add_fee(Piconero::from_xmr(1))).await.unwrap();
    let placed = api.place_order(CUSTOMER, dm, "", Funding::Wallet).await.unwrap();
    let id = placed.order.id;
    api.accept(id, Utc::now()).await.unwrap();
    api.dispatch(id, Utc::now()).await.unwrap()
}

#[tokio::test]
async fn forced_settlement_splits_the_escrow() {
    let db = setup().await;
    let api = order_api(&db);
    let order = dispatched_order(&db, &api).await;
    let disputes = DisputeApi::new(db.clone(), EventProducers::default());
    disputes.dispute(order.id).await.unwrap();
    // Offers outside [0, 1] are refused
    let err = disputes.create_offer(order.id, dec!(1.5)).await.unwrap_err();
    assert!(matches!(err, DisputeError::InvalidRefundFactor(_)));
    let offer = disputes.create_offer(order.id, dec!(0.5)).await.unwrap();
    let declined = disputes.decline_offer(offer.id).await.unwrap();
    assert_eq!(declined.status, DisputeOfferStatus::Declined);
    let err = disputes.accept_offer(offer.id).await.unwrap_err();
    assert!(matches!(err, DisputeError::OfferNotPending(_, DisputeOfferStatus::Declined)));

    let settlement = disputes.force_resolve(order.id, dec!(0.3)).await.unwrap();
    assert_eq!(settlement.order.status, OrderStatusType::Settled);
    assert_eq!(settlement.offer.status, DisputeOfferStatus::Forced);
    assert_eq!(settlement.split.customer_refund, Piconero::from(300_000_000_000));
    assert_eq!(settlement.split.vendor_refund, Piconero::from(700_000_000_000));
    let customer = db.fetch_wallet_for_user(CUSTOMER).await.unwrap().unwrap();
    let vendor = db.fetch_wallet_for_user(VENDOR).await.unwrap().unwrap();
    assert_eq!(customer.balance, Piconero::from(300_000_000_000));
    assert_eq!(vendor.balance, Piconero::from(700_000_000_000));
    // A settled dispute cannot be settled again
    let err = disputes.force_resolve(order.id, dec!(1)).await.unwrap_err();
    assert!(matches!(err, DisputeError::InvalidStatus(_, OrderStatusType::Settled)));
    assert_eq!(disputes.offers(order.id).await.unwrap().len(), 2);
    tear_down(db).await;
}

#[tokio::test]
async fn declined_orders_are_refunded_with_the_fee() {
    let db = setup().await;
    let api = order_api(&db);
    let dm = seed_cart(&db, 10_000, 1).await;
    db.create_wallet(CUSTOMER).await.unwrap();
    db.add_balance(CUSTOMER, Piconero::from_xmr(2)).await.unwrap();
    let placed = api.place_order(CUSTOMER, dm, "", Funding::Wallet).await.unwrap();
    assert_eq!(placed.order.status, OrderStatusType::Paid);
    let order = api.decline(placed.order.id).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Declined);
    let wallet = db.fetch_wallet_for_user(CUSTOMER).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Piconero::from_xmr(2));
    // Terminal orders stay put
    let err = api.cancel(order.id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidStatus { current: OrderStatusType::Declined, .. }));
    tear_down(db).await;
}

#[tokio::test]
async fn unattended_orders_are_declined() {
    let db = setup().await;
    let api = order_api(&db);
    let dm = seed_cart(&db, 10_000, 1).await;
    db.create_wallet(CUSTOMER).await.unwrap();
    db.add_balance(CUSTOMER, Piconero::from_xmr(2)).await.unwrap();
    let placed = api.place_order(CUSTOMER, dm, "", Funding::Wallet).await.unwrap();
    let report = api.decline_unhandled(Utc::now()).await.unwrap();
    assert!(report.is_empty());
    let later = Utc::now() + api.windows().processing + Duration::minutes(1);
    let report = api.decline_unhandled(later).await.unwrap();
    assert_eq!(report.processed, 1);
    let order = api.fetch_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Declined);
    tear_down(db).await;
}

#[tokio::test]
async fn failed_prepare_invoice_jobs_are_retried() {
    let db = setup().await;
    let provider = MockPaymentProvider::new();
    let api = InvoiceApi::new(db.clone(), provider.clone(), StdDuration::from_secs(1), EventProducers::default());
    let invoice = api.create_invoice(Piconero::from_xmr(1)).await.unwrap();
    provider.fail_invoices(true);
    let now = Utc::now();
    let report = api.run_prepare_invoice_jobs(10, now).await.unwrap();
    assert_eq!(report.failed, 1);
    // The failed job is not due again until its back-off has passed
    let report = api.run_prepare_invoice_jobs(10, now).await.unwrap();
    assert!(report.is_empty());
    provider.fail_invoices(false);
    let report = api.run_prepare_invoice_jobs(10, now + Duration::minutes(10)).await.unwrap();
    assert_eq!(report.processed, 1);
    let prepared = api.prepare_invoice(invoice.id).await.unwrap_err();
    assert!(matches!(prepared, InvoiceError::InvoiceAlreadyPrepared(_)));
    let job = db.claim_jobs("prepare_invoice", 10, now + Duration::hours(1), Duration::minutes(5)).await.unwrap();
    assert!(job.is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn deposits_are_credited_once() {
    let db = setup().await;
    let provider = MockPaymentProvider::new();
    let api = InvoiceApi::new(db.clone(), provider.clone(), StdDuration::from_secs(1), EventProducers::default());
    db.create_wallet(CUSTOMER).await.unwrap();
    api.run_prepare_invoice_jobs(10, Utc::now()).await.unwrap();
    let address = db.deposit_address(CUSTOMER).await.unwrap().expect("Deposit address was not assigned");
    provider.set_unlocked(&address, Piconero::from_xmr(3));
    api.process_invoices(Utc::now(), Duration::hours(6)).await.unwrap();
    let report = api.handle_deposits().await.unwrap();
    assert_eq!(report.processed, 1);
    let report = api.handle_deposits().await.unwrap();
    assert_eq!(report.processed, 0);
    let wallet = db.fetch_wallet_for_user(CUSTOMER).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Piconero::from_xmr(3));
    // Deposit invoices never expire
    provider.set_unlocked(&address, Piconero::from_xmr(4));
    api.process_invoices(Utc::now() + Duration::days(30), Duration::hours(6)).await.unwrap();
    api.handle_deposits().await.unwrap();
    let wallet = db.fetch_wallet_for_user(CUSTOMER).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Piconero::from_xmr(4));
    tear_down(db).await;
}

#[tokio::test]
async fn withdrawals_must_exceed_the_fee() {
    let db = setup().await;
    let api = WithdrawalApi::new(db.clone(), MockPaymentProvider::new(), StdDuration::from_secs(1));
    db.create_wallet(CUSTOMER).await.unwrap();
    db.add_balance(CUSTOMER, Piconero::from_xmr(1)).await.unwrap();
    let err = api.withdraw_funds(CUSTOMER, "4CustomerAddress", WITHDRAWAL_FEE).await.unwrap_err();
    assert!(matches!(err, WithdrawalError::WithdrawalAmountTooSmall(fee) if fee == WITHDRAWAL_FEE));
    let sent = api.withdraw_funds(CUSTOMER, "4CustomerAddress", WITHDRAWAL_FEE + Piconero::from(1)).await.unwrap();
    assert_eq!(sent, Piconero::from(1));
    let wallet = db.fetch_wallet_for_user(CUSTOMER).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Piconero::from_xmr(1) - WITHDRAWAL_FEE - Piconero::from(1));
    tear_down(db).await;
}

#[tokio::test]
async fn failed_transfers_return_withdrawals_to_pending() {
    let db = setup().await;
    let provider = MockPaymentProvider::new();
    let api = WithdrawalApi::new(db.clone(), provider.clone(), StdDuration::from_secs(1));
    db.create_wallet(CUSTOMER).await.unwrap();
    db.add_balance(CUSTOMER, Piconero::from_xmr(1)).await.unwrap();
    api.withdraw_funds(CUSTOMER, "4CustomerAddress", Piconero::from_xmr(1)).await.unwrap();
    provider.fail_transfers(true);
    assert!(api.transfer_withdrawals(Utc::now()).await.is_err());
    let pending = api.withdrawals_for_user(CUSTOMER).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, WithdrawalStatus::Pending);
    provider.fail_transfers(false);
    let report = api.transfer_withdrawals(Utc::now()).await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(api.withdrawals_for_user(CUSTOMER).await.unwrap().is_empty());
    assert_eq!(provider.transfers().len(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn unpaid_invoices_expire_after_the_payment_window() {
    let db = setup().await;
    let provider = MockPaymentProvider::new();
    let invoices = InvoiceApi::new(db.clone(), provider.clone(), StdDuration::from_secs(1), EventProducers::default());
    let api = order_api(&db);
    let dm = seed_cart(&db, 1_000, 1).await;
    let placed = api.place_order(CUSTOMER, dm, "", Funding::Invoice).await.unwrap();
    invoices.run_prepare_invoice_jobs(10, Utc::now()).await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(5)).await;
    let report = invoices.process_invoices(Utc::now(), Duration::milliseconds(1)).await.unwrap();
    assert_eq!(report.processed, 1);
    let report = api.cancel_expired().await.unwrap();
    assert_eq!(report.processed, 1);
    let order = api.fetch_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    tear_down(db).await;
}

#[tokio::test]
async fn invoices_that_never_got_an_address_expire() {
    let db = setup().await;
    let provider = MockPaymentProvider::new();
    let invoices = InvoiceApi::new(db.clone(), provider.clone(), StdDuration::from_secs(1), EventProducers::default());
    let api = order_api(&db);
    let dm = seed_cart(&db, 1_000, 1).await;
    let placed = api.place_order(CUSTOMER, dm, "", Funding::Invoice).await.unwrap();
    let invoice = db.fetch_invoice_for_order(placed.order.id).await.unwrap().unwrap();
    assert!(invoice.address.is_none());
    let report = invoices.process_invoices(Utc::now(), Duration::hours(6)).await.unwrap();
    assert!(report.is_empty());
    // The provider was down for longer than the payment window, so the prepare job never ran
    let later = Utc::now() + Duration::days(30);
    let report = invoices.process_invoices(later, Duration::hours(6)).await.unwrap();
    assert_eq!(report.processed, 1);
    let expired = db.fetch_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(expired.status, InvoiceStatus::Expired);
    assert!(expired.address.is_none());
    // A late job must not hand out an address for the expired invoice
    let report = invoices.run_prepare_invoice_jobs(10, later).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(provider.addresses().is_empty());
    let err = invoices.prepare_invoice(invoice.id).await.unwrap_err();
    assert!(matches!(err, InvoiceError::InvoiceNotPending(_, InvoiceStatus::Expired)));
    let report = api.cancel_expired().await.unwrap();
    assert_eq!(report.processed, 1);
    let order = api.fetch_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    tear_down(db).await;
}

#[tokio::test]
async fn unlocked_amounts_never_go_down() {
    let db = setup().await;
    let provider = MockPaymentProvider::new();
    let api = InvoiceApi::new(db.clone(), provider.clone(), StdDuration::from_secs(1), EventProducers::default());
    let invoice = api.create_invoice(Piconero::from_xmr(10)).await.unwrap();
    api.run_prepare_invoice_jobs(10, Utc::now()).await.unwrap();
    let address = db.fetch_invoice(invoice.id).await.unwrap().unwrap().address.expect("Invoice was not prepared");
    provider.set_unlocked(&address, Piconero::from_xmr(6));
    api.process_invoices(Utc::now(), Duration::hours(6)).await.unwrap();
    provider.set_unlocked(&address, Piconero::from_xmr(2));
    let report = api.process_invoices(Utc::now(), Duration::hours(6)).await.unwrap();
    assert_eq!(report.skipped, 1);
    let invoice = db.fetch_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(invoice.amount_unlocked, Piconero::from_xmr(6));
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    tear_down(db).await;
}

#[tokio::test]
async fn racing_transitions_have_one_winner() {
    let db = setup().await;
    let api = order_api(&db);
    let dm = seed_cart(&db, 1_000, 1).await;
    let placed = api.place_order(CUSTOMER, dm, "", Funding::Invoice).await.unwrap();
    let id = placed.order.id;
    let (cancelled, paid) = tokio::join!(api.cancel(id), api.mark_paid(id));
    assert_ne!(cancelled.is_ok(), paid.is_ok());
    let loser = cancelled.err().or(paid.err()).unwrap();
    assert!(matches!(loser, OrderFlowError::InvalidStatus { .. }));
    let order = api.fetch_order(id).await.unwrap().unwrap();
    assert!(matches!(order.status, OrderStatusType::Cancelled | OrderStatusType::Paid));
    tear_down(db).await;
}

#[tokio::test]
async fn racing_finalize_and_dispute_settle_once() {
    let db = setup().await;
    let api = order_api(&db);
    let disputes = DisputeApi::new(db.clone(), EventProducers::default());
    let order = dispatched_order(&db, &api).await;
    let (finalized, disputed) = tokio::join!(api.finalize(order.id), disputes.dispute(order.id));
    assert_ne!(finalized.is_ok(), disputed.is_ok());
    let vendor = db.fetch_wallet_for_user(VENDOR).await.unwrap().unwrap();
    if finalized.is_ok() {
        assert_eq!(vendor.balance, Piconero::from_xmr(1));
        assert!(matches!(disputed, Err(OrderFlowError::InvalidStatus { current: OrderStatusType::Finalized, .. })));
    } else {
        // The escrow stays frozen until the dispute is settled
        assert_eq!(vendor.balance, Piconero::from(0));
        assert!(matches!(finalized, Err(OrderFlowError::InvalidStatus { current: OrderStatusType::Disputed, .. })));
    }
    tear_down(db).await;
}

#[tokio::test]
async fn checkout_refuses_unusable_carts() {
    let db = setup().await;
    let api = order_api(&db);
    let dm = fixtures::seed_delivery_method(&db, VENDOR, 0).await.unwrap();
    let err = api.place_order(CUSTOMER, dm.id, "", Funding::Invoice).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::CartIsEmpty));
    let err = api.place_order(VENDOR, dm.id, "", Funding::Invoice).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::CustomerIsVendor));
    let err = api.place_order(CUSTOMER, DeliveryMethodId(9999), "", Funding::Invoice).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::DeliveryMethodUnavailable));
    fixtures::delete_delivery_method(&db, dm.id).await.unwrap();
    let err = api.place_order(CUSTOMER, dm.id, "", Funding::Invoice).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::DeliveryMethodUnavailable));

    let product = fixtures::seed_product(&db, VENDOR, "gadget", 500, 10).await.unwrap();
    fixtures::add_to_cart(&db, CUSTOMER, product.price_tier_id, 1).await.unwrap();
    let dm = fixtures::seed_delivery_method(&db, VENDOR, 0).await.unwrap();
    fixtures::delete_price_tier(&db, product.price_tier_id).await.unwrap();
    let err = api.place_order(CUSTOMER, dm.id, "", Funding::Invoice).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::PricingUnavailable));
    // Nothing was checked out
    assert_eq!(fixtures::cart_size(&db, CUSTOMER).await.unwrap(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn accepting_needs_enough_inventory() {
    let db = setup().await;
    let api = order_api(&db);
    let product = fixtures::seed_product(&db, VENDOR, "rare widget", 1_000, 1).await.unwrap();
    let dm = fixtures::seed_delivery_method(&db, VENDOR, 0).await.unwrap();
    fixtures::add_to_cart(&db, CUSTOMER, product.price_tier_id, 2).await.unwrap();
    db.create_wallet(CUSTOMER).await.unwrap();
    db.add_balance(CUSTOMER, Piconero::from_xmr(1)).await.unwrap();
    let placed = api.place_order(CUSTOMER, dm.id, "", Funding::Wallet).await.unwrap();
    let err = api.accept(placed.order.id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InsufficientInventory(p) if p == product.product_id));
    // The failed accept leaves the order and the stock untouched
    let order = api.fetch_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(fixtures::inventory(&db, product.product_id).await.unwrap(), Some(1));
    let order = api.decline(placed.order.id).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Declined);
    tear_down(db).await;
}

#[tokio::test]
async fn failed_transfers_stay_in_flight() {
    let db = setup().await;
    let provider = MockPaymentProvider::new();
    let api = WithdrawalApi::new(db.clone(), provider.clone(), StdDuration::from_secs(1));
    db.create_wallet(CUSTOMER).await.unwrap();
    db.add_balance(CUSTOMER, Piconero::from_xmr(1)).await.unwrap();
    api.withdraw_funds(CUSTOMER, "4CustomerAddress", Piconero::from_xmr(1)).await.unwrap();
    let now = Utc::now();
    api.transfer_withdrawals(now).await.unwrap();
    let hashes = provider.transfers();
    assert_eq!(hashes.len(), 1);
    provider.set_transfer_failed(&hashes[0]);
    let later = now + TRANSFER_SETTLE_TIME + Duration::minutes(1);
    let report = api.handle_transactions(later).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 0);
    let txs = db.fetch_transactions().await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].hash, hashes[0]);
    tear_down(db).await;
}
