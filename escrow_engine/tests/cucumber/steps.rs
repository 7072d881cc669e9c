use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use cucumber::{given, then, when};
use escrow_engine::{
    db_types::{Invoice, OrderStatusType},
    test_utils::fixtures,
    traits::{Funding, InvoiceManagement, OrderFlowError, WithdrawalError},
};
use rust_decimal::Decimal;

use crate::cucumber::{escrow_world::xmr, EscrowWorld};

async fn checkout(world: &mut EscrowWorld, customer: String, vendor: String, funding: Funding) {
    let customer_id = world.user(&customer);
    let vendor_id = world.user(&vendor);
    let dm = world.delivery.get(&vendor_id).expect("Vendor has no delivery method").id;
    let result = world.system().orders.place_order(customer_id, dm, "", funding).await;
    world.last_checkout = Some(result);
}

async fn order_invoice(world: &EscrowWorld) -> Invoice {
    let order_id = world.last_order().id;
    world
        .system()
        .db
        .fetch_invoice_for_order(order_id)
        .await
        .expect("Error fetching invoice")
        .expect("Order has no invoice")
}

#[given(expr = "'{word}' adds {int} '{word}' to their cart")]
#[when(expr = "'{word}' adds {int} '{word}' to their cart")]
async fn add_to_cart(world: &mut EscrowWorld, name: String, count: i64, title: String) {
    let customer_id = world.user(&name);
    let tier = world.products.get(&title).expect("Unknown product").price_tier_id;
    fixtures::add_to_cart(&world.system().db, customer_id, tier, count).await.expect("Error adding to cart");
}

#[given(expr = "'{word}' checks out with '{word}' using their wallet")]
#[when(expr = "'{word}' checks out with '{word}' using their wallet")]
async fn checkout_with_wallet(world: &mut EscrowWorld, customer: String, vendor: String) {
    checkout(world, customer, vendor, Funding::Wallet).await;
}

#[given(expr = "'{word}' checks out with '{word}' by invoice")]
#[when(expr = "'{word}' checks out with '{word}' by invoice")]
async fn checkout_with_invoice(world: &mut EscrowWorld, customer: String, vendor: String) {
    checkout(world, customer, vendor, Funding::Invoice).await;
}

#[given("the vendor accepts the order")]
#[when("the vendor accepts the order")]
async fn accept_order(world: &mut EscrowWorld) {
    let id = world.last_order().id;
    world.system().orders.accept(id, Utc::now()).await.expect("Error accepting order");
}

#[when(expr = "the vendor dispatched the order {int} days ago")]
async fn dispatch_order(world: &mut EscrowWorld, days: i64) {
    let id = world.last_order().id;
    let when = Utc::now() - Duration::days(days);
    world.system().orders.dispatch(id, when).await.expect("Error dispatching order");
}

#[when("the customer disputes the order")]
async fn dispute_order(world: &mut EscrowWorld) {
    let id = world.last_order().id;
    world.system().disputes.dispute(id).await.expect("Error disputing order");
}

#[when(expr = "the vendor offers to refund {word} of the order and the customer accepts")]
async fn accept_offer(world: &mut EscrowWorld, factor: String) {
    let id = world.last_order().id;
    let factor = factor.parse::<Decimal>().expect("Not a decimal");
    let disputes = &world.system().disputes;
    let offer = disputes.create_offer(id, factor).await.expect("Error creating offer");
    disputes.accept_offer(offer.id).await.expect("Error accepting offer");
}

#[given("the invoice jobs run")]
#[when("the invoice jobs run")]
async fn run_invoice_jobs(world: &mut EscrowWorld) {
    world.system().invoices.run_prepare_invoice_jobs(10, Utc::now()).await.expect("Error running jobs");
}

#[when("the customer pays the invoice in full")]
async fn pay_invoice(world: &mut EscrowWorld) {
    let invoice = order_invoice(world).await;
    let address = invoice.address.expect("Invoice has no address");
    world.system().provider.set_unlocked(&address, invoice.amount_expected);
}

#[when(expr = "the invoices are processed {int} hours later")]
async fn process_invoices(world: &mut EscrowWorld, hours: i64) {
    let system = world.system();
    let now = Utc::now() + Duration::hours(hours);
    let window = system.orders.windows().invoice_payment;
    system.invoices.process_invoices(now, window).await.expect("Error processing invoices");
}

#[when("the order jobs run")]
async fn run_order_jobs(world: &mut EscrowWorld) {
    let orders = &world.system().orders;
    let now = Utc::now();
    orders.process_paid().await.expect("Error in process_paid");
    orders.cancel_expired().await.expect("Error in cancel_expired");
    orders.auto_finalize(now).await.expect("Error in auto_finalize");
    orders.decline_unhandled(now).await.expect("Error in decline_unhandled");
}

#[when(expr = "'{word}' withdraws {word} XMR to '{word}'")]
async fn withdraw(world: &mut EscrowWorld, name: String, amount: String, address: String) {
    let user_id = world.user(&name);
    let result = world.system().withdrawals.withdraw_funds(user_id, &address, xmr(&amount)).await;
    world.last_error = result.err().map(|e| match e {
        WithdrawalError::WithdrawalAmountTooSmall(_) => "too small".to_string(),
        WithdrawalError::NotEnoughBalanceToWithdraw => "not enough balance".to_string(),
        other => other.to_string(),
    });
}

#[when("the withdrawals are sent")]
async fn send_withdrawals(world: &mut EscrowWorld) {
    world.system().withdrawals.transfer_withdrawals(Utc::now()).await.expect("Error sending withdrawals");
}

#[when(expr = "every transfer has {int} confirmations")]
async fn confirm_transfers(world: &mut EscrowWorld, confirmations: u64) {
    let provider = &world.system().provider;
    for hash in provider.transfers() {
        provider.set_confirmations(&hash, confirmations);
    }
}

#[when(expr = "the transfers are checked {int} minutes later")]
async fn check_transfers(world: &mut EscrowWorld, minutes: i64) {
    let now = Utc::now() + Duration::minutes(minutes);
    world.system().withdrawals.handle_transactions(now).await.expect("Error checking transfers");
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut EscrowWorld, ms: u64) {
    tokio::time::sleep(StdDuration::from_millis(ms)).await;
}

#[then("the checkout fails because the balance is too low")]
async fn checkout_fails_on_balance(world: &mut EscrowWorld) {
    match world.last_checkout.as_ref().expect("No checkout has happened") {
        Err(OrderFlowError::NotEnoughBalance) => {},
        other => panic!("Expected the checkout to fail for lack of funds, but got {other:?}"),
    }
}

#[then(expr = "the order is {word}")]
async fn order_status(world: &mut EscrowWorld, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    let id = world.last_order().id;
    let order = world.system().orders.fetch_order(id).await.expect("Error fetching order").expect("Order not found");
    assert_eq!(order.status, expected);
}

#[then(expr = "'{word}' has a balance of {word} XMR")]
async fn balance(world: &mut EscrowWorld, name: String, amount: String) {
    let user_id = world.user(&name);
    let balance = world.system().wallets.balance(user_id).await.expect("Error fetching balance");
    assert_eq!(balance, xmr(&amount));
}

#[then(expr = "the cart of '{word}' is empty")]
async fn cart_is_empty(world: &mut EscrowWorld, name: String) {
    let user_id = world.user(&name);
    let size = fixtures::cart_size(&world.system().db, user_id).await.expect("Error reading cart");
    assert_eq!(size, 0);
}

#[then(expr = "the cart of '{word}' has {int} lines")]
async fn cart_lines(world: &mut EscrowWorld, name: String, lines: i64) {
    let user_id = world.user(&name);
    let size = fixtures::cart_size(&world.system().db, user_id).await.expect("Error reading cart");
    assert_eq!(size, lines);
}

#[then(expr = "'{word}' has {int} in stock")]
async fn stock(world: &mut EscrowWorld, title: String, expected: i64) {
    let product = world.products.get(&title).expect("Unknown product").product_id;
    let inventory = fixtures::inventory(&world.system().db, product).await.expect("Error reading stock");
    assert_eq!(inventory, Some(expected));
}

#[then(expr = "the order invoice is for {word} XMR and has an address")]
async fn invoice_prepared(world: &mut EscrowWorld, amount: String) {
    let invoice = order_invoice(world).await;
    assert_eq!(invoice.amount_expected, xmr(&amount));
    assert!(invoice.address.is_some(), "Invoice has no address");
}

#[then("the invoice address was released")]
async fn invoice_released(world: &mut EscrowWorld) {
    let invoice = order_invoice(world).await;
    let address = invoice.address.expect("Invoice has no address");
    assert!(world.system().provider.deleted_addresses().contains(&address));
}

#[then("the order has a top-grade review")]
async fn default_review(world: &mut EscrowWorld) {
    let id = world.last_order().id;
    let review = world.system().orders.fetch_review(id).await.expect("Error fetching review").expect("No review");
    assert_eq!(review.grade, 5);
}

#[then(expr = "the withdrawal fails because the amount is {string}")]
async fn withdrawal_fails(world: &mut EscrowWorld, reason: String) {
    assert_eq!(world.last_error.as_deref(), Some(reason.as_str()));
}

#[then(expr = "{int} transfer(s) of {word} XMR was/were made")]
async fn transfers_made(world: &mut EscrowWorld, count: usize, amount: String) {
    let provider = &world.system().provider;
    let transfers = provider.transfers();
    assert_eq!(transfers.len(), count);
    for hash in transfers {
        let total = provider.transfer_destinations(&hash).iter().map(|d| d.amount).sum::<escrow_engine::Piconero>();
        assert_eq!(total, xmr(&amount));
    }
}

#[then(expr = "{int} transfer(s) is/are still in flight")]
async fn transfers_in_flight(world: &mut EscrowWorld, count: usize) {
    let db = &world.system().db;
    let txs = escrow_engine::traits::WithdrawalManagement::fetch_transactions(db).await.expect("Error fetching txs");
    assert_eq!(txs.len(), count);
}
