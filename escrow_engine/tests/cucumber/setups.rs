use std::collections::HashMap;

use cucumber::given;
use escrow_engine::{test_utils::fixtures, Currency};

use crate::cucumber::{
    escrow_world::{xmr, EscrowSystem},
    EscrowWorld,
};

#[given("a fresh install")]
async fn fresh_database(world: &mut EscrowWorld) {
    let system = EscrowSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "the XMR price is {int} USD")]
async fn xmr_price(world: &mut EscrowWorld, price: i64) {
    let prices = HashMap::from([(Currency::USD, price as f64)]);
    world.system().prices.replace(prices);
}

#[given(expr = "vendor '{word}' sells '{word}' for {int} USD with {int} in stock")]
async fn vendor_product(world: &mut EscrowWorld, vendor: String, title: String, price: i64, stock: i64) {
    let vendor_id = world.user(&vendor);
    let product = fixtures::seed_product(&world.system().db, vendor_id, &title, price * 100, stock)
        .await
        .expect("Error seeding product");
    world.products.insert(title, product);
}

#[given(expr = "vendor '{word}' offers delivery for {int} USD")]
async fn vendor_delivery(world: &mut EscrowWorld, vendor: String, price: i64) {
    let vendor_id = world.user(&vendor);
    let dm = fixtures::seed_delivery_method(&world.system().db, vendor_id, price * 100)
        .await
        .expect("Error seeding delivery method");
    world.delivery.insert(vendor_id, dm);
}

#[given(expr = "'{word}' has an empty wallet")]
async fn empty_wallet(world: &mut EscrowWorld, name: String) {
    let user_id = world.user(&name);
    world.system().wallets.create_wallet(user_id).await.expect("Error creating wallet");
}

#[given(expr = "'{word}' has a wallet with {word} XMR")]
async fn funded_wallet(world: &mut EscrowWorld, name: String, amount: String) {
    let user_id = world.user(&name);
    let wallets = &world.system().wallets;
    wallets.create_wallet(user_id).await.expect("Error creating wallet");
    wallets.add_balance(user_id, xmr(&amount)).await.expect("Error funding wallet");
}
