use std::{collections::HashMap, str::FromStr, time::Duration};

use cucumber::World;
use escrow_engine::{
    db_types::{DeliveryMethod, Order, Piconero, UserId},
    events::EventProducers,
    test_utils::{
        fixtures::SeededProduct,
        mock_provider::MockPaymentProvider,
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    traits::{OrderFlowError, PlacedOrder},
    DisputeApi,
    InvoiceApi,
    OrderFlowApi,
    OrderWindows,
    PriceTable,
    SqliteDatabase,
    WalletApi,
    WithdrawalApi,
};
use esc_common::PICONERO_PER_XMR;
use log::*;
use rust_decimal::{prelude::ToPrimitive, Decimal};

#[derive(Default, Debug, World)]
pub struct EscrowWorld {
    pub system: Option<EscrowSystem>,
    pub users: HashMap<String, UserId>,
    pub products: HashMap<String, SeededProduct>,
    pub delivery: HashMap<UserId, DeliveryMethod>,
    pub last_checkout: Option<Result<PlacedOrder, OrderFlowError>>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct EscrowSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub provider: MockPaymentProvider,
    pub prices: PriceTable,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub wallets: WalletApi<SqliteDatabase>,
    pub invoices: InvoiceApi<SqliteDatabase, MockPaymentProvider>,
    pub withdrawals: WithdrawalApi<SqliteDatabase, MockPaymentProvider>,
    pub disputes: DisputeApi<SqliteDatabase>,
}

impl EscrowSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        create_database(&url).await;
        run_migrations(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let provider = MockPaymentProvider::new();
        let prices = PriceTable::new();
        let timeout = Duration::from_secs(5);
        let producers = EventProducers::default();
        Self {
            db_path: url,
            orders: OrderFlowApi::new(db.clone(), prices.clone(), OrderWindows::default(), producers.clone()),
            wallets: WalletApi::new(db.clone()),
            invoices: InvoiceApi::new(db.clone(), provider.clone(), timeout, producers.clone()),
            withdrawals: WithdrawalApi::new(db.clone(), provider.clone(), timeout),
            disputes: DisputeApi::new(db.clone(), producers),
            db,
            provider,
            prices,
        }
    }
}

impl EscrowWorld {
    pub fn system(&self) -> &EscrowSystem {
        self.system.as_ref().expect("System not initialised. Start the scenario with 'Given a fresh install'")
    }

    /// Users are identified by name in the features. Each new name gets the next id.
    pub fn user(&mut self, name: &str) -> UserId {
        let next = UserId::from(self.users.len() as i64 + 1);
        *self.users.entry(name.to_string()).or_insert(next)
    }

    pub fn last_order(&self) -> &Order {
        match self.last_checkout.as_ref().expect("No checkout has happened") {
            Ok(placed) => &placed.order,
            Err(e) => panic!("The last checkout failed: {e}"),
        }
    }
}

/// Parses a decimal XMR amount such as `10.05` into piconero
pub fn xmr(amount: &str) -> Piconero {
    let value = Decimal::from_str(amount).expect("Not a decimal amount");
    let pico = (value * Decimal::from(PICONERO_PER_XMR)).trunc().to_i64().expect("Amount out of range");
    Piconero::from(pico)
}
