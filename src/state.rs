use std::sync::Arc;
use std::time::Duration;

use mongodb::Database;

use crate::config::AppConfig;
use crate::database::repository::MongoRepository;
use crate::models::trip::Trip;
use crate::models::user::User;
use crate::services::checkout::CheckoutOrchestrator;
use crate::services::ledger::{BookingLedger, MongoBookingStore};
use crate::services::price_feed::FixedRateFeed;
use crate::services::settlement::{CardSimulation, OnChainTransfer};
use crate::services::wallet::JsonRpcWallet;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub trips: MongoRepository<Trip>,
    pub users: MongoRepository<User>,
    pub ledger: BookingLedger,
    pub checkout: Arc<CheckoutOrchestrator>,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        let trips = MongoRepository::<Trip>::new(&db, "trips");
        let users = MongoRepository::<User>::new(&db, "users");
        let ledger = BookingLedger::new(Arc::new(MongoBookingStore::new(&db)));

        let wallet = Arc::new(JsonRpcWallet::new(config.eth_rpc_url.clone()));
        let price_feed = Arc::new(FixedRateFeed::new(config.eth_usd_rate));

        let card = Arc::new(CardSimulation::new(Duration::from_millis(
            config.card_sim_delay_ms,
        )));
        let crypto = Arc::new(OnChainTransfer::new(
            wallet,
            price_feed,
            config.company_eth_address.clone(),
            chrono::Duration::seconds(config.price_max_age_secs as i64),
        ));

        let checkout = Arc::new(CheckoutOrchestrator::new(
            Arc::new(trips.clone()),
            card,
            crypto,
            ledger.clone(),
        ));

        AppState {
            db,
            config,
            trips,
            users,
            ledger,
            checkout,
        }
    }
}
