//! The assembled market engine.
//!
//! `MarketEngine` owns the persistent store, the economy tuning, the price
//! memo, the volatility RNG and the outbound sinks. The operation surface is
//! implemented across the sibling modules (`listing`, `trade`, `bot`,
//! `inventory`) as further `impl MarketEngine` blocks.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;

use crate::config::EconomyConfig;
use crate::market::errors::MarketError;
use crate::market::events::{EventPublisher, LogNotifier, MarketEvent, NotificationSink};
use crate::market::pricing::{self, PriceBoard, DEMAND_WINDOW_HOURS};
use crate::market::storage::MarketStore;
use crate::market::types::{
    AccountRecord, Credits, ItemRecord, ItemTier, ItemUnit, ListingRecord, LEVEL_CAP,
};

/// Goods the system vendor always keeps on offer, so the market has a
/// baseline to trade against on a fresh world.
const SEED_GOODS: &[(&str, ItemUnit, ItemTier)] = &[
    ("Bread", ItemUnit::Piece, ItemTier::Low),
    ("Water", ItemUnit::Liter, ItemTier::Low),
    ("Cheese", ItemUnit::Kg, ItemTier::Medium),
    ("Tomato", ItemUnit::Kg, ItemTier::Low),
    ("Apple", ItemUnit::Kg, ItemTier::Low),
    ("Potato", ItemUnit::Kg, ItemTier::Low),
    ("Cloth", ItemUnit::Piece, ItemTier::Low),
    ("Shoes", ItemUnit::Piece, ItemTier::High),
    ("Jacket", ItemUnit::Piece, ItemTier::High),
    ("Iron", ItemUnit::Kg, ItemTier::Medium),
    ("Coal", ItemUnit::Kg, ItemTier::Low),
    ("Gold", ItemUnit::Kg, ItemTier::Scarce),
];

const SEED_LISTING_QUANTITY: u32 = 1_000;
const SEED_QUALITY: f64 = 50.0;
const SYSTEM_STARTING_BALANCE: Credits = Credits::from_whole(900_000_000);

pub struct MarketEngine {
    store: Arc<MarketStore>,
    econ: EconomyConfig,
    system_account: String,
    prices: PriceBoard,
    rng: Mutex<StdRng>,
    notifier: Box<dyn NotificationSink>,
    events: EventPublisher,
}

impl MarketEngine {
    pub fn new(
        store: Arc<MarketStore>,
        econ: EconomyConfig,
        system_account: impl Into<String>,
    ) -> Self {
        Self {
            store,
            econ,
            system_account: system_account.into(),
            prices: PriceBoard::new(),
            rng: Mutex::new(StdRng::from_entropy()),
            notifier: Box::new(LogNotifier),
            events: EventPublisher::new(128),
        }
    }

    /// Pin the volatility RNG so scoring outcomes are reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Replace the default log-only notification sink.
    pub fn with_notifier(mut self, notifier: Box<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub(crate) fn store(&self) -> &MarketStore {
        &self.store
    }

    pub(crate) fn econ(&self) -> &EconomyConfig {
        &self.econ
    }

    pub(crate) fn system_account(&self) -> &str {
        &self.system_account
    }

    /// Subscribe to the market event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: MarketEvent) {
        self.events.publish(event);
    }

    /// Deliver a notification, swallowing sink failures.
    pub(crate) fn notify(&self, user: &str, message: &str) {
        if let Err(err) = self.notifier.notify(user, message) {
            warn!("notification delivery failed for {}: {}", user, err);
        }
    }

    // ------------------------------------------------------------------
    // Pricing and aggregates
    // ------------------------------------------------------------------

    /// Current reference price for a good, memoized until the next write
    /// touching the name invalidates it.
    pub fn market_price(&self, item_name: &str) -> Result<Credits, MarketError> {
        if let Some(price) = self.prices.get(item_name) {
            return Ok(price);
        }
        let price = pricing::compute_market_price(&self.store, &self.econ, item_name)?;
        self.prices.put(item_name, price);
        Ok(price)
    }

    pub(crate) fn invalidate_price(&self, item_name: &str) {
        self.prices.invalidate(item_name);
    }

    /// Total quantity on offer across active listings for a good.
    pub fn global_supply(&self, item_name: &str) -> Result<u64, MarketError> {
        self.store.active_supply(item_name)
    }

    /// Transacted volume for a good over the trailing demand window.
    pub fn global_demand(&self, item_name: &str) -> Result<u64, MarketError> {
        let cutoff = Utc::now() - Duration::hours(DEMAND_WINDOW_HOURS);
        self.store.demand_since(item_name, cutoff)
    }

    // ------------------------------------------------------------------
    // Randomness (seedable, see `with_rng_seed`)
    // ------------------------------------------------------------------

    /// Market volatility roll applied to every bot sale fraction.
    pub(crate) fn roll_volatility(&self) -> f64 {
        let mut rng = self.rng.lock().expect("rng poisoned");
        rng.gen_range(self.econ.volatility_min..=self.econ.volatility_max)
    }

    /// Coin flip behind the single-unit rescue sale.
    pub(crate) fn roll_rescue(&self) -> bool {
        let mut rng = self.rng.lock().expect("rng poisoned");
        rng.gen_bool(0.5)
    }

    // ------------------------------------------------------------------
    // World seeding
    // ------------------------------------------------------------------

    /// Create the system vendor account and its baseline listings. Runs once
    /// per store; subsequent calls are no-ops.
    pub fn seed_system_market(&self) -> Result<usize, MarketError> {
        if self.store.account_exists(&self.system_account)? {
            return Ok(0);
        }

        let mut account = AccountRecord::new(&self.system_account, SYSTEM_STARTING_BALANCE);
        account.level = LEVEL_CAP;
        self.store.put_account(account)?;

        let mut seeded = 0usize;
        for (name, unit, tier) in SEED_GOODS {
            // Stock is escrowed into the listing up front, so the backing
            // item starts empty.
            let item = ItemRecord::new(*name, *unit, *tier, 0, SEED_QUALITY, &self.system_account);
            let listing = ListingRecord::new(
                &self.system_account,
                &item,
                SEED_LISTING_QUANTITY,
                pricing::base_price(name),
            );
            self.store.put_item(item)?;
            self.store.put_listing(listing)?;
            seeded += 1;
        }
        Ok(seeded)
    }
}
