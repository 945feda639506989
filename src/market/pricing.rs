//! Dynamic reference pricing.
//!
//! The reference price for a good is its static base price scaled by a
//! bounded demand/supply multiplier. It is advisory: trades settle at the
//! listed price, and the reference only feeds the bot simulator's
//! price-competitiveness factor, so brief staleness in the memo layer is
//! harmless.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Duration, Utc};

use crate::config::EconomyConfig;
use crate::market::errors::MarketError;
use crate::market::storage::MarketStore;
use crate::market::types::Credits;

/// Trailing window over the transaction ledger used for demand volume.
pub const DEMAND_WINDOW_HOURS: i64 = 24;

/// Fallback base price for goods missing from the table.
pub const DEFAULT_BASE_PRICE: Credits = Credits::from_whole(10);

/// Static base prices in whole credits, the anchor the dynamic multiplier
/// swings around.
const BASE_PRICES: &[(&str, i64)] = &[
    // Produce
    ("Apple", 8),
    ("Carrot", 5),
    ("Cherry", 15),
    ("Cucumber", 6),
    ("Lemon", 8),
    ("Olive", 12),
    ("Onion", 5),
    ("Orange", 9),
    ("Peach", 10),
    ("Pear", 8),
    ("Pepper", 7),
    ("Potato", 5),
    ("Strawberry", 12),
    ("Tomato", 6),
    // Farm goods
    ("Barley", 5),
    ("Corn", 6),
    ("Cotton", 10),
    ("Egg", 5),
    ("Leather", 25),
    ("Milk", 15),
    ("Wheat", 5),
    ("Wool", 20),
    // Mined resources
    ("Coal", 10),
    ("Copper", 25),
    ("Gold", 500),
    ("Iron", 20),
    ("Oil", 50),
    ("Salt", 5),
    ("Silver", 100),
    ("Stone", 2),
    // Processed goods
    ("Beer", 35),
    ("Bread", 5),
    ("Cheese", 20),
    ("Chocolate", 50),
    ("Cloth", 40),
    ("Clothes", 80),
    ("Flour", 10),
    ("Jacket", 150),
    ("Juice", 5),
    ("Plastic", 10),
    ("Pottery", 20),
    ("Salami", 20),
    ("Sausage", 25),
    ("Shoes", 120),
    ("Soap", 15),
    ("Steel", 80),
    ("Tools", 150),
    ("Water", 2),
    ("Yogurt", 5),
    // Jewelry
    ("Bracelet", 750),
    ("Earring", 500),
    ("Necklace", 1500),
    ("Ring", 900),
];

/// Static base price for a good, falling back to the default for unknown
/// names.
pub fn base_price(item_name: &str) -> Credits {
    BASE_PRICES
        .iter()
        .find(|(name, _)| *name == item_name)
        .map(|(_, whole)| Credits::from_whole(*whole))
        .unwrap_or(DEFAULT_BASE_PRICE)
}

/// Compute the current reference price for a good.
///
/// `supply` is the total quantity across active listings (clamped to 1 so a
/// bare market cannot blow up the ratio), `demand` the transacted volume over
/// the trailing window plus a fixed buffer that keeps cold goods from
/// collapsing to the floor. The demand/supply ratio is clamped into the
/// configured band before scaling the base price.
pub fn compute_market_price(
    store: &MarketStore,
    econ: &EconomyConfig,
    item_name: &str,
) -> Result<Credits, MarketError> {
    let base = base_price(item_name);

    let active_supply = store.active_supply(item_name)?;
    let cutoff = Utc::now() - Duration::hours(DEMAND_WINDOW_HOURS);
    let demand_volume = store.demand_since(item_name, cutoff)?;

    let effective_demand = demand_volume as f64 + econ.demand_buffer as f64;
    let effective_supply = if active_supply == 0 {
        1.0
    } else {
        active_supply as f64
    };

    let ratio = effective_demand / effective_supply;
    let multiplier = ratio.clamp(econ.price_floor, econ.price_ceiling);

    Ok(base.scale(multiplier))
}

/// Memoized reference prices keyed by item name.
///
/// Writers that touch a good (listing created or cancelled, purchase, bot
/// sale) must invalidate its entry; readers recompute lazily on the next
/// lookup.
#[derive(Default)]
pub struct PriceBoard {
    cache: Mutex<HashMap<String, Credits>>,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item_name: &str) -> Option<Credits> {
        self.cache.lock().expect("price cache poisoned").get(item_name).copied()
    }

    pub fn put(&self, item_name: &str, price: Credits) {
        self.cache
            .lock()
            .expect("price cache poisoned")
            .insert(item_name.to_string(), price);
    }

    pub fn invalidate(&self, item_name: &str) {
        self.cache.lock().expect("price cache poisoned").remove(item_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::{ItemRecord, ItemTier, ItemUnit, ListingRecord, TransactionRecord};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn seed_listing(store: &MarketStore, name: &str, quantity: u32) {
        let item = ItemRecord::new(name, ItemUnit::Kg, ItemTier::Medium, quantity, 50.0, "mira");
        let listing = ListingRecord::new("mira", &item, quantity, Credits::from_whole(10));
        store.put_listing(listing).unwrap();
    }

    fn seed_demand(store: &MarketStore, name: &str, amount: u32) {
        let txn = TransactionRecord::market_buy(
            "ada",
            "mira",
            Uuid::new_v4(),
            name,
            amount,
            Credits::from_whole(10).times(amount),
        );
        store.append_transaction(txn).unwrap();
    }

    #[test]
    fn hot_item_clamps_to_ceiling() {
        let tmp = tempdir().unwrap();
        let store = MarketStore::open(tmp.path()).unwrap();
        let econ = EconomyConfig::default();

        // Base 10, supply 5, demand 95 + 10 buffer = 105 -> ratio 21, clamped
        // to 3.0 -> 30.00.
        seed_listing(&store, "Flour", 5);
        seed_demand(&store, "Flour", 95);

        let price = compute_market_price(&store, &econ, "Flour").unwrap();
        assert_eq!(price, Credits::from_whole(30));
    }

    #[test]
    fn glutted_item_clamps_to_floor() {
        let tmp = tempdir().unwrap();
        let store = MarketStore::open(tmp.path()).unwrap();
        let econ = EconomyConfig::default();

        // No demand beyond the buffer, huge supply -> ratio far below the
        // floor, price pinned at half the base.
        seed_listing(&store, "Cheese", 10_000);

        let price = compute_market_price(&store, &econ, "Cheese").unwrap();
        assert_eq!(price, Credits::from_whole(10));
    }

    #[test]
    fn empty_market_uses_buffer_over_unit_supply() {
        let tmp = tempdir().unwrap();
        let store = MarketStore::open(tmp.path()).unwrap();
        let econ = EconomyConfig::default();

        // Supply clamps to 1, demand is the bare buffer (10) -> ratio 10,
        // clamped to the ceiling.
        let price = compute_market_price(&store, &econ, "Gold").unwrap();
        assert_eq!(price, Credits::from_whole(1500));
    }

    #[test]
    fn unknown_goods_fall_back_to_default_base() {
        assert_eq!(base_price("Moon Rock"), DEFAULT_BASE_PRICE);
        assert_eq!(base_price("Gold"), Credits::from_whole(500));
    }

    #[test]
    fn price_board_invalidation() {
        let board = PriceBoard::new();
        assert_eq!(board.get("Flour"), None);
        board.put("Flour", Credits::from_whole(12));
        assert_eq!(board.get("Flour"), Some(Credits::from_whole(12)));
        board.invalidate("Flour");
        assert_eq!(board.get("Flour"), None);
    }
}
