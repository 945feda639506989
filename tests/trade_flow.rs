//! Scenario tests for the market buy path.

use std::sync::Arc;

use tempfile::tempdir;
use tradehall::config::EconomyConfig;
use tradehall::market::{
    AccountRecord, Credits, ItemRecord, ItemTier, ItemUnit, MarketEngine, MarketError,
    MarketStore, TransactionKind,
};
use uuid::Uuid;

fn setup() -> (MarketEngine, Arc<MarketStore>, tempfile::TempDir) {
    let tmp = tempdir().unwrap();
    let store = Arc::new(MarketStore::open(tmp.path()).unwrap());
    let engine =
        MarketEngine::new(store.clone(), EconomyConfig::default(), "exchange").with_rng_seed(99);
    (engine, store, tmp)
}

fn give_account(store: &MarketStore, name: &str, balance: i64) {
    store
        .put_account(AccountRecord::new(name, Credits::from_whole(balance)))
        .unwrap();
}

fn give_item(store: &MarketStore, owner: &str, name: &str, quantity: u32, quality: f64) -> Uuid {
    let item = ItemRecord::new(name, ItemUnit::Kg, ItemTier::Medium, quantity, quality, owner);
    let id = item.id;
    store.put_item(item).unwrap();
    id
}

#[test]
fn full_buyout_settles_money_stock_and_ledger() {
    let (engine, store, _tmp) = setup();
    give_account(&store, "mira", 0);
    give_account(&store, "ada", 100);
    let item_id = give_item(&store, "mira", "Cheese", 10, 80.0);

    let listing = engine
        .list_item("mira", item_id, 10, Credits::from_whole(5))
        .unwrap();

    let txn = engine.buy_item("ada", listing.id, 10).unwrap();

    // Buyer paid exactly price * quantity, seller received exactly the same.
    assert_eq!(
        store.get_account("ada").unwrap().balance,
        Credits::from_whole(50)
    );
    assert_eq!(
        store.get_account("mira").unwrap().balance,
        Credits::from_whole(50)
    );

    // Sold out: deactivated, never deleted.
    let closed = store.load_listing(listing.id).unwrap().record;
    assert_eq!(closed.quantity, 0);
    assert!(!closed.active);
    assert_eq!(closed.version, 1);

    // One MARKET_BUY ledger entry for the full amount.
    assert_eq!(txn.kind, TransactionKind::MarketBuy);
    assert_eq!(txn.amount, 10);
    assert_eq!(txn.price, Credits::from_whole(50));
    assert_eq!(txn.item_name, "Cheese");

    // Purchased stock landed in the buyer's central holdings with the
    // listing's quality and cost.
    let holding = store.find_holding("ada", "Cheese").unwrap().unwrap();
    assert_eq!(holding.quantity, 10);
    assert_eq!(holding.quality, 80.0);
    assert_eq!(holding.cost, Some(Credits::from_whole(5)));
    assert!(holding.shop.is_none());

    // A sold-out listing can no longer be bought from.
    give_account(&store, "bo", 100);
    let err = engine.buy_item("bo", listing.id, 1).unwrap_err();
    assert!(matches!(err, MarketError::BusinessRule(_)));
}

#[test]
fn self_purchase_is_rejected_without_state_change() {
    let (engine, store, _tmp) = setup();
    give_account(&store, "mira", 100);
    let item_id = give_item(&store, "mira", "Iron", 8, 60.0);
    let listing = engine
        .list_item("mira", item_id, 8, Credits::from_whole(4))
        .unwrap();

    let err = engine.buy_item("mira", listing.id, 2).unwrap_err();
    assert!(matches!(err, MarketError::BusinessRule(_)));

    assert_eq!(
        store.get_account("mira").unwrap().balance,
        Credits::from_whole(100)
    );
    let unchanged = store.load_listing(listing.id).unwrap().record;
    assert_eq!(unchanged.quantity, 8);
    assert!(unchanged.active);
    assert_eq!(unchanged.version, 0);
}

#[test]
fn insufficient_balance_leaves_listing_untouched() {
    let (engine, store, _tmp) = setup();
    give_account(&store, "mira", 0);
    give_account(&store, "ada", 10);
    let item_id = give_item(&store, "mira", "Gold", 5, 90.0);
    let listing = engine
        .list_item("mira", item_id, 5, Credits::from_whole(400))
        .unwrap();

    let err = engine.buy_item("ada", listing.id, 3).unwrap_err();
    assert!(matches!(err, MarketError::InsufficientBalance { .. }));

    assert_eq!(
        store.get_account("ada").unwrap().balance,
        Credits::from_whole(10)
    );
    assert_eq!(store.load_listing(listing.id).unwrap().record.quantity, 5);
}

#[test]
fn oversized_request_and_missing_listing_are_rejected() {
    let (engine, store, _tmp) = setup();
    give_account(&store, "mira", 0);
    give_account(&store, "ada", 1000);
    let item_id = give_item(&store, "mira", "Coal", 5, 40.0);
    let listing = engine
        .list_item("mira", item_id, 5, Credits::from_whole(2))
        .unwrap();

    let err = engine.buy_item("ada", listing.id, 6).unwrap_err();
    assert!(matches!(err, MarketError::BusinessRule(_)));

    let err = engine.buy_item("ada", listing.id, 0).unwrap_err();
    assert!(matches!(err, MarketError::BusinessRule(_)));

    let err = engine.buy_item("ada", Uuid::new_v4(), 1).unwrap_err();
    assert!(matches!(err, MarketError::NotFound(_)));
}

#[test]
fn system_vendor_listings_never_run_dry() {
    let (engine, store, _tmp) = setup();
    engine.seed_system_market().unwrap();
    give_account(&store, "ada", 10_000);

    let bread = store
        .all_listings()
        .unwrap()
        .into_iter()
        .find(|l| l.item_name == "Bread" && l.seller == "exchange")
        .unwrap();
    let before = store.get_account("exchange").unwrap().balance;

    engine.buy_item("ada", bread.id, 50).unwrap();

    // Stock and version untouched: the vendor sells from bottomless supply.
    let after = store.load_listing(bread.id).unwrap().record;
    assert_eq!(after.quantity, bread.quantity);
    assert!(after.active);
    assert_eq!(after.version, bread.version);

    // Money still moves normally.
    let total = bread.price.times(50);
    assert_eq!(
        store.get_account("ada").unwrap().balance,
        Credits::from_whole(10_000).checked_sub(total).unwrap()
    );
    assert_eq!(
        store.get_account("exchange").unwrap().balance,
        before.checked_add(total).unwrap()
    );

    let holding = store.find_holding("ada", "Bread").unwrap().unwrap();
    assert_eq!(holding.quantity, 50);
}

#[test]
fn repeat_purchases_merge_quality_into_one_holding() {
    let (engine, store, _tmp) = setup();
    give_account(&store, "mira", 0);
    give_account(&store, "vern", 0);
    give_account(&store, "ada", 10_000);

    let fine = give_item(&store, "mira", "Wool", 10, 90.0);
    let rough = give_item(&store, "vern", "Wool", 10, 50.0);
    let fine_listing = engine
        .list_item("mira", fine, 10, Credits::from_whole(3))
        .unwrap();
    let rough_listing = engine
        .list_item("vern", rough, 10, Credits::from_whole(2))
        .unwrap();

    engine.buy_item("ada", fine_listing.id, 10).unwrap();
    engine.buy_item("ada", rough_listing.id, 10).unwrap();

    let holding = store.find_holding("ada", "Wool").unwrap().unwrap();
    assert_eq!(holding.quantity, 20);
    // (10*90 + 10*50) / 20 = 70.00
    assert_eq!(holding.quality, 70.0);
}
