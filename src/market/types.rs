use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ACCOUNT_SCHEMA_VERSION: u8 = 1;
pub const ITEM_SCHEMA_VERSION: u8 = 1;
pub const LISTING_SCHEMA_VERSION: u8 = 1;
pub const TRANSACTION_SCHEMA_VERSION: u8 = 1;
pub const SHOP_SCHEMA_VERSION: u8 = 1;

/// Hard cap on account level, matching the progression curve.
pub const LEVEL_CAP: u32 = 100;

/// Monetary amount in minor units (two implied decimal places).
///
/// All balances, prices and earnings are carried as integer hundredths so
/// arithmetic stays exact; rounding only happens at the f64 boundary when a
/// price multiplier is applied.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Credits(i64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    /// Build from whole credits (e.g. `from_whole(10)` is `10.00`).
    pub const fn from_whole(whole: i64) -> Self {
        Credits(whole * 100)
    }

    /// Build from raw minor units (hundredths).
    pub const fn from_minor(minor: i64) -> Self {
        Credits(minor)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(&self, other: Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Credits)
    }

    pub fn checked_sub(&self, other: Credits) -> Option<Credits> {
        self.0.checked_sub(other.0).map(Credits)
    }

    pub fn can_afford(&self, cost: &Credits) -> bool {
        self.0 >= cost.0
    }

    /// Multiply a unit price by a quantity.
    pub fn times(&self, quantity: u32) -> Credits {
        Credits(self.0 * quantity as i64)
    }

    /// Apply an f64 multiplier, rounding half-up to the nearest minor unit.
    pub fn scale(&self, factor: f64) -> Credits {
        Credits((self.0 as f64 * factor).round() as i64)
    }

    /// Ratio of this amount to another, for price-competitiveness scoring.
    pub fn ratio_to(&self, other: &Credits) -> f64 {
        self.0 as f64 / other.0 as f64
    }
}

impl std::fmt::Display for Credits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / 100;
        let frac = (self.0 % 100).abs();
        write!(f, "{}.{:02}", whole, frac)
    }
}

/// Coarse item-value class scaling demand sensitivity in bot sales.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemTier {
    Low,
    Medium,
    High,
    Scarce,
}

impl ItemTier {
    /// Demand weight used by the sale scoring formula.
    pub fn demand_weight(&self) -> f64 {
        match self {
            ItemTier::Low => 0.5,
            ItemTier::Medium => 1.0,
            ItemTier::High => 1.5,
            ItemTier::Scarce => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemUnit {
    Piece,
    Kg,
    Liter,
}

/// A batch of goods owned by a player, either in the central holdings
/// (`shop: None`) or stocked inside one of their shops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    pub id: Uuid,
    pub name: String,
    pub unit: ItemUnit,
    pub quantity: u32,
    /// Continuous 0-100 quality, two decimals, weighted-averaged on merges.
    pub quality: f64,
    pub tier: ItemTier,
    /// Owner-set sale price per unit; unpriced stock is skipped by bot sales.
    pub price: Option<Credits>,
    /// Unit cost paid when the batch was bought on the market.
    pub cost: Option<Credits>,
    pub owner: String,
    pub shop: Option<Uuid>,
    pub schema_version: u8,
}

impl ItemRecord {
    pub fn new(
        name: impl Into<String>,
        unit: ItemUnit,
        tier: ItemTier,
        quantity: u32,
        quality: f64,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            unit,
            quantity,
            quality,
            tier,
            price: None,
            cost: None,
            owner: owner.into(),
            shop: None,
            schema_version: ITEM_SCHEMA_VERSION,
        }
    }
}

/// A fixed-price, quantity-bounded offer on the shared market.
///
/// `version` is the optimistic-concurrency token: every mutation re-reads the
/// row, bumps the counter and commits with a compare-and-swap, so a racing
/// writer surfaces as a conflict instead of silently overwriting. Listings are
/// deactivated at zero quantity, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub id: Uuid,
    pub seller: String,
    /// Source item the escrowed stock came from (restored on cancel).
    pub item_id: Uuid,
    pub item_name: String,
    pub unit: ItemUnit,
    pub quality: f64,
    pub tier: ItemTier,
    /// Price per unit.
    pub price: Credits,
    pub quantity: u32,
    pub active: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl ListingRecord {
    pub fn new(seller: impl Into<String>, item: &ItemRecord, quantity: u32, price: Credits) -> Self {
        Self {
            id: Uuid::new_v4(),
            seller: seller.into(),
            item_id: item.id,
            item_name: item.name.clone(),
            unit: item.unit,
            quality: item.quality,
            tier: item.tier,
            price,
            quantity,
            active: true,
            version: 0,
            created_at: Utc::now(),
            schema_version: LISTING_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Player bought from a market listing.
    MarketBuy,
    /// The bot buyer absorbed shop stock during a sales window.
    SystemSell,
}

/// Append-only ledger entry, written exactly once per settled trade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub buyer: String,
    pub seller: String,
    pub listing: Option<Uuid>,
    /// Total settled amount, not the per-unit price.
    pub price: Credits,
    pub amount: u32,
    pub item_name: String,
    pub executed_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl TransactionRecord {
    pub fn market_buy(
        buyer: impl Into<String>,
        seller: impl Into<String>,
        listing: Uuid,
        item_name: impl Into<String>,
        amount: u32,
        total: Credits,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: TransactionKind::MarketBuy,
            buyer: buyer.into(),
            seller: seller.into(),
            listing: Some(listing),
            price: total,
            amount,
            item_name: item_name.into(),
            executed_at: Utc::now(),
            schema_version: TRANSACTION_SCHEMA_VERSION,
        }
    }

    pub fn system_sell(
        system_buyer: impl Into<String>,
        owner: impl Into<String>,
        item_name: impl Into<String>,
        amount: u32,
        total: Credits,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: TransactionKind::SystemSell,
            buyer: system_buyer.into(),
            seller: owner.into(),
            listing: None,
            price: total,
            amount,
            item_name: item_name.into(),
            executed_at: Utc::now(),
            schema_version: TRANSACTION_SCHEMA_VERSION,
        }
    }
}

/// Player account: balance plus sales progression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountRecord {
    /// Account name, also the storage key (case-insensitive).
    pub id: String,
    pub balance: Credits,
    pub level: u32,
    pub xp: u64,
    pub schema_version: u8,
}

impl AccountRecord {
    pub fn new(id: impl Into<String>, balance: Credits) -> Self {
        Self {
            id: id.into(),
            balance,
            level: 1,
            xp: 0,
            schema_version: ACCOUNT_SCHEMA_VERSION,
        }
    }

    /// XP required to advance past the given level.
    pub fn xp_for_next(level: u32) -> u64 {
        level as u64 * 1000
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShopKind {
    Shop,
    Garden,
    Farm,
    Factory,
    Mine,
}

/// A player-owned building. Only `ShopKind::Shop` buildings can run the
/// timed bot sales window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopRecord {
    pub id: Uuid,
    pub name: String,
    pub owner: String,
    pub kind: ShopKind,
    /// Total stock capacity across all stacked items.
    pub max_stock: u32,
    pub selling: bool,
    pub sales_end_at: Option<DateTime<Utc>>,
    pub last_revenue: Credits,
    pub schema_version: u8,
}

impl ShopRecord {
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        kind: ShopKind,
        max_stock: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner: owner.into(),
            kind,
            max_stock,
            selling: false,
            sales_end_at: None,
            last_revenue: Credits::ZERO,
            schema_version: SHOP_SCHEMA_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credits_display_and_arithmetic() {
        let price = Credits::from_whole(12).checked_add(Credits::from_minor(34)).unwrap();
        assert_eq!(price.to_string(), "12.34");
        assert_eq!(price.times(3).minor(), 3702);

        let balance = Credits::from_whole(100);
        assert!(balance.can_afford(&price));
        assert!(!price.can_afford(&balance));
    }

    #[test]
    fn credits_scale_rounds_half_up() {
        // 10.00 * 0.125 = 1.25 exactly
        assert_eq!(Credits::from_whole(10).scale(0.125).minor(), 125);
        // 1.11 * 2.5 = 2.775 -> midpoint rounds up to 2.78
        assert_eq!(Credits::from_minor(111).scale(2.5).minor(), 278);
    }

    #[test]
    fn tier_demand_weights() {
        assert_eq!(ItemTier::Low.demand_weight(), 0.5);
        assert_eq!(ItemTier::Scarce.demand_weight(), 2.0);
    }

    #[test]
    fn listing_captures_item_snapshot() {
        let item = ItemRecord::new("Cheese", ItemUnit::Kg, ItemTier::Medium, 40, 72.5, "mira");
        let listing = ListingRecord::new("mira", &item, 10, Credits::from_whole(20));
        assert_eq!(listing.item_id, item.id);
        assert_eq!(listing.item_name, "Cheese");
        assert_eq!(listing.quality, 72.5);
        assert_eq!(listing.version, 0);
        assert!(listing.active);
    }
}
