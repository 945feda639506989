use std::path::Path;

use chrono::{DateTime, Utc};
use sled::IVec;
use uuid::Uuid;

use crate::market::errors::MarketError;
use crate::market::types::{
    AccountRecord, ItemRecord, ListingRecord, ShopRecord, TransactionRecord, ACCOUNT_SCHEMA_VERSION,
    ITEM_SCHEMA_VERSION, LEVEL_CAP, LISTING_SCHEMA_VERSION, SHOP_SCHEMA_VERSION,
    TRANSACTION_SCHEMA_VERSION,
};
use crate::market::types::Credits;

const TREE_ACCOUNTS: &str = "market_accounts";
const TREE_ITEMS: &str = "market_items";
const TREE_LISTINGS: &str = "market_listings";
const TREE_LEDGER: &str = "market_ledger";
const TREE_SHOPS: &str = "market_shops";

/// A listing read paired with the raw bytes it was decoded from.
///
/// The raw bytes are the compare half of the optimistic commit: a concurrent
/// writer changes them, and the subsequent compare-and-swap reports a
/// conflict instead of clobbering the newer row.
pub struct ListingSnapshot {
    pub record: ListingRecord,
    raw: IVec,
}

/// Sled-backed persistence for accounts, holdings, listings, the transaction
/// ledger and shops. One tree per entity family.
pub struct MarketStore {
    _db: sled::Db,
    accounts: sled::Tree,
    items: sled::Tree,
    listings: sled::Tree,
    ledger: sled::Tree,
    shops: sled::Tree,
}

impl MarketStore {
    /// Open (or create) the market store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MarketError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let accounts = db.open_tree(TREE_ACCOUNTS)?;
        let items = db.open_tree(TREE_ITEMS)?;
        let listings = db.open_tree(TREE_LISTINGS)?;
        let ledger = db.open_tree(TREE_LEDGER)?;
        let shops = db.open_tree(TREE_SHOPS)?;
        Ok(Self {
            _db: db,
            accounts,
            items,
            listings,
            ledger,
            shops,
        })
    }

    fn account_key(id: &str) -> Vec<u8> {
        format!("accounts:{}", id.to_ascii_lowercase()).into_bytes()
    }

    fn item_key(id: Uuid) -> Vec<u8> {
        format!("items:{}", id).into_bytes()
    }

    fn listing_key(id: Uuid) -> Vec<u8> {
        format!("listings:{}", id).into_bytes()
    }

    fn shop_key(id: Uuid) -> Vec<u8> {
        format!("shops:{}", id).into_bytes()
    }

    /// Ledger keys sort by execution time so a trailing-window demand scan is
    /// a single range walk.
    fn ledger_key(record: &TransactionRecord) -> Vec<u8> {
        format!(
            "txns:{:020}:{}",
            record.executed_at.timestamp_millis(),
            record.id
        )
        .into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, MarketError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &IVec) -> Result<T, MarketError> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Insert or update an account record.
    pub fn put_account(&self, mut account: AccountRecord) -> Result<(), MarketError> {
        account.schema_version = ACCOUNT_SCHEMA_VERSION;
        let key = Self::account_key(&account.id);
        let bytes = Self::serialize(&account)?;
        self.accounts.insert(key, bytes)?;
        self.accounts.flush()?;
        Ok(())
    }

    pub fn get_account(&self, id: &str) -> Result<AccountRecord, MarketError> {
        let key = Self::account_key(id);
        let Some(bytes) = self.accounts.get(&key)? else {
            return Err(MarketError::NotFound(format!("account: {}", id)));
        };
        let record: AccountRecord = Self::deserialize(&bytes)?;
        if record.schema_version != ACCOUNT_SCHEMA_VERSION {
            return Err(MarketError::SchemaMismatch {
                entity: "account",
                expected: ACCOUNT_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    pub fn account_exists(&self, id: &str) -> Result<bool, MarketError> {
        Ok(self.accounts.contains_key(Self::account_key(id))?)
    }

    /// Atomically debit an account, failing when the balance cannot cover
    /// the amount. The sufficiency check and the write sit inside one
    /// compare-and-swap loop so racing debits cannot drive a balance
    /// negative.
    pub fn debit_account(&self, id: &str, amount: Credits) -> Result<AccountRecord, MarketError> {
        let key = Self::account_key(id);
        loop {
            let Some(raw) = self.accounts.get(&key)? else {
                return Err(MarketError::NotFound(format!("account: {}", id)));
            };
            let account: AccountRecord = Self::deserialize(&raw)?;
            if !account.balance.can_afford(&amount) {
                return Err(MarketError::InsufficientBalance { needed: amount });
            }
            let mut updated = account;
            updated.balance = updated
                .balance
                .checked_sub(amount)
                .ok_or_else(|| MarketError::Internal("balance underflow".to_string()))?;
            let bytes = Self::serialize(&updated)?;
            if self
                .accounts
                .compare_and_swap(&key, Some(raw), Some(bytes))?
                .is_ok()
            {
                self.accounts.flush()?;
                return Ok(updated);
            }
        }
    }

    /// Atomically credit an account.
    pub fn credit_account(&self, id: &str, amount: Credits) -> Result<AccountRecord, MarketError> {
        let key = Self::account_key(id);
        loop {
            let Some(raw) = self.accounts.get(&key)? else {
                return Err(MarketError::NotFound(format!("account: {}", id)));
            };
            let account: AccountRecord = Self::deserialize(&raw)?;
            let mut updated = account;
            updated.balance = updated
                .balance
                .checked_add(amount)
                .ok_or_else(|| MarketError::Internal("balance overflow".to_string()))?;
            let bytes = Self::serialize(&updated)?;
            if self
                .accounts
                .compare_and_swap(&key, Some(raw), Some(bytes))?
                .is_ok()
            {
                self.accounts.flush()?;
                return Ok(updated);
            }
        }
    }

    /// Grant XP and apply a single level-up step when the threshold is
    /// crossed. Returns the new level when one was reached.
    pub fn grant_xp(&self, id: &str, amount: u64) -> Result<Option<u32>, MarketError> {
        let key = Self::account_key(id);
        loop {
            let Some(raw) = self.accounts.get(&key)? else {
                return Err(MarketError::NotFound(format!("account: {}", id)));
            };
            let account: AccountRecord = Self::deserialize(&raw)?;
            let mut updated = account;
            updated.xp = updated.xp.saturating_add(amount);
            let mut leveled = None;
            if updated.level < LEVEL_CAP && updated.xp >= AccountRecord::xp_for_next(updated.level)
            {
                updated.level += 1;
                leveled = Some(updated.level);
            }
            let bytes = Self::serialize(&updated)?;
            if self
                .accounts
                .compare_and_swap(&key, Some(raw), Some(bytes))?
                .is_ok()
            {
                self.accounts.flush()?;
                return Ok(leveled);
            }
        }
    }

    pub fn list_account_ids(&self) -> Result<Vec<String>, MarketError> {
        let mut ids = Vec::new();
        for entry in self.accounts.scan_prefix(b"accounts:") {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(id) = text.strip_prefix("accounts:") {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Items (holdings and shop stock)
    // ------------------------------------------------------------------

    /// Insert or update an item record.
    pub fn put_item(&self, mut item: ItemRecord) -> Result<(), MarketError> {
        item.schema_version = ITEM_SCHEMA_VERSION;
        let key = Self::item_key(item.id);
        let bytes = Self::serialize(&item)?;
        self.items.insert(key, bytes)?;
        self.items.flush()?;
        Ok(())
    }

    pub fn get_item(&self, id: Uuid) -> Result<ItemRecord, MarketError> {
        let key = Self::item_key(id);
        let Some(bytes) = self.items.get(&key)? else {
            return Err(MarketError::NotFound(format!("item: {}", id)));
        };
        let record: ItemRecord = Self::deserialize(&bytes)?;
        if record.schema_version != ITEM_SCHEMA_VERSION {
            return Err(MarketError::SchemaMismatch {
                entity: "item",
                expected: ITEM_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    pub fn delete_item(&self, id: Uuid) -> Result<(), MarketError> {
        self.items.remove(Self::item_key(id))?;
        self.items.flush()?;
        Ok(())
    }

    /// Find the owner's central holding (not assigned to a shop) for an item
    /// name, if one exists.
    pub fn find_holding(&self, owner: &str, name: &str) -> Result<Option<ItemRecord>, MarketError> {
        for entry in self.items.iter() {
            let (_, bytes) = entry?;
            let record: ItemRecord = Self::deserialize(&bytes)?;
            if record.shop.is_none()
                && record.owner.eq_ignore_ascii_case(owner)
                && record.name == name
            {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// All items stocked inside one shop.
    pub fn items_in_shop(&self, shop: Uuid) -> Result<Vec<ItemRecord>, MarketError> {
        let mut out = Vec::new();
        for entry in self.items.iter() {
            let (_, bytes) = entry?;
            let record: ItemRecord = Self::deserialize(&bytes)?;
            if record.shop == Some(shop) {
                out.push(record);
            }
        }
        Ok(out)
    }

    pub fn items_for_owner(&self, owner: &str) -> Result<Vec<ItemRecord>, MarketError> {
        let mut out = Vec::new();
        for entry in self.items.iter() {
            let (_, bytes) = entry?;
            let record: ItemRecord = Self::deserialize(&bytes)?;
            if record.owner.eq_ignore_ascii_case(owner) {
                out.push(record);
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// Insert a freshly created listing. Mutations of existing rows must go
    /// through [`MarketStore::commit_listing`].
    pub fn put_listing(&self, mut listing: ListingRecord) -> Result<(), MarketError> {
        listing.schema_version = LISTING_SCHEMA_VERSION;
        let key = Self::listing_key(listing.id);
        let bytes = Self::serialize(&listing)?;
        self.listings.insert(key, bytes)?;
        self.listings.flush()?;
        Ok(())
    }

    /// Read a listing together with the bytes backing it, for a later
    /// versioned commit.
    pub fn load_listing(&self, id: Uuid) -> Result<ListingSnapshot, MarketError> {
        let key = Self::listing_key(id);
        let Some(bytes) = self.listings.get(&key)? else {
            return Err(MarketError::NotFound(format!("listing: {}", id)));
        };
        let record: ListingRecord = Self::deserialize(&bytes)?;
        if record.schema_version != LISTING_SCHEMA_VERSION {
            return Err(MarketError::SchemaMismatch {
                entity: "listing",
                expected: LISTING_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(ListingSnapshot {
            record,
            raw: bytes,
        })
    }

    /// Commit a mutation of a previously loaded listing. The row version is
    /// advanced and the write only lands if nobody else has written since
    /// the snapshot was taken; otherwise [`MarketError::Conflict`] is
    /// returned and the caller must re-read and retry.
    pub fn commit_listing(
        &self,
        snapshot: &ListingSnapshot,
        mut updated: ListingRecord,
    ) -> Result<ListingRecord, MarketError> {
        updated.version = snapshot.record.version + 1;
        updated.schema_version = LISTING_SCHEMA_VERSION;
        let key = Self::listing_key(updated.id);
        let bytes = Self::serialize(&updated)?;
        match self
            .listings
            .compare_and_swap(key, Some(snapshot.raw.clone()), Some(bytes))?
        {
            Ok(()) => {
                self.listings.flush()?;
                Ok(updated)
            }
            Err(_) => Err(MarketError::Conflict),
        }
    }

    /// All listings, active or not.
    pub fn all_listings(&self) -> Result<Vec<ListingRecord>, MarketError> {
        let mut out = Vec::new();
        for entry in self.listings.iter() {
            let (_, bytes) = entry?;
            out.push(Self::deserialize(&bytes)?);
        }
        Ok(out)
    }

    /// Find an active listing by the same seller, item name, unit price and
    /// exact quality (the merge target for repeat listings).
    pub fn find_open_listing(
        &self,
        seller: &str,
        item_name: &str,
        price: Credits,
        quality: f64,
    ) -> Result<Option<ListingSnapshot>, MarketError> {
        for entry in self.listings.iter() {
            let (_, bytes) = entry?;
            let record: ListingRecord = Self::deserialize(&bytes)?;
            if record.active
                && record.seller.eq_ignore_ascii_case(seller)
                && record.item_name == item_name
                && record.price == price
                && record.quality == quality
            {
                return Ok(Some(ListingSnapshot {
                    record,
                    raw: bytes,
                }));
            }
        }
        Ok(None)
    }

    /// Sum of quantities across all currently active listings for a name.
    pub fn active_supply(&self, item_name: &str) -> Result<u64, MarketError> {
        let mut total = 0u64;
        for entry in self.listings.iter() {
            let (_, bytes) = entry?;
            let record: ListingRecord = Self::deserialize(&bytes)?;
            if record.active && record.item_name == item_name {
                total += record.quantity as u64;
            }
        }
        Ok(total)
    }

    // ------------------------------------------------------------------
    // Transaction ledger
    // ------------------------------------------------------------------

    /// Append a settled transaction. Ledger entries are written once and
    /// never mutated.
    pub fn append_transaction(&self, mut record: TransactionRecord) -> Result<(), MarketError> {
        record.schema_version = TRANSACTION_SCHEMA_VERSION;
        let key = Self::ledger_key(&record);
        let bytes = Self::serialize(&record)?;
        self.ledger.insert(key, bytes)?;
        self.ledger.flush()?;
        Ok(())
    }

    /// Sum of transacted amounts for an item name since the cutoff.
    pub fn demand_since(
        &self,
        item_name: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, MarketError> {
        let start = format!("txns:{:020}", cutoff.timestamp_millis()).into_bytes();
        let mut total = 0u64;
        for entry in self.ledger.range(start..) {
            let (_, bytes) = entry?;
            let record: TransactionRecord = Self::deserialize(&bytes)?;
            if record.item_name == item_name {
                total += record.amount as u64;
            }
        }
        Ok(total)
    }

    /// All ledger entries since the cutoff, oldest first.
    pub fn transactions_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TransactionRecord>, MarketError> {
        let start = format!("txns:{:020}", cutoff.timestamp_millis()).into_bytes();
        let mut out = Vec::new();
        for entry in self.ledger.range(start..) {
            let (_, bytes) = entry?;
            out.push(Self::deserialize(&bytes)?);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Shops
    // ------------------------------------------------------------------

    /// Insert or update a shop record.
    pub fn put_shop(&self, mut shop: ShopRecord) -> Result<(), MarketError> {
        shop.schema_version = SHOP_SCHEMA_VERSION;
        let key = Self::shop_key(shop.id);
        let bytes = Self::serialize(&shop)?;
        self.shops.insert(key, bytes)?;
        self.shops.flush()?;
        Ok(())
    }

    pub fn get_shop(&self, id: Uuid) -> Result<ShopRecord, MarketError> {
        let key = Self::shop_key(id);
        let Some(bytes) = self.shops.get(&key)? else {
            return Err(MarketError::NotFound(format!("shop: {}", id)));
        };
        let record: ShopRecord = Self::deserialize(&bytes)?;
        if record.schema_version != SHOP_SCHEMA_VERSION {
            return Err(MarketError::SchemaMismatch {
                entity: "shop",
                expected: SHOP_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    /// Shops whose sales window has elapsed as of `now`.
    pub fn shops_due(&self, now: DateTime<Utc>) -> Result<Vec<ShopRecord>, MarketError> {
        let mut due = Vec::new();
        for entry in self.shops.iter() {
            let (_, bytes) = entry?;
            let record: ShopRecord = Self::deserialize(&bytes)?;
            if record.selling && record.sales_end_at.is_some_and(|end| end <= now) {
                due.push(record);
            }
        }
        Ok(due)
    }

    pub fn list_shops(&self) -> Result<Vec<ShopRecord>, MarketError> {
        let mut out = Vec::new();
        for entry in self.shops.iter() {
            let (_, bytes) = entry?;
            out.push(Self::deserialize(&bytes)?);
        }
        Ok(out)
    }
}
