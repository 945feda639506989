//! Stacking and quality bookkeeping for item batches.
//!
//! Identical goods merge into one stack whose quality is the
//! quantity-weighted average of its parts, rounded to two decimals.
//! Incremental merges converge to the same result as one bulk merge within
//! rounding tolerance.

use crate::market::engine::MarketEngine;
use crate::market::errors::MarketError;
use crate::market::storage::MarketStore;
use crate::market::types::{ItemRecord, ListingRecord};
use uuid::Uuid;

/// Round to two decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Merge an incoming batch into an existing stack, returning the combined
/// quantity and the weighted-average quality.
pub fn merge_quality(
    existing_qty: u32,
    existing_quality: f64,
    add_qty: u32,
    add_quality: f64,
) -> (u32, f64) {
    let new_qty = existing_qty + add_qty;
    if new_qty == 0 {
        return (0, round2(existing_quality));
    }
    let weighted = existing_qty as f64 * existing_quality + add_qty as f64 * add_quality;
    (new_qty, round2(weighted / new_qty as f64))
}

/// Fold purchased stock into the buyer's central holding of the same name,
/// creating the record if this is their first batch of the good. The unit
/// cost of a fresh holding is what the buyer just paid.
pub(crate) fn credit_holding(
    store: &MarketStore,
    buyer: &str,
    listing: &ListingRecord,
    quantity: u32,
) -> Result<ItemRecord, MarketError> {
    if let Some(mut holding) = store.find_holding(buyer, &listing.item_name)? {
        let (qty, quality) =
            merge_quality(holding.quantity, holding.quality, quantity, listing.quality);
        holding.quantity = qty;
        holding.quality = quality;
        store.put_item(holding.clone())?;
        Ok(holding)
    } else {
        let mut holding = ItemRecord::new(
            listing.item_name.clone(),
            listing.unit,
            listing.tier,
            quantity,
            listing.quality,
            buyer,
        );
        holding.cost = Some(listing.price);
        store.put_item(holding.clone())?;
        Ok(holding)
    }
}

impl MarketEngine {
    /// Move stock from the owner's central holdings into one of their shops,
    /// stacking onto an existing same-name, same-quality batch when present.
    pub fn transfer_to_shop(
        &self,
        owner: &str,
        item_id: Uuid,
        shop_id: Uuid,
        quantity: u32,
    ) -> Result<ItemRecord, MarketError> {
        let item = self.store().get_item(item_id)?;
        if !item.owner.eq_ignore_ascii_case(owner) {
            return Err(MarketError::Unauthorized(
                "this item does not belong to you".to_string(),
            ));
        }
        if item.shop.is_some() {
            return Err(MarketError::BusinessRule(
                "item is not in central holdings".to_string(),
            ));
        }

        let shop = self.store().get_shop(shop_id)?;
        if !shop.owner.eq_ignore_ascii_case(owner) {
            return Err(MarketError::Unauthorized(
                "this shop does not belong to you".to_string(),
            ));
        }

        if quantity == 0 || quantity > item.quantity {
            return Err(MarketError::BusinessRule("invalid quantity".to_string()));
        }

        let stocked = self.store().items_in_shop(shop_id)?;
        let current_stock: u32 = stocked.iter().map(|i| i.quantity).sum();
        if current_stock + quantity > shop.max_stock {
            return Err(MarketError::BusinessRule(format!(
                "shop storage is full: capacity {}, stocked {}",
                shop.max_stock, current_stock
            )));
        }

        // Stack merges require an exact quality match; near-misses stay
        // separate batches.
        let target = stocked.into_iter().find(|stack| {
            stack.name.trim().eq_ignore_ascii_case(item.name.trim())
                && stack.quality == item.quality
        });

        if let Some(mut stack) = target {
            stack.quantity += quantity;
            self.store().put_item(stack.clone())?;
            if quantity < item.quantity {
                let mut remaining = item;
                remaining.quantity -= quantity;
                self.store().put_item(remaining)?;
            } else {
                self.store().delete_item(item.id)?;
            }
            Ok(stack)
        } else if quantity == item.quantity {
            // Whole batch moves as-is.
            let mut moved = item;
            moved.shop = Some(shop_id);
            self.store().put_item(moved.clone())?;
            Ok(moved)
        } else {
            // Split the batch: the transferred part becomes a new record in
            // the shop, the rest stays in the holdings.
            let mut moved = item.clone();
            moved.id = Uuid::new_v4();
            moved.quantity = quantity;
            moved.shop = Some(shop_id);
            self.store().put_item(moved.clone())?;

            let mut remaining = item;
            remaining.quantity -= quantity;
            self.store().put_item(remaining)?;
            Ok(moved)
        }
    }
}
