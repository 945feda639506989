//! Listing lifecycle: putting stock on the market, cancelling, browsing.
//!
//! Listing stock is escrowed: the quantity leaves the seller's item the
//! moment it is listed and only comes back on cancel. Repeat listings with
//! the same seller, name, price and identical quality merge into one row
//! instead of piling up duplicates.

use log::debug;
use uuid::Uuid;

use crate::market::engine::MarketEngine;
use crate::market::errors::MarketError;
use crate::market::events::MarketEvent;
use crate::market::types::{Credits, ItemRecord, ListingRecord};

/// One page of active listings.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub listings: Vec<ListingRecord>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

impl MarketEngine {
    /// Put a quantity of an owned item up for sale at a fixed unit price.
    pub fn list_item(
        &self,
        seller: &str,
        item_id: Uuid,
        quantity: u32,
        price: Credits,
    ) -> Result<ListingRecord, MarketError> {
        if quantity == 0 {
            return Err(MarketError::BusinessRule(
                "listing quantity must be positive".to_string(),
            ));
        }
        if !price.is_positive() {
            return Err(MarketError::BusinessRule(
                "listing price must be positive".to_string(),
            ));
        }

        let mut item = self.store().get_item(item_id)?;
        if !item.owner.eq_ignore_ascii_case(seller) {
            return Err(MarketError::Unauthorized(
                "this item does not belong to you".to_string(),
            ));
        }
        if item.quantity < quantity {
            return Err(MarketError::BusinessRule(
                "not enough stock to list".to_string(),
            ));
        }

        // Escrow the stock immediately; it returns only on cancel.
        item.quantity -= quantity;
        self.store().put_item(item.clone())?;

        let listing = match self.merge_or_create(seller, &item, quantity, price) {
            Ok(listing) => listing,
            Err(err) => {
                // Give the escrowed stock back before surfacing the failure.
                let mut restored = self.store().get_item(item_id)?;
                restored.quantity += quantity;
                self.store().put_item(restored)?;
                return Err(err);
            }
        };

        self.invalidate_price(&listing.item_name);
        self.publish(MarketEvent::Listed {
            listing: listing.id,
            item_name: listing.item_name.clone(),
            quantity: listing.quantity,
            price: listing.price,
            seller: listing.seller.clone(),
        });
        Ok(listing)
    }

    fn merge_or_create(
        &self,
        seller: &str,
        item: &ItemRecord,
        quantity: u32,
        price: Credits,
    ) -> Result<ListingRecord, MarketError> {
        let mut attempts = 0;
        let max_attempts = self.econ().buy_retry_attempts.max(1);

        loop {
            let open = self
                .store()
                .find_open_listing(seller, &item.name, price, item.quality)?;

            let Some(snapshot) = open else {
                // No mergeable row; a fresh listing starts at version 0.
                let listing = ListingRecord::new(seller, item, quantity, price);
                self.store().put_listing(listing.clone())?;
                return Ok(listing);
            };

            let mut updated = snapshot.record.clone();
            updated.quantity += quantity;
            match self.store().commit_listing(&snapshot, updated) {
                Ok(listing) => return Ok(listing),
                Err(MarketError::Conflict) => {
                    // A buyer raced us; re-scan, the row may even be sold out
                    // and inactive by now.
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(MarketError::contention());
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Take a listing off the market and return the escrowed stock to the
    /// underlying item. Only the seller may cancel.
    pub fn cancel_listing(&self, seller: &str, listing_id: Uuid) -> Result<(), MarketError> {
        let max_attempts = self.econ().buy_retry_attempts.max(1);

        for _ in 0..max_attempts {
            let snapshot = self.store().load_listing(listing_id)?;
            if !snapshot.record.seller.eq_ignore_ascii_case(seller) {
                return Err(MarketError::Unauthorized(
                    "you cannot cancel someone else's listing".to_string(),
                ));
            }
            if !snapshot.record.active {
                return Err(MarketError::BusinessRule(
                    "this listing is no longer active".to_string(),
                ));
            }

            let restored = snapshot.record.quantity;
            let mut updated = snapshot.record.clone();
            updated.quantity = 0;
            updated.active = false;

            match self.store().commit_listing(&snapshot, updated) {
                Ok(closed) => {
                    self.restore_escrow(&snapshot.record, restored)?;
                    self.invalidate_price(&closed.item_name);
                    self.publish(MarketEvent::Cancelled {
                        listing: closed.id,
                    });
                    return Ok(());
                }
                Err(MarketError::Conflict) => {
                    debug!("cancel of listing {} raced a buyer, retrying", listing_id);
                }
                Err(err) => return Err(err),
            }
        }
        Err(MarketError::contention())
    }

    /// Put cancelled stock back onto the source item. The item record
    /// normally still exists with whatever stock was not listed; if it is
    /// gone, rebuild it from the listing snapshot.
    fn restore_escrow(&self, listing: &ListingRecord, quantity: u32) -> Result<(), MarketError> {
        match self.store().get_item(listing.item_id) {
            Ok(mut item) => {
                item.quantity += quantity;
                self.store().put_item(item)?;
            }
            Err(MarketError::NotFound(_)) => {
                let mut item = ItemRecord::new(
                    listing.item_name.clone(),
                    listing.unit,
                    listing.tier,
                    quantity,
                    listing.quality,
                    listing.seller.clone(),
                );
                item.id = listing.item_id;
                item.price = Some(listing.price);
                self.store().put_item(item)?;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Browse active listings, newest first, optionally filtered by a
    /// case-insensitive name substring.
    pub fn active_listings(
        &self,
        search: Option<&str>,
        page: usize,
        size: usize,
    ) -> Result<ListingPage, MarketError> {
        let needle = search.map(|s| s.to_lowercase());
        let mut listings: Vec<ListingRecord> = self
            .store()
            .all_listings()?
            .into_iter()
            .filter(|l| l.active)
            .filter(|l| match &needle {
                Some(needle) => l.item_name.to_lowercase().contains(needle),
                None => true,
            })
            .collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = listings.len();
        let start = page.saturating_mul(size).min(total);
        let end = start.saturating_add(size).min(total);
        Ok(ListingPage {
            listings: listings[start..end].to_vec(),
            page,
            size,
            total,
        })
    }

    /// Set the owner-facing sale price on an item (what the bot buyer pays
    /// per unit during shop sales).
    pub fn set_item_price(
        &self,
        owner: &str,
        item_id: Uuid,
        price: Credits,
    ) -> Result<ItemRecord, MarketError> {
        if !price.is_positive() {
            return Err(MarketError::BusinessRule(
                "price must be positive".to_string(),
            ));
        }
        let mut item = self.store().get_item(item_id)?;
        if !item.owner.eq_ignore_ascii_case(owner) {
            return Err(MarketError::Unauthorized(
                "this item does not belong to you".to_string(),
            ));
        }
        item.price = Some(price);
        self.store().put_item(item.clone())?;
        Ok(item)
    }
}
