//! The concurrency-safe buy path.
//!
//! Two buyers racing on one listing are arbitrated by the listing's version
//! token: the loser's write is rejected, its debit is refunded, and the whole
//! attempt re-runs from a fresh read, up to the configured bound. Money and
//! stock only move together; a failed listing write leaves no trace of the
//! attempt.

use log::debug;
use uuid::Uuid;

use crate::market::engine::MarketEngine;
use crate::market::errors::MarketError;
use crate::market::events::MarketEvent;
use crate::market::inventory;
use crate::market::types::TransactionRecord;

impl MarketEngine {
    /// Buy `quantity` units from an active listing.
    ///
    /// Attempt order matters: the buyer is debited first, then the stock
    /// decrement is committed against the listing version. A conflict
    /// refunds the debit before retrying, so no partial effect of a failed
    /// attempt is ever observable. Side effects that cannot conflict
    /// (seller credit, holding merge, ledger append, notification) run only
    /// after the listing write has landed.
    pub fn buy_item(
        &self,
        buyer: &str,
        listing_id: Uuid,
        quantity: u32,
    ) -> Result<TransactionRecord, MarketError> {
        if quantity == 0 {
            return Err(MarketError::BusinessRule(
                "purchase quantity must be positive".to_string(),
            ));
        }

        let max_attempts = self.econ().buy_retry_attempts.max(1);

        for attempt in 0..max_attempts {
            let snapshot = self.store().load_listing(listing_id)?;
            let listing = &snapshot.record;

            if listing.seller.eq_ignore_ascii_case(buyer) {
                return Err(MarketError::BusinessRule(
                    "you cannot buy your own listing".to_string(),
                ));
            }
            if !listing.active {
                return Err(MarketError::BusinessRule(
                    "this listing is no longer for sale".to_string(),
                ));
            }
            if listing.quantity < quantity {
                return Err(MarketError::BusinessRule(
                    "the listing does not have enough stock".to_string(),
                ));
            }

            let total = listing.price.times(quantity);

            // Sufficiency check and debit happen atomically in the store.
            self.store().debit_account(buyer, total)?;

            // The system vendor sells from bottomless stock; its listings
            // are never decremented or deactivated.
            let settled = if listing.seller.eq_ignore_ascii_case(self.system_account()) {
                listing.clone()
            } else {
                let mut updated = listing.clone();
                updated.quantity -= quantity;
                if updated.quantity == 0 {
                    updated.active = false;
                }
                match self.store().commit_listing(&snapshot, updated) {
                    Ok(committed) => committed,
                    Err(MarketError::Conflict) => {
                        // Another buyer advanced the version first. Make the
                        // buyer whole and re-run from a fresh read.
                        self.store().credit_account(buyer, total)?;
                        debug!(
                            "buy of listing {} conflicted (attempt {}/{})",
                            listing_id,
                            attempt + 1,
                            max_attempts
                        );
                        continue;
                    }
                    Err(err) => {
                        self.store().credit_account(buyer, total)?;
                        return Err(err);
                    }
                }
            };

            self.store().credit_account(&settled.seller, total)?;
            inventory::credit_holding(self.store(), buyer, &settled, quantity)?;

            let transaction = TransactionRecord::market_buy(
                buyer,
                settled.seller.clone(),
                settled.id,
                settled.item_name.clone(),
                quantity,
                total,
            );
            self.store().append_transaction(transaction.clone())?;

            self.invalidate_price(&settled.item_name);
            self.notify(
                &settled.seller,
                &format!(
                    "{} bought {} x {} from your listing. Earnings: {}",
                    buyer, quantity, settled.item_name, total
                ),
            );
            self.publish(MarketEvent::Purchased {
                listing: settled.id,
                item_name: settled.item_name.clone(),
                quantity,
                price: settled.price,
                buyer: buyer.to_string(),
                seller: settled.seller.clone(),
            });

            return Ok(transaction);
        }

        Err(MarketError::contention())
    }
}
