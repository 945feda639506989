//! Timed NPC purchase simulation.
//!
//! Once a shop's sales window elapses, the bot buyer walks the shop's stock
//! and absorbs a fraction of each priced item, scored from global
//! demand/supply, item tier, a volatility roll, the owner's level and how
//! the asking price compares to the dynamic reference price. The scheduler
//! is external; `run_sales_sweep` is safe to call from any timer.

use chrono::{Duration, Utc};
use log::{debug, warn};
use uuid::Uuid;

use crate::config::EconomyConfig;
use crate::market::engine::MarketEngine;
use crate::market::errors::MarketError;
use crate::market::events::MarketEvent;
use crate::market::types::{Credits, ItemTier, ShopKind, TransactionRecord};

/// One item's settled sale inside a batch.
#[derive(Debug, Clone)]
pub struct ShopSaleLine {
    pub item_name: String,
    pub quantity: u32,
    pub earnings: Credits,
}

/// Outcome of a whole shop sales window.
#[derive(Debug, Clone)]
pub struct ShopSalesSummary {
    pub shop: Uuid,
    pub owner: String,
    pub lines: Vec<ShopSaleLine>,
    pub revenue: Credits,
}

/// Price-competitiveness factor against the reference price: selling below
/// reference boosts the sale aggressively, selling above dampens it
/// quadratically. A non-positive reference leaves the score untouched.
pub fn price_factor(asking: Credits, reference: Credits, econ: &EconomyConfig) -> f64 {
    if !reference.is_positive() {
        return 1.0;
    }
    let ratio = asking.ratio_to(&reference);
    if ratio <= 1.0 {
        1.0 + (1.0 - ratio) * econ.cheap_boost
    } else {
        1.0 / (ratio * ratio)
    }
}

/// Fraction of a stack the bot wants to buy, before flooring and capping.
///
/// The raw demand/supply ratio is weighted by tier and capped at a score of
/// 100 (a full buyout) before the volatility roll, the owner-level bonus and
/// the price factor are applied.
pub fn sale_fraction(
    demand: u64,
    supply: u64,
    tier: ItemTier,
    owner_level: u32,
    volatility: f64,
    price_multiplier: f64,
    econ: &EconomyConfig,
) -> f64 {
    let supply = supply.max(1) as f64;
    let base_score = ((demand as f64 / supply) * tier.demand_weight()).min(100.0);
    let mut fraction = base_score / 100.0;
    fraction *= volatility;
    fraction *= 1.0 + owner_level as f64 * econ.level_bonus;
    fraction *= price_multiplier;
    fraction
}

impl MarketEngine {
    /// Open a shop's timed sales window. Owner-only, shops only, and there
    /// must be stock to sell.
    pub fn start_shop_sales(&self, owner: &str, shop_id: Uuid) -> Result<(), MarketError> {
        let mut shop = self.store().get_shop(shop_id)?;
        if !shop.owner.eq_ignore_ascii_case(owner) {
            return Err(MarketError::Unauthorized(
                "this shop does not belong to you".to_string(),
            ));
        }
        if shop.kind != ShopKind::Shop {
            return Err(MarketError::BusinessRule(
                "only shops can run sales".to_string(),
            ));
        }
        if shop.selling {
            return Err(MarketError::BusinessRule(
                "a sales window is already running".to_string(),
            ));
        }

        let stock: u32 = self
            .store()
            .items_in_shop(shop_id)?
            .iter()
            .map(|i| i.quantity)
            .sum();
        if stock == 0 {
            return Err(MarketError::BusinessRule(
                "nothing to sell, stock the shop first".to_string(),
            ));
        }

        shop.selling = true;
        shop.sales_end_at = Some(Utc::now() + Duration::minutes(self.econ().sale_window_mins));
        self.store().put_shop(shop)?;
        Ok(())
    }

    /// Settle a shop whose sales window has elapsed: score every priced item,
    /// credit the owner, grant XP, decrement stock, ledger each sale, and
    /// close with one aggregated notification.
    pub fn process_shop_sales(&self, shop_id: Uuid) -> Result<ShopSalesSummary, MarketError> {
        let mut shop = self.store().get_shop(shop_id)?;
        if shop.kind != ShopKind::Shop {
            return Err(MarketError::BusinessRule(
                "this building type cannot run sales".to_string(),
            ));
        }
        if !shop.selling {
            return Err(MarketError::BusinessRule(
                "this shop has nothing up for sale".to_string(),
            ));
        }

        let owner = self.store().get_account(&shop.owner)?;
        let econ = self.econ().clone();
        let xp_per_item = econ.xp_per_item_sold;

        let mut lines = Vec::new();
        let mut revenue = Credits::ZERO;

        for mut item in self.store().items_in_shop(shop_id)? {
            if item.quantity == 0 {
                continue;
            }
            let Some(asking) = item.price.filter(|p| p.is_positive()) else {
                debug!("skipping unpriced stock {} in shop {}", item.name, shop.name);
                continue;
            };

            let demand = self.global_demand(&item.name)?;
            let supply = self.global_supply(&item.name)?;
            let reference = self.market_price(&item.name)?;

            let volatility = self.roll_volatility();
            let price_multiplier = price_factor(asking, reference, &econ);
            let fraction = sale_fraction(
                demand,
                supply,
                item.tier,
                owner.level,
                volatility,
                price_multiplier,
                &econ,
            );

            let mut to_buy = (item.quantity as f64 * fraction).ceil() as u32;
            if to_buy == 0 && fraction > 0.01 {
                to_buy = 1;
            }
            // Stochastic rescue: a viable price occasionally moves one unit
            // even when the score rounds to nothing, so stock never
            // stagnates forever.
            if to_buy == 0 && price_multiplier > 0.1 && self.roll_rescue() {
                to_buy = 1;
            }
            to_buy = to_buy.min(item.quantity);

            if to_buy == 0 {
                continue;
            }

            let earnings = asking.times(to_buy);
            revenue = revenue
                .checked_add(earnings)
                .ok_or_else(|| MarketError::Internal("revenue overflow".to_string()))?;

            self.store().credit_account(&shop.owner, earnings)?;
            if let Some(new_level) = self
                .store()
                .grant_xp(&shop.owner, to_buy as u64 * xp_per_item)?
            {
                self.notify(
                    &shop.owner,
                    &format!("Congratulations! You reached level {}", new_level),
                );
            }

            item.quantity -= to_buy;
            self.store().put_item(item.clone())?;

            self.store().append_transaction(TransactionRecord::system_sell(
                self.system_account(),
                &shop.owner,
                item.name.clone(),
                to_buy,
                earnings,
            ))?;
            self.invalidate_price(&item.name);

            lines.push(ShopSaleLine {
                item_name: item.name.clone(),
                quantity: to_buy,
                earnings,
            });
        }

        // The window always closes, even when nothing moved.
        shop.selling = false;
        shop.sales_end_at = None;
        shop.last_revenue = revenue;
        self.store().put_shop(shop.clone())?;

        if revenue.is_positive() {
            let sold: Vec<String> = lines
                .iter()
                .map(|l| format!("{} x {}", l.quantity, l.item_name))
                .collect();
            self.notify(
                &shop.owner,
                &format!(
                    "Sales closed at {}: {}. Total earnings: {}",
                    shop.name,
                    sold.join(", "),
                    revenue
                ),
            );
        }
        self.publish(MarketEvent::ShopSalesSettled {
            shop: shop.id,
            owner: shop.owner.clone(),
            revenue,
        });

        Ok(ShopSalesSummary {
            shop: shop.id,
            owner: shop.owner,
            lines,
            revenue,
        })
    }

    /// Settle every shop whose sales window has elapsed. Failures are logged
    /// per shop so one bad row cannot stall the sweep. Returns the number of
    /// shops processed.
    pub fn run_sales_sweep(&self) -> Result<usize, MarketError> {
        let due = self.store().shops_due(Utc::now())?;
        let mut processed = 0usize;
        for shop in due {
            match self.process_shop_sales(shop.id) {
                Ok(summary) => {
                    processed += 1;
                    debug!(
                        "shop {} settled: {} sold for {}",
                        shop.name,
                        summary.lines.len(),
                        summary.revenue
                    );
                }
                Err(err) => warn!("sales sweep failed for shop {}: {}", shop.name, err),
            }
        }
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cheap_asking_price_boosts_sales() {
        let econ = EconomyConfig::default();
        // Asking half the reference: 1 + (1 - 0.5) * 3 = 2.5
        let factor = price_factor(Credits::from_whole(5), Credits::from_whole(10), &econ);
        assert!((factor - 2.5).abs() < 1e-9);
    }

    #[test]
    fn expensive_asking_price_dampens_quadratically() {
        let econ = EconomyConfig::default();
        // Asking double the reference: 1 / 4
        let factor = price_factor(Credits::from_whole(20), Credits::from_whole(10), &econ);
        assert!((factor - 0.25).abs() < 1e-9);
    }

    #[test]
    fn matching_reference_price_is_neutral() {
        let econ = EconomyConfig::default();
        let factor = price_factor(Credits::from_whole(10), Credits::from_whole(10), &econ);
        assert!((factor - 1.0).abs() < 1e-9);
        assert_eq!(price_factor(Credits::from_whole(10), Credits::ZERO, &econ), 1.0);
    }

    #[test]
    fn sale_fraction_caps_base_score() {
        let econ = EconomyConfig::default();
        // Demand massively over supply: score pins at 100 -> fraction 1.0
        // before the other factors.
        let fraction = sale_fraction(100_000, 1, ItemTier::Scarce, 0, 1.0, 1.0, &econ);
        assert!((fraction - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sale_fraction_applies_level_and_volatility() {
        let econ = EconomyConfig::default();
        // demand 50, supply 1, tier Medium -> score 50 -> fraction 0.5;
        // volatility 1.2 and level 10 (+10%) -> 0.5 * 1.2 * 1.1 = 0.66
        let fraction = sale_fraction(50, 1, ItemTier::Medium, 10, 1.2, 1.0, &econ);
        assert!((fraction - 0.66).abs() < 1e-9);
    }

    #[test]
    fn zero_supply_clamps_to_one() {
        let econ = EconomyConfig::default();
        let fraction = sale_fraction(10, 0, ItemTier::Medium, 0, 1.0, 1.0, &econ);
        assert!((fraction - 0.1).abs() < 1e-9);
    }
}
