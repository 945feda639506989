//! Market and dynamic economy core.
//!
//! Everything economic lives here: the persistent records (accounts,
//! holdings, listings, ledger, shops), the bounded dynamic pricing model,
//! the optimistic-concurrency trade path, and the timed bot sales
//! simulation. The [`engine::MarketEngine`] struct ties the pieces together
//! and is the only surface callers need.

pub mod bot;
pub mod engine;
pub mod errors;
pub mod events;
pub mod inventory;
pub mod listing;
pub mod pricing;
pub mod storage;
pub mod trade;
pub mod types;

pub use bot::{price_factor, sale_fraction, ShopSaleLine, ShopSalesSummary};
pub use engine::MarketEngine;
pub use errors::MarketError;
pub use events::{LogNotifier, MarketEvent, NotificationSink};
pub use inventory::{merge_quality, round2};
pub use listing::ListingPage;
pub use pricing::{base_price, PriceBoard, DEFAULT_BASE_PRICE, DEMAND_WINDOW_HOURS};
pub use storage::{ListingSnapshot, MarketStore};
pub use types::*;
