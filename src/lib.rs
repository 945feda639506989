//! # Tradehall - Market & Dynamic Economy Engine
//!
//! Tradehall is the economic core of a multiplayer tycoon game: players list
//! goods at fixed prices on a shared market, buy from each other under real
//! concurrency, and run shops whose stock is periodically absorbed by a
//! simulated NPC buyer driven by supply, demand, quality tier and price
//! competitiveness.
//!
//! ## Features
//!
//! - **Dynamic Reference Pricing**: Per-good reference prices computed from
//!   active supply and trailing 24-hour demand, bounded by a configurable
//!   multiplier band and memoized with explicit invalidation.
//! - **Concurrency-Safe Trading**: Listings carry an optimistic version
//!   token; racing buyers are arbitrated by compare-and-swap with a bounded
//!   retry loop, guaranteeing no oversell and no lost balance updates.
//! - **Quality-Weighted Inventory**: Identical goods stack with
//!   quantity-weighted average quality, converging regardless of merge
//!   order.
//! - **Bot Sales Simulation**: A timer-driven NPC buyer scores each shop
//!   item with a tunable multi-factor formula (tier, volatility roll, owner
//!   level, price competitiveness) and settles earnings, XP and ledger
//!   entries in one pass.
//! - **Embedded Persistence**: All state lives in a sled key-value store;
//!   no external database required.
//! - **Async Daemon**: Built on Tokio; the sales sweep runs off a plain
//!   interval timer and the core assumes no particular scheduler.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tradehall::config::Config;
//! use tradehall::market::{MarketEngine, MarketStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = Arc::new(MarketStore::open(&config.engine.data_dir)?);
//!     let engine = MarketEngine::new(
//!         store,
//!         config.economy.clone(),
//!         config.engine.system_account.clone(),
//!     );
//!     engine.seed_system_market()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`market`] - The economic core: records, storage, pricing, listings,
//!   trades, bot sales, events
//! - [`config`] - Configuration management and validation
//! - [`logutil`] - Log sanitization helpers

pub mod config;
pub mod logutil;
pub mod market;
