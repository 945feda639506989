//! # Configuration Management Module
//!
//! Central configuration for the Tradehall daemon: where the store lives,
//! how the economy formulas are tuned, and how logging behaves. TOML on
//! disk, strongly typed in memory, validated on load.
//!
//! ## Configuration Structure
//!
//! - [`EngineConfig`] - store location, sweep cadence, system vendor account
//! - [`EconomyConfig`] - every tunable constant in the pricing and bot
//!   sale scoring formulas
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tradehall::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("data dir: {}", config.engine.data_dir);
//!
//!     // Or write a starter file
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! The scoring constants (volatility band, cheap-sale boost, level bonus)
//! deliberately live here rather than as hard-coded invariants: operators
//! tune them per deployment.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Daemon-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the sled database.
    pub data_dir: String,
    /// Seconds between sales-sweep ticks.
    pub sweep_interval_secs: u64,
    /// Account name of the system vendor / bot buyer.
    pub system_account: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/market".to_string(),
            sweep_interval_secs: 60,
            system_account: "exchange".to_string(),
        }
    }
}

/// Tunable constants of the pricing and bot-sale scoring formulas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Units added to raw demand so cold goods never price at zero demand.
    pub demand_buffer: u32,
    /// Lower bound of the dynamic price multiplier.
    pub price_floor: f64,
    /// Upper bound of the dynamic price multiplier.
    pub price_ceiling: f64,
    /// Lower edge of the bot-sale volatility roll.
    pub volatility_min: f64,
    /// Upper edge of the bot-sale volatility roll.
    pub volatility_max: f64,
    /// Boost slope for asking prices below the reference price.
    pub cheap_boost: f64,
    /// Sale bonus per owner level (0.01 = +1% per level).
    pub level_bonus: f64,
    /// Optimistic-concurrency retries before a trade gives up.
    pub buy_retry_attempts: u32,
    /// Length of a shop sales window in minutes.
    pub sale_window_mins: i64,
    /// XP granted per unit the bot buys.
    pub xp_per_item_sold: u64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            demand_buffer: 10,
            price_floor: 0.5,
            price_ceiling: 3.0,
            volatility_min: 0.8,
            volatility_max: 1.2,
            cheap_boost: 3.0,
            level_bonus: 0.01,
            buy_retry_attempts: 3,
            sale_window_mins: 10,
            xp_per_item_sold: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject configurations that would make the formulas degenerate.
    pub fn validate(&self) -> Result<()> {
        let econ = &self.economy;
        if self.engine.system_account.trim().is_empty() {
            return Err(anyhow!("engine.system_account must not be empty"));
        }
        if self.engine.sweep_interval_secs == 0 {
            return Err(anyhow!("engine.sweep_interval_secs must be positive"));
        }
        if econ.price_floor <= 0.0 || econ.price_floor > econ.price_ceiling {
            return Err(anyhow!(
                "economy.price_floor must be positive and not exceed price_ceiling"
            ));
        }
        if econ.volatility_min <= 0.0 || econ.volatility_min > econ.volatility_max {
            return Err(anyhow!(
                "economy.volatility_min must be positive and not exceed volatility_max"
            ));
        }
        if econ.cheap_boost < 0.0 || econ.level_bonus < 0.0 {
            return Err(anyhow!(
                "economy.cheap_boost and economy.level_bonus must not be negative"
            ));
        }
        if econ.buy_retry_attempts == 0 {
            return Err(anyhow!("economy.buy_retry_attempts must be at least 1"));
        }
        if econ.sale_window_mins <= 0 {
            return Err(anyhow!("economy.sale_window_mins must be positive"));
        }
        Ok(())
    }
}
