use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use common::{Error, Result};
use risk::RiskConfig;
use strategy::StrategyConfig;

/// Trading parameters, loaded once from TOML at startup.
///
/// Times are quoted strings in exchange-local time:
/// ```toml
/// symbol = "BANKNIFTY"
/// lot_size = 35
///
/// [session]
/// cutoff = "15:25:00"
///
/// [strategy]
/// type = "orb"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub symbol: String,
    /// Units per lot; order quantity is `lot_size * lots`.
    pub lot_size: u32,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    /// Disables the session cutoff and market-hours checks.
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    /// Bars kept for look-back checks.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default)]
    pub risk: RiskConfig,
    pub strategy: StrategyConfig,
}

fn default_cooldown_minutes() -> i64 {
    15
}

fn default_window_size() -> usize {
    400
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// First bar that may open a trade.
    pub entry_start: NaiveTime,
    /// Open positions are closed and no entries are taken from here on.
    pub cutoff: NaiveTime,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            entry_start: hms(9, 30),
            cutoff: hms(15, 25),
            market_open: hms(9, 15),
            market_close: hms(15, 30),
        }
    }
}

fn hms(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizingConfig {
    pub initial_capital: f64,
    /// Capital required per lot.
    pub capital_per_lot: f64,
    pub max_lots: u32,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            initial_capital: 250_000.0,
            capital_per_lot: 250_000.0,
            max_lots: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiveConfig {
    /// Feed interval identifier.
    pub interval: String,
    pub poll_interval_secs: u64,
    /// Wait between checks while the market is closed.
    pub closed_poll_secs: u64,
    /// Days of history requested each cycle.
    pub history_days: i64,
    pub fetch_retries: u32,
    pub fetch_base_delay_ms: u64,
    /// Trading stops for the day once realised PnL falls below this.
    pub max_daily_loss: f64,
    /// Bars required before the first decision.
    pub min_bars: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            interval: "5minute".into(),
            poll_interval_secs: 60,
            closed_poll_secs: 300,
            history_days: 4,
            fetch_retries: 5,
            fetch_base_delay_ms: 1_000,
            max_daily_loss: -5_000.0,
            min_bars: 15,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read engine config at '{path}': {e}")))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::Config("symbol must not be empty".into()));
        }
        if self.lot_size == 0 {
            return Err(Error::Config("lot_size must be positive".into()));
        }
        if self.sizing.capital_per_lot <= 0.0 {
            return Err(Error::Config("sizing.capital_per_lot must be positive".into()));
        }
        if self.sizing.max_lots == 0 {
            return Err(Error::Config("sizing.max_lots must be at least 1".into()));
        }
        if self.cooldown_minutes < 0 {
            return Err(Error::Config("cooldown_minutes must not be negative".into()));
        }
        if self.session.entry_start >= self.session.cutoff {
            return Err(Error::Config("session.entry_start must be before session.cutoff".into()));
        }
        Ok(())
    }
}
