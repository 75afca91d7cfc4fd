//! Trade proposal generation.
//!
//! Strategies read indicator values already present on each bar
//! (`orb_high`, `orb_low`, `vwap`, `atr`); computing those is the feed's job.

pub mod adaptive;
pub mod config;
pub mod orb;
pub mod registry;
pub mod vwap;

pub use config::{OrbParams, StrategyConfig, StrategyType, VwapParams};
pub use registry::StrategyKind;

use common::{Bar, TradeProposal};

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send {
    /// Name stamped on proposals and trade records.
    fn name(&self) -> &str;

    /// Evaluate the latest closed bar. Always returns a proposal; one with no
    /// signal or `valid == false` means "do nothing".
    fn propose(&mut self, bar: &Bar) -> TradeProposal;
}

/// Indicator lookup that turns a missing field into a no-signal reason.
pub(crate) fn require(bar: &Bar, name: &str) -> Result<f64, String> {
    match bar.indicator(name) {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(format!("missing indicator '{name}'")),
    }
}
