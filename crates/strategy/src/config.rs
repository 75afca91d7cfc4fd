use serde::{Deserialize, Serialize};

/// `[strategy]` table of the engine config.
///
/// ```toml
/// [strategy]
/// type = "adaptive"
///
/// [strategy.orb]
/// entry_buffer = 0.5
/// sl_factor = 1.5
/// target_factor = 4.0
///
/// [strategy.vwap_rev]
/// vwap_dev = 0.0015
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    #[serde(rename = "type")]
    pub strategy_type: StrategyType,
    #[serde(default)]
    pub orb: OrbParams,
    #[serde(default)]
    pub vwap_rev: VwapParams,
    /// Adaptive picks ORB for the day when the opening range is narrower
    /// than this many ATRs, VWAP reversion otherwise.
    #[serde(default = "default_adaptive_range_atr")]
    pub adaptive_range_atr: f64,
}

fn default_adaptive_range_atr() -> f64 {
    1.5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    Orb,
    VwapRev,
    Adaptive,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrbParams {
    /// Breakout must clear the range by this many price units.
    pub entry_buffer: f64,
    pub sl_factor: f64,
    pub target_factor: f64,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            entry_buffer: 0.5,
            sl_factor: 1.5,
            target_factor: 4.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VwapParams {
    /// Fractional distance from VWAP that triggers a reversion trade.
    pub vwap_dev: f64,
    pub sl_mult: f64,
    pub target_mult: f64,
    /// Minimum reward/risk ratio.
    pub rr_threshold: f64,
}

impl Default for VwapParams {
    fn default() -> Self {
        Self {
            vwap_dev: 0.0015,
            sl_mult: 0.8,
            target_mult: 4.0,
            rr_threshold: 1.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_table_uses_defaults() {
        let cfg: StrategyConfig = toml::from_str("type = \"vwap_rev\"").unwrap();
        assert_eq!(cfg.strategy_type, StrategyType::VwapRev);
        assert_eq!(cfg.vwap_rev.rr_threshold, 1.2);
        assert_eq!(cfg.orb.target_factor, 4.0);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(toml::from_str::<StrategyConfig>("type = \"rsi\"").is_err());
    }
}
