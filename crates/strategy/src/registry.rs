use tracing::info;

use common::{Bar, TradeProposal};

use crate::adaptive::AdaptiveStrategy;
use crate::config::{StrategyConfig, StrategyType};
use crate::orb::OrbStrategy;
use crate::vwap::VwapReversion;
use crate::Strategy;

/// The configured strategy, chosen once at startup.
#[derive(Debug, Clone)]
pub enum StrategyKind {
    Orb(OrbStrategy),
    VwapRev(VwapReversion),
    Adaptive(AdaptiveStrategy),
}

impl StrategyKind {
    pub fn from_config(cfg: &StrategyConfig) -> Self {
        let orb = OrbStrategy::new(cfg.orb.clone());
        let vwap = VwapReversion::new(cfg.vwap_rev.clone());
        let kind = match cfg.strategy_type {
            StrategyType::Orb => StrategyKind::Orb(orb),
            StrategyType::VwapRev => StrategyKind::VwapRev(vwap),
            StrategyType::Adaptive => {
                StrategyKind::Adaptive(AdaptiveStrategy::new(orb, vwap, cfg.adaptive_range_atr))
            }
        };
        info!(name = %kind.name(), "Registered strategy");
        kind
    }
}

impl Strategy for StrategyKind {
    fn name(&self) -> &str {
        match self {
            StrategyKind::Orb(s) => s.name(),
            StrategyKind::VwapRev(s) => s.name(),
            StrategyKind::Adaptive(s) => s.name(),
        }
    }

    fn propose(&mut self, bar: &Bar) -> TradeProposal {
        match self {
            StrategyKind::Orb(s) => s.propose(bar),
            StrategyKind::VwapRev(s) => s.propose(bar),
            StrategyKind::Adaptive(s) => s.propose(bar),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::time::parse_timestamp;
    use std::collections::BTreeMap;

    pub(crate) fn bar_with(close: f64, atr: f64, fields: &[(&str, f64)]) -> Bar {
        Bar {
            timestamp: parse_timestamp("2024-03-04 10:00:00").unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
            atr,
            indicators: fields.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn builds_the_configured_variant() {
        let cfg: StrategyConfig = toml::from_str("type = \"orb\"").unwrap();
        let mut kind = StrategyKind::from_config(&cfg);
        assert!(matches!(kind, StrategyKind::Orb(_)));
        assert_eq!(kind.name(), "ORB");

        let bar = bar_with(50_200.0, 40.0, &[("orb_high", 50_100.0), ("orb_low", 49_900.0)]);
        assert!(kind.propose(&bar).is_actionable());
    }

    #[test]
    fn adaptive_config_builds_adaptive() {
        let cfg: StrategyConfig = toml::from_str("type = \"adaptive\"\nadaptive_range_atr = 2.0").unwrap();
        assert!(matches!(StrategyKind::from_config(&cfg), StrategyKind::Adaptive(_)));
    }
}
