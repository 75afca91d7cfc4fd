use common::{round2, Bar, Side, TradeProposal};

use crate::config::OrbParams;
use crate::{require, Strategy};

/// Opening-range breakout: trade a close outside the morning range.
#[derive(Debug, Clone)]
pub struct OrbStrategy {
    params: OrbParams,
}

impl OrbStrategy {
    pub const NAME: &'static str = "ORB";

    pub fn new(params: OrbParams) -> Self {
        Self { params }
    }

    fn evaluate(&self, bar: &Bar) -> Result<TradeProposal, String> {
        let high = require(bar, "orb_high")?;
        let low = require(bar, "orb_low")?;
        if bar.atr <= 0.0 {
            return Err("no ATR".into());
        }
        let p = &self.params;
        let side = if bar.close > high + p.entry_buffer {
            Side::Buy
        } else if bar.close < low - p.entry_buffer {
            Side::Sell
        } else {
            return Ok(TradeProposal::none(bar.timestamp, Self::NAME, "inside opening range"));
        };
        let sign = side.sign();
        Ok(TradeProposal::new(
            bar.timestamp,
            side,
            bar.close,
            round2(bar.close - sign * p.sl_factor * bar.atr),
            round2(bar.close + sign * p.target_factor * bar.atr),
            Self::NAME,
        ))
    }
}

impl Strategy for OrbStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn propose(&mut self, bar: &Bar) -> TradeProposal {
        self.evaluate(bar)
            .unwrap_or_else(|reason| TradeProposal::none(bar.timestamp, Self::NAME, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::bar_with;

    #[test]
    fn breakout_above_range_is_a_buy() {
        let mut s = OrbStrategy::new(OrbParams::default());
        let bar = bar_with(50_120.0, 40.0, &[("orb_high", 50_100.0), ("orb_low", 49_900.0)]);
        let p = s.propose(&bar);
        assert_eq!(p.signal, Some(Side::Buy));
        assert!(p.is_actionable());
        assert_eq!(p.stop_loss, 50_060.0);
        assert_eq!(p.target, 50_280.0);
    }

    #[test]
    fn breakdown_below_range_is_a_sell() {
        let mut s = OrbStrategy::new(OrbParams::default());
        let bar = bar_with(49_850.0, 40.0, &[("orb_high", 50_100.0), ("orb_low", 49_900.0)]);
        let p = s.propose(&bar);
        assert_eq!(p.signal, Some(Side::Sell));
        assert_eq!(p.stop_loss, 49_910.0);
    }

    #[test]
    fn inside_range_or_missing_fields_is_no_trade() {
        let mut s = OrbStrategy::new(OrbParams::default());
        let bar = bar_with(50_000.0, 40.0, &[("orb_high", 50_100.0), ("orb_low", 49_900.0)]);
        assert!(!s.propose(&bar).is_actionable());

        let bar = bar_with(50_500.0, 40.0, &[("orb_high", 50_100.0)]);
        let p = s.propose(&bar);
        assert!(!p.valid);
        assert!(p.reason.contains("orb_low"));
    }
}
