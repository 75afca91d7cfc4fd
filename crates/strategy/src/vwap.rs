use common::{round2, Bar, Side, TradeProposal};

use crate::config::VwapParams;
use crate::{require, Strategy};

/// Fade a stretch away from VWAP.
#[derive(Debug, Clone)]
pub struct VwapReversion {
    params: VwapParams,
}

impl VwapReversion {
    pub const NAME: &'static str = "VWAP_REV";

    pub fn new(params: VwapParams) -> Self {
        Self { params }
    }

    fn evaluate(&self, bar: &Bar) -> Result<TradeProposal, String> {
        let vwap = require(bar, "vwap")?;
        if vwap <= 0.0 || bar.atr <= 0.0 {
            return Err("no VWAP or ATR".into());
        }
        let p = &self.params;
        let deviation = (bar.close - vwap) / vwap;
        let side = if deviation <= -p.vwap_dev {
            Side::Buy
        } else if deviation >= p.vwap_dev {
            Side::Sell
        } else {
            return Ok(TradeProposal::none(bar.timestamp, Self::NAME, "near VWAP"));
        };

        let sign = side.sign();
        let stop = round2(bar.close - sign * p.sl_mult * bar.atr);
        let target = round2(bar.close + sign * p.target_mult * bar.atr);
        let mut proposal = TradeProposal::new(bar.timestamp, side, bar.close, stop, target, Self::NAME);

        let risk = (bar.close - stop).abs();
        let reward = (target - bar.close).abs();
        if risk <= 0.0 || reward / risk < p.rr_threshold {
            proposal.reject(format!("reward/risk below {:.2}", p.rr_threshold));
        }
        Ok(proposal)
    }
}

impl Strategy for VwapReversion {
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
    fn stretch_below_vwap_is_a_buy() {
        let mut s = VwapReversion::new(VwapParams::default());
        let bar = bar_with(49_900.0, 40.0, &[("vwap", 50_000.0)]);
        let p = s.propose(&bar);
        assert_eq!(p.signal, Some(Side::Buy));
        assert!(p.valid);
        assert_eq!(p.stop_loss, 49_868.0);
        assert_eq!(p.target, 50_060.0);
    }

    #[test]
    fn poor_reward_risk_is_rejected() {
        let params = VwapParams {
            sl_mult: 2.0,
            target_mult: 2.0,
            ..VwapParams::default()
        };
        let mut s = VwapReversion::new(params);
        let bar = bar_with(50_100.0, 40.0, &[("vwap", 50_000.0)]);
        let p = s.propose(&bar);
        assert_eq!(p.signal, Some(Side::Sell));
        assert!(!p.valid);
    }

    #[test]
    fn close_to_vwap_is_no_trade() {
        let mut s = VwapReversion::new(VwapParams::default());
        let bar = bar_with(50_010.0, 40.0, &[("vwap", 50_000.0)]);
        assert_eq!(s.propose(&bar).signal, None);
    }
}
