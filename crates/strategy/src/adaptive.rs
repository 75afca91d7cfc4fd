use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::info;

use common::{Bar, TradeProposal};

use crate::orb::OrbStrategy;
use crate::vwap::VwapReversion;
use crate::{require, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRegime {
    Breakout,
    Reversion,
}

/// Picks ORB or VWAP reversion once per trading day from the width of the
/// opening range relative to ATR, then sticks with it for the day.
#[derive(Debug, Clone)]
pub struct AdaptiveStrategy {
    orb: OrbStrategy,
    vwap: VwapReversion,
    range_atr: f64,
    regimes: HashMap<NaiveDate, DayRegime>,
}

impl AdaptiveStrategy {
    pub const NAME: &'static str = "ADAPTIVE";

    pub fn new(orb: OrbStrategy, vwap: VwapReversion, range_atr: f64) -> Self {
        Self {
            orb,
            vwap,
            range_atr,
            regimes: HashMap::new(),
        }
    }

    /// Regime chosen for `date`, if one was already decided.
    pub fn regime(&self, date: NaiveDate) -> Option<DayRegime> {
        self.regimes.get(&date).copied()
    }

    fn classify(&mut self, bar: &Bar) -> Result<DayRegime, String> {
        let date = bar.timestamp.date_naive();
        if let Some(regime) = self.regimes.get(&date) {
            return Ok(*regime);
        }
        let width = require(bar, "orb_high")? - require(bar, "orb_low")?;
        if bar.atr <= 0.0 {
            return Err("no ATR".into());
        }
        let regime = if width < self.range_atr * bar.atr {
            DayRegime::Breakout
        } else {
            DayRegime::Reversion
        };
        info!(%date, ?regime, width, atr = bar.atr, "Adaptive regime chosen");
        self.regimes.insert(date, regime);
        Ok(regime)
    }
}

impl Strategy for AdaptiveStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn propose(&mut self, bar: &Bar) -> TradeProposal {
        match self.classify(bar) {
            Ok(DayRegime::Breakout) => self.orb.propose(bar),
            Ok(DayRegime::Reversion) => self.vwap.propose(bar),
            Err(reason) => TradeProposal::none(bar.timestamp, Self::NAME, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OrbParams, VwapParams};
    use crate::registry::tests::bar_with;

    fn adaptive() -> AdaptiveStrategy {
        AdaptiveStrategy::new(
            OrbStrategy::new(OrbParams::default()),
            VwapReversion::new(VwapParams::default()),
            1.5,
        )
    }

    #[test]
    fn narrow_opening_range_means_breakout_day() {
        let mut s = adaptive();
        let bar = bar_with(50_100.0, 40.0, &[("orb_high", 50_040.0), ("orb_low", 50_000.0), ("vwap", 50_000.0)]);
        let p = s.propose(&bar);
        assert_eq!(p.strategy, OrbStrategy::NAME);
        assert_eq!(s.regime(bar.timestamp.date_naive()), Some(DayRegime::Breakout));
    }

    #[test]
    fn regime_is_kept_for_the_day() {
        let mut s = adaptive();
        let wide = bar_with(50_000.0, 40.0, &[("orb_high", 50_200.0), ("orb_low", 49_900.0), ("vwap", 50_000.0)]);
        s.propose(&wide);
        let mut narrow = bar_with(50_000.0, 40.0, &[("orb_high", 50_010.0), ("orb_low", 50_000.0), ("vwap", 50_000.0)]);
        narrow.timestamp = narrow.timestamp + chrono::Duration::minutes(5);
        let p = s.propose(&narrow);
        assert_eq!(p.strategy, VwapReversion::NAME);
    }
}
