use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Bar, BarWindow, ExitReason, Side, Timestamp};

use crate::PositionView;

/// Exit and stall-detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExitConfig {
    /// Positions younger than this skip every check except the cutoff.
    pub min_age_secs: i64,
    /// Bars looked at by the stall checks.
    pub stall_bars: usize,
    pub stall_move_atr: f64,
    pub stall_range_atr: f64,
    pub retrace_move_atr: f64,
    pub retrace_fraction: f64,
    /// Close-to-close band, in price units, that counts as sideways.
    pub sideways_band: f64,
    /// A BUY this far in profit (in ATRs) is never closed as sideways.
    pub sideways_profit_atr: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            min_age_secs: 60,
            stall_bars: 6,
            stall_move_atr: 2.5,
            stall_range_atr: 0.25,
            retrace_move_atr: 2.0,
            retrace_fraction: 0.5,
            sideways_band: 15.0,
            sideways_profit_atr: 0.5,
        }
    }
}

/// Decide whether the position should close on `bar`.
///
/// `window` must already contain `bar`. Position age is measured at `now`,
/// which can be later than the bar's own timestamp while the bar is still
/// forming. Checks run in priority order and the first one that fires is
/// returned.
pub fn evaluate(
    cfg: &ExitConfig,
    pos: &PositionView,
    bar: &Bar,
    window: &BarWindow,
    atr: f64,
    now: Timestamp,
    cutoff_reached: bool,
) -> Option<ExitReason> {
    if cutoff_reached {
        return Some(ExitReason::SessionCutoff);
    }
    if pos.age_secs(now) < cfg.min_age_secs {
        return None;
    }

    let price = bar.close;
    if stop_hit(pos.side, price, pos.stop_loss) {
        return Some(ExitReason::StopLoss);
    }
    if pos.side.favorable_move(pos.target_price, price) >= 0.0 {
        debug!(price, target = pos.target_price, "Target reached, stop keeps trailing");
    }

    if cfg.stall_bars == 0 || window.len() < cfg.stall_bars {
        return None;
    }
    let recent: Vec<&Bar> = window.last_n(cfg.stall_bars).collect();

    if atr > 0.0 {
        let excursion = max_excursion(pos, window);
        let avg_range = recent.iter().map(|b| b.range()).sum::<f64>() / recent.len() as f64;

        if excursion >= cfg.stall_move_atr * atr && avg_range < cfg.stall_range_atr * atr {
            return Some(ExitReason::ProfitStall);
        }

        let retracement = excursion - pos.side.favorable_move(pos.entry_price, price);
        if excursion >= cfg.retrace_move_atr * atr && retracement > cfg.retrace_fraction * excursion {
            return Some(ExitReason::ProfitRetracement);
        }
    }

    let (lo, hi) = recent
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), b| (lo.min(b.close), hi.max(b.close)));
    if hi - lo < cfg.sideways_band {
        let profit = pos.side.favorable_move(pos.entry_price, price);
        let protected = pos.side == Side::Buy && atr > 0.0 && profit >= cfg.sideways_profit_atr * atr;
        if !protected {
            return Some(ExitReason::SidewaysStall);
        }
    }
    None
}

pub fn stop_hit(side: Side, price: f64, stop: f64) -> bool {
    match side {
        Side::Buy => price <= stop,
        Side::Sell => price >= stop,
    }
}

/// Best favourable excursion from entry over bars strictly after entry,
/// using highs for BUY and lows for SELL. Never negative.
fn max_excursion(pos: &PositionView, window: &BarWindow) -> f64 {
    window
        .iter()
        .filter(|b| b.timestamp > pos.entry_time)
        .map(|b| {
            let extreme = match pos.side {
                Side::Buy => b.high,
                Side::Sell => b.low,
            };
            pos.side.favorable_move(pos.entry_price, extreme)
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::time::parse_timestamp;
    use std::collections::BTreeMap;

    fn t0() -> Timestamp {
        parse_timestamp("2024-03-04 10:00:00").unwrap()
    }

    fn bar(minutes: i64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: t0() + Duration::minutes(minutes),
            open: close,
            high,
            low,
            close,
            volume: 0.0,
            atr: 40.0,
            indicators: BTreeMap::new(),
        }
    }

    fn position(side: Side, stop: f64) -> PositionView {
        PositionView {
            side,
            entry_price: 50_000.0,
            stop_loss: stop,
            target_price: match side {
                Side::Buy => 50_500.0,
                Side::Sell => 49_500.0,
            },
            entry_time: t0(),
        }
    }

    fn window(bars: &[Bar]) -> BarWindow {
        let mut w = BarWindow::new(50);
        w.extend(bars.iter().cloned());
        w
    }

    #[test]
    fn cutoff_wins_over_everything() {
        let cfg = ExitConfig::default();
        let b = bar(0, 50_000.0, 50_000.0, 50_000.0);
        let w = window(&[b.clone()]);
        let reason = evaluate(&cfg, &position(Side::Buy, 49_900.0), &b, &w, 40.0, b.timestamp, true);
        assert_eq!(reason, Some(ExitReason::SessionCutoff));
    }

    #[test]
    fn young_position_is_exempt_from_stop() {
        let cfg = ExitConfig::default();
        let mut b = bar(0, 49_850.0, 49_800.0, 49_800.0);
        b.timestamp = t0() + Duration::seconds(30);
        let w = window(&[b.clone()]);
        assert_eq!(evaluate(&cfg, &position(Side::Buy, 49_900.0), &b, &w, 40.0, b.timestamp, false), None);
    }

    #[test]
    fn stop_hit_on_close_both_sides() {
        let cfg = ExitConfig::default();
        let b = bar(5, 49_950.0, 49_890.0, 49_900.0);
        let w = window(&[b.clone()]);
        assert_eq!(
            evaluate(&cfg, &position(Side::Buy, 49_900.0), &b, &w, 40.0, b.timestamp, false),
            Some(ExitReason::StopLoss)
        );

        let b = bar(5, 50_110.0, 50_050.0, 50_100.0);
        let w = window(&[b.clone()]);
        assert_eq!(
            evaluate(&cfg, &position(Side::Sell, 50_100.0), &b, &w, 40.0, b.timestamp, false),
            Some(ExitReason::StopLoss)
        );
    }

    #[test]
    fn touching_target_is_not_an_exit() {
        let cfg = ExitConfig::default();
        let b = bar(5, 50_520.0, 50_480.0, 50_510.0);
        let w = window(&[b.clone()]);
        assert_eq!(evaluate(&cfg, &position(Side::Buy, 49_900.0), &b, &w, 40.0, b.timestamp, false), None);
    }

    #[test]
    fn stall_checks_wait_for_full_window() {
        let cfg = ExitConfig::default();
        let bars: Vec<Bar> = (1..=5).map(|i| bar(i * 5, 50_005.0, 49_995.0, 50_000.0)).collect();
        let w = window(&bars);
        let last = bars.last().unwrap();
        assert_eq!(evaluate(&cfg, &position(Side::Sell, 50_100.0), last, &w, 40.0, last.timestamp, false), None);
    }

    #[test]
    fn flat_tape_after_big_move_is_profit_stall() {
        let cfg = ExitConfig::default();
        // ran to +120 (3 ATR) then went quiet around +110 with tiny ranges
        let mut bars = vec![bar(5, 50_120.0, 50_000.0, 50_110.0)];
        bars.extend((2..=7).map(|i| bar(i * 5, 50_114.0, 50_108.0, 50_110.0 + (i % 2) as f64 * 20.0)));
        let w = window(&bars);
        let last = bars.last().unwrap();
        assert_eq!(
            evaluate(&cfg, &position(Side::Buy, 49_950.0), last, &w, 40.0, last.timestamp, false),
            Some(ExitReason::ProfitStall)
        );
    }

    #[test]
    fn giving_back_half_the_move_is_retracement() {
        let cfg = ExitConfig::default();
        let closes = [50_050.0, 50_090.0, 50_060.0, 50_040.0, 50_030.0, 50_035.0];
        let mut bars = vec![bar(5, 50_100.0, 50_000.0, 50_080.0)];
        bars.extend(closes.iter().enumerate().map(|(i, c)| bar((i as i64 + 2) * 5, c + 10.0, c - 10.0, *c)));
        let w = window(&bars);
        let last = bars.last().unwrap();
        // excursion 100 >= 80, retraced 65 > 50
        assert_eq!(
            evaluate(&cfg, &position(Side::Buy, 49_950.0), last, &w, 40.0, last.timestamp, false),
            Some(ExitReason::ProfitRetracement)
        );
    }

    #[test]
    fn sideways_closes_sell_but_spares_profitable_buy() {
        let cfg = ExitConfig::default();
        let bars: Vec<Bar> = (1..=6).map(|i| bar(i * 5, 49_995.0, 49_985.0, 49_990.0 + (i % 3) as f64)).collect();
        let w = window(&bars);
        let last = bars.last().unwrap();
        assert_eq!(
            evaluate(&cfg, &position(Side::Sell, 50_100.0), last, &w, 40.0, last.timestamp, false),
            Some(ExitReason::SidewaysStall)
        );

        let bars: Vec<Bar> = (1..=6).map(|i| bar(i * 5, 50_035.0, 50_025.0, 50_030.0 + (i % 3) as f64)).collect();
        let w = window(&bars);
        let last = bars.last().unwrap();
        assert_eq!(evaluate(&cfg, &position(Side::Buy, 49_950.0), last, &w, 40.0, last.timestamp, false), None);
    }

    #[test]
    fn age_is_measured_at_now_not_at_the_bar() {
        let cfg = ExitConfig::default();
        // the bar opened before the entry and is still forming
        let b = bar(-5, 50_010.0, 49_850.0, 49_880.0);
        let w = window(&[b.clone()]);
        let pos = position(Side::Buy, 49_900.0);

        assert_eq!(evaluate(&cfg, &pos, &b, &w, 40.0, t0() + Duration::seconds(30), false), None);
        assert_eq!(
            evaluate(&cfg, &pos, &b, &w, 40.0, t0() + Duration::minutes(3), false),
            Some(ExitReason::StopLoss)
        );
    }
}
