use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Bar, BarWindow, LastExit, Side, Timestamp, TradeProposal, VetoReason};

/// Entry admission parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Prior bars that must all point in the signal's direction.
    pub momentum_bars: usize,
    pub weak_candle_window_mins: i64,
    pub weak_candle_min_range: f64,
    pub weak_candle_body_ratio: f64,
    /// Half-width of the re-entry zone around the last exit, in ATRs.
    pub reentry_zone_atr: f64,
    pub reentry_window_mins: i64,
    /// Required move past the last exit before re-entering, in ATRs.
    pub pullback_atr: f64,
    /// Only require the pullback when the last exit was on the signal's date.
    pub pullback_same_day_only: bool,
    /// From this time on an entry needs elevated volatility. `None` disables the gate.
    pub late_session_after: Option<NaiveTime>,
    pub late_session_atr_ratio: f64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            momentum_bars: 3,
            weak_candle_window_mins: 5,
            weak_candle_min_range: 5.0,
            weak_candle_body_ratio: 0.25,
            reentry_zone_atr: 0.5,
            reentry_window_mins: 15,
            pullback_atr: 0.5,
            pullback_same_day_only: false,
            late_session_after: NaiveTime::from_hms_opt(14, 30, 0),
            late_session_atr_ratio: 1.2,
        }
    }
}

/// What the filter may look at besides the proposal itself.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionContext<'a> {
    /// Recent bars, including the signal bar.
    pub window: &'a BarWindow,
    pub last_exit: Option<LastExit>,
    pub atr: f64,
}

/// Run every check and mark the proposal invalid on the first failure.
/// Returns whether the proposal survived.
pub fn admit(cfg: &AdmissionConfig, proposal: &mut TradeProposal, ctx: &AdmissionContext<'_>) -> bool {
    match check(cfg, proposal, ctx) {
        Ok(()) => true,
        Err(veto) => {
            debug!(strategy = %proposal.strategy, reason = %veto, "Proposal vetoed");
            proposal.reject(veto.to_string());
            false
        }
    }
}

pub fn check(cfg: &AdmissionConfig, proposal: &TradeProposal, ctx: &AdmissionContext<'_>) -> Result<(), VetoReason> {
    let side = match proposal.signal {
        Some(side) if proposal.is_actionable() => side,
        _ => return Err(VetoReason::InvalidSignal),
    };
    let ts = proposal.timestamp;

    late_session(cfg, ts, ctx)?;
    momentum(cfg, side, ts, ctx.window)?;

    let Some(last) = ctx.last_exit else {
        return Ok(());
    };

    if ts - last.time < Duration::minutes(cfg.weak_candle_window_mins) {
        if let Some(bar) = signal_bar(ctx.window, ts) {
            let range = bar.range();
            if range < cfg.weak_candle_min_range || bar.body() < cfg.weak_candle_body_ratio * range {
                return Err(VetoReason::WeakCandleAfterExit);
            }
        }
    }

    if in_reentry_zone(cfg, proposal.entry, ts, &last, ctx.atr) {
        return Err(VetoReason::SameZoneReentry {
            distance: (proposal.entry - last.price).abs(),
            zone: cfg.reentry_zone_atr * ctx.atr,
        });
    }

    if !cfg.pullback_same_day_only || last.time.date_naive() == ts.date_naive() {
        let moved = side.favorable_move(last.price, proposal.entry);
        let required = cfg.pullback_atr * ctx.atr;
        if moved < required {
            return Err(VetoReason::NoPullback { moved, required });
        }
    }
    Ok(())
}

/// Close to the last exit in both price and time.
pub fn in_reentry_zone(cfg: &AdmissionConfig, price: f64, now: Timestamp, last: &LastExit, atr: f64) -> bool {
    (price - last.price).abs() < cfg.reentry_zone_atr * atr
        && now - last.time < Duration::minutes(cfg.reentry_window_mins)
}

fn late_session(cfg: &AdmissionConfig, ts: Timestamp, ctx: &AdmissionContext<'_>) -> Result<(), VetoReason> {
    let Some(after) = cfg.late_session_after else {
        return Ok(());
    };
    if ts.time() < after {
        return Ok(());
    }
    if let Some(mean) = ctx.window.mean_atr() {
        let required = cfg.late_session_atr_ratio * mean;
        if ctx.atr < required {
            return Err(VetoReason::LateSessionLowVolatility { atr: ctx.atr, required });
        }
    }
    Ok(())
}

fn momentum(cfg: &AdmissionConfig, side: Side, ts: Timestamp, window: &BarWindow) -> Result<(), VetoReason> {
    if cfg.momentum_bars == 0 {
        return Ok(());
    }
    let prior = window.preceding(ts, cfg.momentum_bars);
    if prior.len() < cfg.momentum_bars {
        return Err(VetoReason::InsufficientHistory {
            have: prior.len(),
            need: cfg.momentum_bars,
        });
    }
    let directional = prior.iter().all(|b| match side {
        Side::Buy => b.is_bullish(),
        Side::Sell => b.is_bearish(),
    });
    let monotone = prior
        .windows(2)
        .all(|w| side.favorable_move(w[0].close, w[1].close) > 0.0);
    if directional && monotone {
        Ok(())
    } else {
        Err(VetoReason::WeakMomentum)
    }
}

fn signal_bar(window: &BarWindow, ts: Timestamp) -> Option<&Bar> {
    window.iter().rev().find(|b| b.timestamp == ts)
}
