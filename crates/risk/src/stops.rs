use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{round2, Side, Timestamp};

use crate::PositionView;

/// Trailing stop-loss parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StopConfig {
    /// No trailing until the trade is this old.
    pub min_age_secs: i64,
    /// Price within this many ATRs of the target counts as near target.
    pub near_target_atr: f64,
    /// Near target, the stop snaps to this distance behind price.
    pub near_target_offset: f64,
    /// Primary trail distance in ATRs.
    pub trail_atr_mult: f64,
    /// Past this age the fallback distance is capped at `aged_fallback_cap`.
    pub aged_after_secs: i64,
    pub aged_fallback_cap: f64,
    /// Smallest stop change that is applied.
    pub min_step: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            min_age_secs: 120,
            near_target_atr: 0.5,
            near_target_offset: 10.0,
            trail_atr_mult: 0.6,
            aged_after_secs: 1800,
            aged_fallback_cap: 50.0,
            min_step: 0.01,
        }
    }
}

/// Which rule produced a stop move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailRule {
    NearTarget,
    Primary,
    Fallback,
}

impl std::fmt::Display for TrailRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrailRule::NearTarget => write!(f, "near target"),
            TrailRule::Primary => write!(f, "atr trail"),
            TrailRule::Fallback => write!(f, "fallback trail"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopAdjustment {
    pub stop: f64,
    pub rule: TrailRule,
}

/// Candidate stop for the current price, before the ratchet guard.
/// First matching rule wins.
pub fn candidate_stop(
    cfg: &StopConfig,
    pos: &PositionView,
    now: Timestamp,
    price: f64,
    atr: f64,
) -> Option<(f64, TrailRule)> {
    if atr <= 0.0 {
        return None;
    }
    let age = pos.age_secs(now);
    if age < cfg.min_age_secs {
        return None;
    }
    let sign = pos.side.sign();

    if (price - pos.target_price).abs() <= cfg.near_target_atr * atr {
        return Some((price - sign * cfg.near_target_offset, TrailRule::NearTarget));
    }

    if pos.side.favorable_move(pos.entry_price, price) < atr {
        return None;
    }

    let primary = price - sign * atr * cfg.trail_atr_mult;
    if pos.side.is_tighter(primary, pos.stop_loss) {
        return Some((primary, TrailRule::Primary));
    }

    let distance = if age > cfg.aged_after_secs {
        cfg.aged_fallback_cap.min(atr)
    } else {
        atr
    };
    let fallback = price - sign * distance;
    if pos.side.is_tighter(fallback, pos.stop_loss) {
        return Some((fallback, TrailRule::Fallback));
    }
    None
}

/// The stop may only tighten. Returns the rounded candidate when it is
/// strictly better than `current` by at least `min_step`.
pub fn ratchet(side: Side, current: f64, candidate: f64, min_step: f64) -> Option<f64> {
    let candidate = round2(candidate);
    if (candidate - current).abs() + 1e-9 < min_step {
        return None;
    }
    side.is_tighter(candidate, current).then_some(candidate)
}

/// Next stop for an open position, or `None` when it stays where it is.
pub fn next_stop(
    cfg: &StopConfig,
    pos: &PositionView,
    now: Timestamp,
    price: f64,
    atr: f64,
) -> Option<StopAdjustment> {
    let (raw, rule) = candidate_stop(cfg, pos, now, price, atr)?;
    match ratchet(pos.side, pos.stop_loss, raw, cfg.min_step) {
        Some(stop) => Some(StopAdjustment { stop, rule }),
        None => {
            debug!(current = pos.stop_loss, candidate = raw, %rule, "Stop candidate dropped by ratchet");
            None
        }
    }
}
