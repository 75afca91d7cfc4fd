use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use common::{round2, Side};

/// Dynamic target parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Multiplier when entry ATR is below the running median.
    pub low_vol_mult: f64,
    pub high_vol_mult: f64,
    /// Used when a bar carries no ATR.
    pub default_atr: f64,
    /// Entry ATRs remembered for the median.
    pub history_len: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            low_vol_mult: 1.8,
            high_vol_mult: 2.5,
            default_atr: 20.0,
            history_len: 500,
        }
    }
}

/// ATR values seen at past entries.
#[derive(Debug, Clone, Default)]
pub struct AtrHistory {
    values: VecDeque<f64>,
    cap: usize,
}

impl AtrHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            values: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, atr: f64) {
        if self.values.len() == self.cap {
            self.values.pop_front();
        }
        self.values.push_back(atr);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Upper median.
    pub fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(sorted[sorted.len() / 2])
    }
}

/// Target for a new entry. Records `atr` in the history before comparing, so
/// the first trade always gets the high-volatility multiplier.
pub fn dynamic_target(cfg: &TargetConfig, history: &mut AtrHistory, side: Side, entry: f64, atr: f64) -> f64 {
    let atr = if atr > 0.0 { atr } else { cfg.default_atr };
    history.push(atr);
    let median = history.median().unwrap_or(atr);
    let mult = if atr < median { cfg.low_vol_mult } else { cfg.high_vol_mult };
    round2(entry + side.sign() * mult * atr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_entry_uses_high_multiplier() {
        let cfg = TargetConfig::default();
        let mut h = AtrHistory::new(cfg.history_len);
        assert_eq!(dynamic_target(&cfg, &mut h, Side::Buy, 50_000.0, 40.0), 50_100.0);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn quiet_entry_gets_closer_target() {
        let cfg = TargetConfig::default();
        let mut h = AtrHistory::new(cfg.history_len);
        h.push(50.0);
        h.push(60.0);
        // history 50, 60, 40: median 50, 40 < 50
        assert_eq!(dynamic_target(&cfg, &mut h, Side::Sell, 50_000.0, 40.0), 49_928.0);
    }

    #[test]
    fn missing_atr_falls_back_to_default() {
        let cfg = TargetConfig::default();
        let mut h = AtrHistory::new(cfg.history_len);
        assert_eq!(dynamic_target(&cfg, &mut h, Side::Buy, 100.0, 0.0), 150.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut h = AtrHistory::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            h.push(v);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.median(), Some(3.0));
    }
}
