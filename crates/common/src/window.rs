use std::collections::VecDeque;

use crate::time::Timestamp;
use crate::Bar;

/// Bounded, strictly time-ordered buffer of the most recent bars.
///
/// Look-back checks (momentum, stall detection, late-session volatility) read
/// from this instead of a shared frame, so every component sees exactly the
/// bars the driver has fed so far.
#[derive(Debug, Clone)]
pub struct BarWindow {
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl BarWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a bar, evicting the oldest when full. A bar that is not
    /// strictly newer than the latest one is ignored and `false` returned.
    pub fn push(&mut self, bar: Bar) -> bool {
        if let Some(last) = self.bars.back() {
            if bar.timestamp <= last.timestamp {
                return false;
            }
        }
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        true
    }

    /// Push every bar in order; returns how many were new.
    pub fn extend(&mut self, bars: impl IntoIterator<Item = Bar>) -> usize {
        let mut added = 0;
        for bar in bars {
            if self.push(bar) {
                added += 1;
            }
        }
        added
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Bar> + ExactSizeIterator {
        self.bars.iter()
    }

    /// The last `n` bars, oldest first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &Bar> {
        self.bars.iter().skip(self.bars.len().saturating_sub(n))
    }

    /// Up to `n` bars strictly before `ts`, oldest first.
    pub fn preceding(&self, ts: Timestamp, n: usize) -> Vec<&Bar> {
        let mut out: Vec<&Bar> = self
            .bars
            .iter()
            .rev()
            .filter(|b| b.timestamp < ts)
            .take(n)
            .collect();
        out.reverse();
        out
    }

    /// Mean of the positive ATR values in the window.
    pub fn mean_atr(&self) -> Option<f64> {
        let (sum, count) = self
            .bars
            .iter()
            .filter(|b| b.atr > 0.0)
            .fold((0.0, 0usize), |(s, c), b| (s + b.atr, c + 1));
        (count > 0).then(|| sum / count as f64)
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_timestamp;
    use std::collections::BTreeMap;

    fn bar(ts: &str, close: f64, atr: f64) -> Bar {
        Bar {
            timestamp: parse_timestamp(ts).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
            atr,
            indicators: BTreeMap::new(),
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut w = BarWindow::new(2);
        w.push(bar("2024-03-04 09:15:00", 1.0, 0.0));
        w.push(bar("2024-03-04 09:20:00", 2.0, 0.0));
        w.push(bar("2024-03-04 09:25:00", 3.0, 0.0));
        let closes: Vec<f64> = w.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![2.0, 3.0]);
    }

    #[test]
    fn stale_and_duplicate_bars_are_ignored() {
        let mut w = BarWindow::new(10);
        assert!(w.push(bar("2024-03-04 09:20:00", 1.0, 0.0)));
        assert!(!w.push(bar("2024-03-04 09:20:00", 9.0, 0.0)));
        assert!(!w.push(bar("2024-03-04 09:15:00", 9.0, 0.0)));
        assert_eq!(w.len(), 1);
        assert_eq!(w.latest().unwrap().close, 1.0);
    }

    #[test]
    fn preceding_returns_bars_before_timestamp_oldest_first() {
        let mut w = BarWindow::new(10);
        for (i, ts) in ["09:15", "09:20", "09:25", "09:30", "09:35"].iter().enumerate() {
            w.push(bar(&format!("2024-03-04 {ts}:00"), i as f64, 0.0));
        }
        let ts = parse_timestamp("2024-03-04 09:35:00").unwrap();
        let prior: Vec<f64> = w.preceding(ts, 3).iter().map(|b| b.close).collect();
        assert_eq!(prior, vec![1.0, 2.0, 3.0]);
        let last: Vec<f64> = w.last_n(2).map(|b| b.close).collect();
        assert_eq!(last, vec![3.0, 4.0]);
    }

    #[test]
    fn mean_atr_skips_missing_values() {
        let mut w = BarWindow::new(10);
        w.push(bar("2024-03-04 09:15:00", 1.0, 0.0));
        w.push(bar("2024-03-04 09:20:00", 1.0, 30.0));
        w.push(bar("2024-03-04 09:25:00", 1.0, 50.0));
        assert_eq!(w.mean_atr(), Some(40.0));
        assert_eq!(BarWindow::new(3).mean_atr(), None);
    }
}
