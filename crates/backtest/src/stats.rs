use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use common::round2;
use engine::ClosedTrade;

/// Running totals over closed trades, updated once per exit.
#[derive(Debug, Clone, Default)]
pub struct BacktestAccumulator {
    trades: u64,
    wins: u64,
    losses: u64,
    win_sum: f64,
    loss_sum: f64,
    cumulative_pnl: f64,
    peak_pnl: f64,
    max_drawdown: f64,
    lots_history: Vec<u32>,
    daily: BTreeMap<NaiveDate, f64>,
    monthly: BTreeMap<String, f64>,
}

impl BacktestAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one closed trade and the lot size sized for the next one.
    pub fn record(&mut self, trade: &ClosedTrade, next_lots: u32) {
        self.trades += 1;
        if trade.pnl > 0.0 {
            self.wins += 1;
            self.win_sum += trade.pnl;
        } else {
            self.losses += 1;
            self.loss_sum += trade.pnl;
        }
        self.cumulative_pnl += trade.pnl;
        self.peak_pnl = self.peak_pnl.max(self.cumulative_pnl);
        self.max_drawdown = self.max_drawdown.max(self.peak_pnl - self.cumulative_pnl);
        self.lots_history.push(next_lots);

        let day = trade.exit_time.date_naive();
        *self.daily.entry(day).or_default() += trade.pnl;
        *self.monthly.entry(day.format("%Y-%m").to_string()).or_default() += trade.pnl;
    }

    pub fn trades(&self) -> u64 {
        self.trades
    }

    pub fn cumulative_pnl(&self) -> f64 {
        round2(self.cumulative_pnl)
    }

    pub fn finish(&self, final_capital: f64, final_lots: u32) -> BacktestStats {
        let avg = |sum: f64, n: u64| if n == 0 { 0.0 } else { round2(sum / n as f64) };
        BacktestStats {
            trades: self.trades,
            wins: self.wins,
            losses: self.losses,
            win_rate: if self.trades == 0 {
                0.0
            } else {
                round2(self.wins as f64 / self.trades as f64 * 100.0)
            },
            avg_win: avg(self.win_sum, self.wins),
            avg_loss: avg(self.loss_sum, self.losses),
            expectancy: avg(self.cumulative_pnl, self.trades),
            cumulative_pnl: round2(self.cumulative_pnl),
            max_drawdown: round2(self.max_drawdown),
            final_capital: round2(final_capital),
            final_lots,
            lots_history: self.lots_history.clone(),
            daily_pnl: self.daily.iter().map(|(d, p)| (*d, round2(*p))).collect(),
            monthly_pnl: self.monthly.iter().map(|(m, p)| (m.clone(), round2(*p))).collect(),
        }
    }
}

/// Result of one replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestStats {
    pub trades: u64,
    pub wins: u64,
    /// Break-even trades count as losses.
    pub losses: u64,
    /// Percent.
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Mean PnL per trade.
    pub expectancy: f64,
    pub cumulative_pnl: f64,
    /// Largest peak-to-trough fall of cumulative PnL.
    pub max_drawdown: f64,
    pub final_capital: f64,
    pub final_lots: u32,
    pub lots_history: Vec<u32>,
    pub daily_pnl: BTreeMap<NaiveDate, f64>,
    pub monthly_pnl: BTreeMap<String, f64>,
}
