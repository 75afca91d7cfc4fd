use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::{debug, error, info};

use common::{Bar, BarWindow, ExitReason};
use engine::{ClosedTrade, TradeManager};
use strategy::{Strategy, StrategyKind};

use crate::stats::{BacktestAccumulator, BacktestStats};

/// Feeds historical bars through a `TradeManager` in order, with no sleeping.
///
/// Bars outside `[entry_start, cutoff]` still enter the look-back window but
/// are not traded. Lots are re-sized from capital after every exit.
pub struct ReplayDriver {
    manager: TradeManager,
    strategy: StrategyKind,
    window: BarWindow,
    lots: u32,
    acc: BacktestAccumulator,
    closed: Vec<ClosedTrade>,
    traded_days: BTreeSet<NaiveDate>,
}

impl ReplayDriver {
    pub fn new(manager: TradeManager, strategy: StrategyKind) -> Self {
        let window = BarWindow::new(manager.context().config.window_size);
        let lots = manager.lots_for_capital();
        Self {
            manager,
            strategy,
            window,
            lots,
            acc: BacktestAccumulator::new(),
            closed: Vec::new(),
            traded_days: BTreeSet::new(),
        }
    }

    pub fn manager(&self) -> &TradeManager {
        &self.manager
    }

    /// Every trade closed so far, in exit order.
    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed
    }

    pub async fn run(&mut self, bars: impl IntoIterator<Item = Bar>) -> BacktestStats {
        let session = self.manager.context().config.session.clone();
        info!(
            strategy = self.strategy.name(),
            capital = self.manager.capital(),
            lots = self.lots,
            "Backtest started"
        );

        let mut current_day: Option<NaiveDate> = None;
        let mut trades_today = 0u32;
        let mut last_bar: Option<Bar> = None;

        for bar in bars {
            if !self.window.push(bar.clone()) {
                debug!(ts = %bar.timestamp, "Out-of-order bar skipped");
                continue;
            }
            let t = bar.timestamp.time();
            if t < session.entry_start || t > session.cutoff {
                continue;
            }

            let day = bar.timestamp.date_naive();
            if current_day != Some(day) {
                if let Some(prev) = last_bar.take() {
                    if self.manager.is_open() {
                        let closed = self.manager.exit(prev.timestamp, prev.close, ExitReason::SessionCutoff).await;
                        self.settle(closed);
                    }
                }
                if let Some(prev_day) = current_day {
                    debug!(day = %prev_day, trades = trades_today, "Day complete");
                }
                current_day = Some(day);
                trades_today = 0;
            }
            last_bar = Some(bar.clone());

            if self.manager.is_open() {
                let closed = self.manager.on_bar(&bar, &self.window, bar.timestamp).await;
                self.settle(closed);
            } else if !self.manager.in_cooldown(bar.timestamp) && !self.manager.reached_cutoff(bar.timestamp) {
                let proposal = self.strategy.propose(&bar);
                if proposal.is_actionable() && self.manager.consider(proposal, &self.window, self.lots, bar.timestamp).await {
                    trades_today += 1;
                }
            }
        }

        if let Some(bar) = last_bar {
            if self.manager.is_open() {
                let closed = self.manager.exit(bar.timestamp, bar.close, ExitReason::EndOfData).await;
                self.settle(closed);
            }
        }

        let sink = self.manager.context().sink.clone();
        for day in &self.traded_days {
            if let Err(e) = sink.populate_daily_log(*day).await {
                error!(day = %day, error = %e, "Failed to populate end-of-day log");
            }
        }

        let stats = self.acc.finish(self.manager.capital(), self.lots);
        info!(
            trades = stats.trades,
            win_rate = stats.win_rate,
            pnl = stats.cumulative_pnl,
            final_capital = stats.final_capital,
            final_lots = stats.final_lots,
            "Backtest finished"
        );
        stats
    }

    fn settle(&mut self, closed: Option<ClosedTrade>) {
        let Some(trade) = closed else {
            return;
        };
        self.lots = self.manager.lots_for_capital();
        self.acc.record(&trade, self.lots);
        self.traded_days.insert(trade.exit_time.date_naive());
        self.closed.push(trade);
    }
}
