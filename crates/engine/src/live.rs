use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use common::time::is_market_open;
use common::{BarSource, BarWindow, EngineCommand, EngineState, FetchRequest, Timestamp};
use strategy::{Strategy, StrategyKind};

use crate::lifecycle::TradeManager;
use crate::retry::fetch_with_retry;

/// Wall clock used by the live driver.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Cloneable handle for controlling a running `LiveDriver`.
#[derive(Clone)]
pub struct LiveHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
}

impl LiveHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn stop(&self) {
        self.send(EngineCommand::Stop).await;
    }

    /// Stop opening new positions; an open one is still managed.
    pub async fn pause(&self) {
        self.send(EngineCommand::Pause).await;
    }

    pub async fn resume(&self) {
        self.send(EngineCommand::Resume).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }
}

/// What one poll cycle decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Sleep this long, then poll again.
    Wait(Duration),
    /// The session is over for today.
    Finished,
}

/// Poll loop over a bar source: fetch, manage or enter, sleep, repeat until
/// the session cutoff, the daily loss limit, or a stop command.
pub struct LiveDriver {
    manager: TradeManager,
    source: Arc<dyn BarSource>,
    strategy: StrategyKind,
    window: BarWindow,
    clock: Clock,
    state: Arc<RwLock<EngineState>>,
    command_rx: mpsc::Receiver<EngineCommand>,
    paused: bool,
}

impl LiveDriver {
    pub fn new(manager: TradeManager, source: Arc<dyn BarSource>, strategy: StrategyKind) -> (Self, LiveHandle) {
        let (command_tx, command_rx) = mpsc::channel(8);
        let state = Arc::new(RwLock::new(EngineState::Stopped));
        let window = BarWindow::new(manager.context().config.window_size);

        let handle = LiveHandle {
            command_tx,
            state: state.clone(),
        };
        let driver = LiveDriver {
            manager,
            source,
            strategy,
            window,
            clock: Arc::new(common::time::now),
            state,
            command_rx,
            paused: false,
        };
        (driver, handle)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn manager(&self) -> &TradeManager {
        &self.manager
    }

    /// Run until the session ends or a stop command arrives. Call from
    /// `tokio::spawn`.
    pub async fn run(mut self) -> TradeManager {
        info!(symbol = %self.manager.context().config.symbol, mode = %self.manager.context().mode(), "Live driver started");
        *self.state.write().await = EngineState::Running;

        loop {
            let wait = match self.cycle().await {
                CycleOutcome::Wait(wait) => wait,
                CycleOutcome::Finished => break,
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                cmd = self.command_rx.recv() => {
                    if !self.apply(cmd).await {
                        break;
                    }
                }
            }
        }

        let mut state = self.state.write().await;
        if *state != EngineState::Halted {
            *state = EngineState::Stopped;
        }
        drop(state);
        info!(capital = self.manager.capital(), "Live driver stopped");
        self.manager
    }

    /// Apply a control command. Returns `false` when the loop should end;
    /// a closed channel counts as a stop.
    pub async fn apply(&mut self, cmd: Option<EngineCommand>) -> bool {
        match cmd {
            Some(EngineCommand::Stop) | None => {
                info!("Stop requested; leaving live loop");
                false
            }
            Some(EngineCommand::Pause) => {
                info!("Paused: managing open position only");
                self.paused = true;
                *self.state.write().await = EngineState::Paused;
                true
            }
            Some(EngineCommand::Resume) => {
                info!("Resumed");
                self.paused = false;
                *self.state.write().await = EngineState::Running;
                true
            }
        }
    }

    /// One poll: checks, fetch, decide. Never fails; trouble means waiting.
    pub async fn cycle(&mut self) -> CycleOutcome {
        let now = (self.clock)();
        let cfg = self.manager.context().config.clone();
        let live = &cfg.live;
        let poll = Duration::from_secs(live.poll_interval_secs);

        if !cfg.test_mode
            && !is_market_open(now, cfg.session.market_open, cfg.session.market_close, &cfg.holidays)
        {
            info!("Market closed. Sleeping...");
            return CycleOutcome::Wait(Duration::from_secs(live.closed_poll_secs));
        }

        let today = now.date_naive();
        let sink = self.manager.context().sink.clone();
        let pnl_today = sink.pnl_for_day(today).await.unwrap_or_else(|e| {
            error!(error = %e, "Failed to read today's PnL");
            0.0
        });
        if pnl_today < live.max_daily_loss {
            warn!(pnl_today, limit = live.max_daily_loss, "Daily loss limit breached; trading disabled for today");
            self.finish_day(today).await;
            *self.state.write().await = EngineState::Halted;
            return CycleOutcome::Finished;
        }

        let request = FetchRequest {
            symbol: cfg.symbol.clone(),
            from: today - chrono::Duration::days(live.history_days),
            to: today,
            interval: live.interval.clone(),
        };
        let delay = Duration::from_millis(live.fetch_base_delay_ms);
        let Some(bars) = fetch_with_retry(self.source.as_ref(), &request, live.fetch_retries, delay).await else {
            warn!("No bar data; retrying next cycle");
            return CycleOutcome::Wait(poll);
        };

        // every poll returns the full history, including the forming bar
        self.window.clear();
        self.window.extend(bars);
        if self.window.len() < live.min_bars {
            info!(have = self.window.len(), need = live.min_bars, "Waiting for sufficient data");
            return CycleOutcome::Wait(poll);
        }
        let Some(bar) = self.window.latest().cloned() else {
            return CycleOutcome::Wait(poll);
        };

        let mut wait = poll;
        if self.manager.is_open() {
            self.manager.on_bar(&bar, &self.window, now).await;
        } else if self.manager.in_cooldown(now) {
            info!(minutes = cfg.cooldown_minutes, "In cooldown");
            wait = Duration::from_secs(cfg.cooldown_minutes.max(0) as u64 * 60);
        } else if !self.paused && !self.manager.reached_cutoff(now) {
            let proposal = self.strategy.propose(&bar);
            if proposal.is_actionable() {
                let lots = self.manager.lots_for_capital();
                self.manager.consider(proposal, &self.window, lots, now).await;
            } else {
                info!(reason = %proposal.reason, "No BUY / SELL signal");
            }
        }

        if self.manager.reached_cutoff(now) {
            info!("Session cutoff reached. Populating end-of-day log.");
            self.finish_day(today).await;
            return CycleOutcome::Finished;
        }
        CycleOutcome::Wait(wait)
    }

    async fn finish_day(&mut self, today: chrono::NaiveDate) {
        if let Some(bar) = self.window.latest().cloned() {
            if self.manager.is_open() {
                let now = (self.clock)();
                self.manager.exit(now, bar.close, common::ExitReason::SessionCutoff).await;
            }
        }
        match self.manager.context().sink.populate_daily_log(today).await {
            Ok(rows) => info!(rows, "End-of-day log written"),
            Err(e) => error!(error = %e, "Failed to populate end-of-day log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;
    use crate::executor::OrderExecutor;
    use crate::lifecycle::tests::{bar, test_config, ts};
    use async_trait::async_trait;
    use common::{Bar, RecordSink, Result, Side, TradeRecord};
    use store::MemoryStore;

    /// Serves whatever bars the test last put in it.
    struct StaticSource(std::sync::Mutex<Vec<Bar>>);

    impl StaticSource {
        fn new(bars: Vec<Bar>) -> Self {
            Self(std::sync::Mutex::new(bars))
        }

        fn set(&self, bars: Vec<Bar>) {
            *self.0.lock().unwrap() = bars;
        }
    }

    #[async_trait]
    impl BarSource for StaticSource {
        async fn fetch(&self, _request: &FetchRequest) -> Result<Vec<Bar>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    /// Fifteen rising bullish bars, the last one breaking out of the range.
    fn breakout_bars() -> Vec<Bar> {
        (0..15)
            .map(|i| {
                let open = 50_000.0 + i as f64 * 20.0;
                let at = ts("2024-03-04 09:15:00") + chrono::Duration::minutes(5 * i);
                let mut b = bar("2024-03-04 09:15:00", open, open + 25.0, open - 5.0, open + 20.0, 40.0);
                b.timestamp = at;
                b.indicators.insert("orb_high".into(), 50_100.0);
                b.indicators.insert("orb_low".into(), 49_950.0);
                b
            })
            .collect()
    }

    fn driver(bars: Vec<Bar>, at: &'static str) -> (LiveDriver, LiveHandle, Arc<MemoryStore>) {
        let sink = Arc::new(MemoryStore::new());
        let cfg = test_config();
        let strategy = StrategyKind::from_config(&cfg.strategy);
        let manager = TradeManager::new(EngineContext::new(cfg, sink.clone(), OrderExecutor::paper()));
        let (driver, handle) = LiveDriver::new(manager, Arc::new(StaticSource::new(bars)), strategy);
        let driver = driver.with_clock(Arc::new(move || ts(at)));
        (driver, handle, sink)
    }

    /// A driver whose bars and clock the test moves between cycles.
    fn scripted(bars: Vec<Bar>, at: &str) -> (LiveDriver, Arc<StaticSource>, Arc<std::sync::Mutex<Timestamp>>) {
        let cfg = test_config();
        let strategy = StrategyKind::from_config(&cfg.strategy);
        let manager = TradeManager::new(EngineContext::new(cfg, Arc::new(MemoryStore::new()), OrderExecutor::paper()));
        let source = Arc::new(StaticSource::new(bars));
        let clock = Arc::new(std::sync::Mutex::new(ts(at)));
        let (driver, _) = LiveDriver::new(manager, source.clone(), strategy);
        let reading = clock.clone();
        let driver = driver.with_clock(Arc::new(move || *reading.lock().unwrap()));
        (driver, source, clock)
    }

    #[tokio::test]
    async fn accepted_proposal_opens_a_position() {
        let (mut d, _, sink) = driver(breakout_bars(), "2024-03-04 10:30:00");
        assert_eq!(d.cycle().await, CycleOutcome::Wait(Duration::from_secs(60)));
        let pos = d.manager().position().expect("position opened");
        assert_eq!(pos.side, Side::Buy);
        assert_eq!(pos.entry_price, 50_300.0);
        assert_eq!(sink.records().await.len(), 1);
    }

    #[tokio::test]
    async fn too_little_history_waits() {
        let bars = breakout_bars().into_iter().take(5).collect();
        let (mut d, _, _) = driver(bars, "2024-03-04 10:30:00");
        assert_eq!(d.cycle().await, CycleOutcome::Wait(Duration::from_secs(60)));
        assert!(!d.manager().is_open());
    }

    #[tokio::test]
    async fn closed_market_waits_longer() {
        let (mut d, _, _) = driver(breakout_bars(), "2024-03-03 10:30:00");
        assert_eq!(d.cycle().await, CycleOutcome::Wait(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn daily_loss_limit_halts() {
        let (mut d, handle, sink) = driver(breakout_bars(), "2024-03-04 10:30:00");
        let t = ts("2024-03-04 10:00:00");
        sink.record(&TradeRecord {
            trade_id: "x".into(),
            time: t,
            side: Side::Sell,
            entry_price: 50_000.0,
            stop_loss: 50_100.0,
            exited: true,
            pnl: -6_000.0,
            strategy: "ORB".into(),
            metadata: serde_json::json!({}),
            symbol: "BANKNIFTY".into(),
            exit_price: 50_236.0,
            exit_time: t,
            lots: 1,
        })
        .await
        .unwrap();

        assert_eq!(d.cycle().await, CycleOutcome::Finished);
        assert_eq!(handle.state().await, EngineState::Halted);
        assert_eq!(sink.daily_log().await.len(), 1);
        assert!(!d.manager().is_open());
    }

    #[tokio::test]
    async fn stop_command_ends_the_loop() {
        let (d, handle, _) = driver(breakout_bars(), "2024-03-04 10:30:00");
        let task = tokio::spawn(d.run());
        handle.stop().await;
        let manager = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("driver stopped in time")
            .unwrap();
        assert!(manager.is_open());
        assert_eq!(handle.state().await, EngineState::Stopped);
    }

    #[tokio::test]
    async fn cutoff_finishes_the_session() {
        let (mut d, _, sink) = driver(breakout_bars(), "2024-03-04 15:26:00");
        assert_eq!(d.cycle().await, CycleOutcome::Finished);
        assert!(!d.manager().is_open());
        assert!(sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn trade_times_follow_the_clock_not_the_forming_bar() {
        let (mut d, source, clock) = scripted(breakout_bars(), "2024-03-04 10:30:00");
        d.cycle().await;
        let pos = d.manager().position().cloned().expect("position opened");
        assert_eq!(pos.entry_price, 50_300.0);
        assert_eq!(pos.entry_time, ts("2024-03-04 10:30:00"));
        assert!(pos.stop_loss > 50_100.0);

        // the same forming bar, now trading through the stop
        let mut bars = breakout_bars();
        let last = bars.last_mut().unwrap();
        last.close = 50_100.0;
        last.low = 50_095.0;
        source.set(bars);
        *clock.lock().unwrap() = ts("2024-03-04 10:33:00");

        d.cycle().await;
        assert!(!d.manager().is_open());
        let exit = d.manager().last_exit().unwrap();
        assert_eq!(exit.price, 50_100.0);
        assert_eq!(exit.time, ts("2024-03-04 10:33:00"));
        assert!(d.manager().in_cooldown(ts("2024-03-04 10:47:00")));
        assert!(!d.manager().in_cooldown(ts("2024-03-04 10:48:00")));
    }

    #[tokio::test]
    async fn paused_driver_opens_nothing_until_resumed() {
        let (mut d, handle, sink) = driver(breakout_bars(), "2024-03-04 10:30:00");
        assert!(d.apply(Some(EngineCommand::Pause)).await);
        assert_eq!(handle.state().await, EngineState::Paused);
        d.cycle().await;
        assert!(!d.manager().is_open());
        assert!(sink.records().await.is_empty());

        assert!(d.apply(Some(EngineCommand::Resume)).await);
        assert_eq!(handle.state().await, EngineState::Running);
        d.cycle().await;
        assert_eq!(d.manager().position().map(|p| p.entry_price), Some(50_300.0));
    }

    #[tokio::test]
    async fn pause_still_manages_the_open_position() {
        let (mut d, source, clock) = scripted(breakout_bars(), "2024-03-04 10:30:00");
        d.cycle().await;
        assert!(d.manager().is_open());
        assert!(d.apply(Some(EngineCommand::Pause)).await);

        let mut bars = breakout_bars();
        bars.last_mut().unwrap().close = 50_100.0;
        source.set(bars);
        *clock.lock().unwrap() = ts("2024-03-04 10:33:00");
        d.cycle().await;
        assert!(!d.manager().is_open());
    }

    #[tokio::test]
    async fn stop_or_closed_channel_ends_the_loop() {
        let (mut d, _, _) = driver(breakout_bars(), "2024-03-04 10:30:00");
        assert!(!d.apply(Some(EngineCommand::Stop)).await);
        assert!(!d.apply(None).await);
    }
}
