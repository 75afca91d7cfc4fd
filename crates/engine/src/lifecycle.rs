use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{
    round2, Bar, BarWindow, ExitReason, LastExit, OrderRequest, Side, Timestamp, TradeProposal,
    TradeRecord,
};
use risk::admission::{self, AdmissionContext};
use risk::stops::{self, StopAdjustment};
use risk::targets::{dynamic_target, AtrHistory};
use risk::{exits, PositionView};

use crate::context::EngineContext;

/// The fields of a live trade. Present only while a position is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenTrade {
    pub trade_id: String,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target_price: f64,
    pub entry_time: Timestamp,
    pub lots: u32,
    pub strategy: String,
    pub last_stop_update: Option<Timestamp>,
}

impl OpenTrade {
    pub fn view(&self) -> PositionView {
        PositionView {
            side: self.side,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            target_price: self.target_price,
            entry_time: self.entry_time,
        }
    }
}

/// The single position slot. `open` is reset on exit; `last_exit` survives.
#[derive(Debug, Clone, Default)]
pub struct PositionState {
    pub open: Option<OpenTrade>,
    pub last_exit: Option<LastExit>,
}

/// What `open` needs to start a trade.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Entry time, from the driver's clock.
    pub timestamp: Timestamp,
    pub side: Side,
    pub price: f64,
    pub stop_loss: f64,
    pub strategy: String,
    pub requested_lots: u32,
    pub atr: f64,
}

/// Outcome of a completed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub trade_id: String,
    pub side: Side,
    pub strategy: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: Timestamp,
    pub exit_time: Timestamp,
    pub lots: u32,
    pub pnl: f64,
    pub reason: ExitReason,
}

/// Owns the position and drives it through open, monitor and close.
///
/// Both drivers hold exactly one of these. Records are written through the
/// context's sink, best-effort; the in-memory state is authoritative.
pub struct TradeManager {
    ctx: EngineContext,
    state: PositionState,
    capital: f64,
    atr_history: AtrHistory,
}

impl TradeManager {
    pub fn new(ctx: EngineContext) -> Self {
        let capital = ctx.config.sizing.initial_capital;
        let history_len = ctx.config.risk.targets.history_len;
        Self {
            ctx,
            state: PositionState::default(),
            capital,
            atr_history: AtrHistory::new(history_len),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn is_open(&self) -> bool {
        self.state.open.is_some()
    }

    pub fn position(&self) -> Option<&OpenTrade> {
        self.state.open.as_ref()
    }

    pub fn last_exit(&self) -> Option<LastExit> {
        self.state.last_exit
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    /// Lots the current capital supports, within `[1, max_lots]`.
    pub fn lots_for_capital(&self) -> u32 {
        let sizing = &self.ctx.config.sizing;
        let by_capital = (self.capital / sizing.capital_per_lot).floor();
        if !by_capital.is_finite() || by_capital < 1.0 {
            1
        } else {
            (by_capital as u64).min(u64::from(sizing.max_lots)) as u32
        }
    }

    pub fn in_cooldown(&self, now: Timestamp) -> bool {
        match self.state.last_exit {
            Some(last) => now - last.time < Duration::minutes(self.ctx.config.cooldown_minutes),
            None => false,
        }
    }

    pub fn reached_cutoff(&self, now: Timestamp) -> bool {
        !self.ctx.config.test_mode && now.time() >= self.ctx.config.session.cutoff
    }

    fn quantity(&self, lots: u32) -> u32 {
        self.ctx.config.lot_size.saturating_mul(lots)
    }

    /// Run the admission filter on `proposal` and open a position if it
    /// survives, stamped at `now`. Returns whether a position was opened.
    pub async fn consider(
        &mut self,
        mut proposal: TradeProposal,
        window: &BarWindow,
        requested_lots: u32,
        now: Timestamp,
    ) -> bool {
        let atr = window
            .iter()
            .rev()
            .find(|b| b.timestamp == proposal.timestamp)
            .map_or(0.0, |b| b.atr);
        let ctx = AdmissionContext {
            window,
            last_exit: self.state.last_exit,
            atr,
        };
        if !admission::admit(&self.ctx.config.risk.admission, &mut proposal, &ctx) {
            info!(strategy = %proposal.strategy, reason = %proposal.reason, "Signal rejected");
            return false;
        }
        let Some(side) = proposal.signal else {
            return false;
        };
        self.open(OpenRequest {
            timestamp: now,
            side,
            price: proposal.entry,
            stop_loss: proposal.stop_loss,
            strategy: proposal.strategy,
            requested_lots,
            atr,
        })
        .await
    }

    /// Open a position. A no-op returning `false` when one is already open or
    /// when the price is back in the zone of the last exit too soon.
    pub async fn open(&mut self, req: OpenRequest) -> bool {
        if let Some(current) = &self.state.open {
            warn!(trade_id = %current.trade_id, "Open requested while a position is open; ignoring");
            return false;
        }
        if !(req.price.is_finite() && req.stop_loss.is_finite()) {
            warn!(price = req.price, stop = req.stop_loss, "Open requested at a non-finite price; ignoring");
            return false;
        }
        let cfg = &self.ctx.config;
        if let Some(last) = &self.state.last_exit {
            if admission::in_reentry_zone(&cfg.risk.admission, req.price, req.timestamp, last, req.atr) {
                info!(price = req.price, last_exit = last.price, "Same-zone re-entry blocked");
                return false;
            }
        }

        let lots = req.requested_lots.clamp(1, self.lots_for_capital());
        let target = dynamic_target(&cfg.risk.targets, &mut self.atr_history, req.side, req.price, req.atr);
        let trade = OpenTrade {
            trade_id: Uuid::new_v4().to_string(),
            side: req.side,
            entry_price: round2(req.price),
            stop_loss: round2(req.stop_loss),
            target_price: target,
            entry_time: req.timestamp,
            lots,
            strategy: req.strategy,
            last_stop_update: None,
        };
        info!(
            trade_id = %trade.trade_id,
            side = %trade.side,
            entry = trade.entry_price,
            stop = trade.stop_loss,
            target = trade.target_price,
            lots,
            "Placing order"
        );

        let record = self.record_for(&trade, req.timestamp, json!({ "event": "order placed", "target": target, "atr": req.atr }));
        let order = OrderRequest::stop_loss_market(&cfg.symbol, trade.side, self.quantity(lots), trade.stop_loss);
        self.state.open = Some(trade);
        self.ctx.persist(&record).await;
        self.ctx.executor.submit(&order).await;
        true
    }

    /// Close the open position at `price`. `None` when flat.
    pub async fn exit(&mut self, now: Timestamp, price: f64, reason: ExitReason) -> Option<ClosedTrade> {
        if !price.is_finite() {
            warn!(price, %reason, "Exit requested at a non-finite price; ignoring");
            return None;
        }
        let Some(trade) = self.state.open.take() else {
            warn!(%reason, "Exit requested with no open position; ignoring");
            return None;
        };
        let qty = self.quantity(trade.lots);
        let pnl = self.ctx.config.risk.charges.net_pnl(trade.side, trade.entry_price, price, qty);
        self.capital = round2(self.capital + pnl);
        self.state.last_exit = Some(LastExit { price, time: now });

        info!(
            trade_id = %trade.trade_id,
            side = %trade.side,
            entry = trade.entry_price,
            exit = price,
            pnl,
            capital = self.capital,
            %reason,
            "Position closed"
        );

        let mut record = self.record_for(&trade, now, json!({ "event": "exited", "reason": reason.to_string() }));
        record.exited = true;
        record.pnl = pnl;
        record.exit_price = price;
        record.exit_time = now;
        self.ctx.persist(&record).await;

        let order = OrderRequest::market(&self.ctx.config.symbol, trade.side.opposite(), qty);
        self.ctx.executor.submit(&order).await;

        Some(ClosedTrade {
            trade_id: trade.trade_id,
            side: trade.side,
            strategy: trade.strategy,
            entry_price: trade.entry_price,
            exit_price: price,
            entry_time: trade.entry_time,
            exit_time: now,
            lots: trade.lots,
            pnl,
            reason,
        })
    }

    /// Move the stop if the trailing rules allow it.
    pub async fn trail_stop(&mut self, now: Timestamp, price: f64, atr: f64) -> Option<StopAdjustment> {
        let trade = self.state.open.as_mut()?;
        let adj = stops::next_stop(&self.ctx.config.risk.stops, &trade.view(), now, price, atr)?;
        let previous = trade.stop_loss;
        trade.stop_loss = adj.stop;
        trade.last_stop_update = Some(now);
        info!(trade_id = %trade.trade_id, from = previous, to = adj.stop, rule = %adj.rule, "Stop-loss adjusted");

        let trade = trade.clone();
        let record = self.record_for(
            &trade,
            now,
            json!({ "event": "SL adjusted", "from": previous, "rule": adj.rule.to_string(), "price": price }),
        );
        self.ctx.persist(&record).await;
        Some(adj)
    }

    /// Manage the open position on a new bar: cutoff, trailing stop, then
    /// the exit rules. `window` must already contain `bar`. `now` is the
    /// driver's clock: the bar time in replay, the wall clock in live. It
    /// decides cutoff and position age and stamps any stop move or exit.
    pub async fn on_bar(&mut self, bar: &Bar, window: &BarWindow, now: Timestamp) -> Option<ClosedTrade> {
        if !self.is_open() {
            return None;
        }
        if self.reached_cutoff(now) {
            return self.exit(now, bar.close, ExitReason::SessionCutoff).await;
        }

        self.trail_stop(now, bar.close, bar.atr).await;

        let view = self.state.open.as_ref()?.view();
        match exits::evaluate(&self.ctx.config.risk.exits, &view, bar, window, bar.atr, now, false) {
            Some(reason) => self.exit(now, bar.close, reason).await,
            None => {
                debug!(close = bar.close, stop = view.stop_loss, "Position held");
                None
            }
        }
    }

    fn record_for(&self, trade: &OpenTrade, time: Timestamp, metadata: serde_json::Value) -> TradeRecord {
        TradeRecord {
            trade_id: trade.trade_id.clone(),
            time,
            side: trade.side,
            entry_price: trade.entry_price,
            stop_loss: trade.stop_loss,
            exited: false,
            pnl: 0.0,
            strategy: trade.strategy.clone(),
            metadata,
            symbol: self.ctx.config.symbol.clone(),
            exit_price: 0.0,
            exit_time: time,
            lots: trade.lots,
        }
    }
}
