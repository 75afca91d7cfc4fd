use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Prices, stops and PnL are carried at two-decimal precision.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One OHLC bar plus whatever indicator columns the upstream feed computed.
/// Bars are immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    /// Average true range at this bar. `0.0` when the feed has none yet.
    #[serde(default)]
    pub atr: f64,
    /// Extra precomputed fields (`vwap`, `orb_high`, ...).
    #[serde(default)]
    pub indicators: BTreeMap<String, f64>,
}

impl Bar {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Open, high, low and close are all finite numbers.
    pub fn has_finite_prices(&self) -> bool {
        [self.open, self.high, self.low, self.close].iter().all(|v| v.is_finite())
    }

    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied().filter(|v| v.is_finite())
    }
}

/// Sort by timestamp and drop repeated timestamps, keeping the first occurrence.
pub fn normalize_bars(bars: &mut Vec<Bar>) {
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// `+1.0` for BUY, `-1.0` for SELL.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    /// Move from `from` to `to`, positive when it favours this side.
    pub fn favorable_move(self, from: f64, to: f64) -> f64 {
        (to - from) * self.sign()
    }

    /// True when `candidate` is a tighter stop than `current`.
    pub fn is_tighter(self, candidate: f64, current: f64) -> bool {
        match self {
            Side::Buy => candidate > current,
            Side::Sell => candidate < current,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A strategy's suggestion for the current bar. `signal == None` means no trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub timestamp: Timestamp,
    pub signal: Option<Side>,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub strategy: String,
    pub valid: bool,
    pub reason: String,
}

impl TradeProposal {
    pub fn new(
        timestamp: Timestamp,
        side: Side,
        entry: f64,
        stop_loss: f64,
        target: f64,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            signal: Some(side),
            entry,
            stop_loss,
            target,
            strategy: strategy.into(),
            valid: true,
            reason: String::new(),
        }
    }

    /// A proposal that carries no signal.
    pub fn none(timestamp: Timestamp, strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            timestamp,
            signal: None,
            entry: 0.0,
            stop_loss: 0.0,
            target: 0.0,
            strategy: strategy.into(),
            valid: false,
            reason: reason.into(),
        }
    }

    /// Valid, directional and with positive entry and stop.
    pub fn is_actionable(&self) -> bool {
        self.valid && self.signal.is_some() && self.entry > 0.0 && self.stop_loss > 0.0
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.valid = false;
        self.reason = reason.into();
    }
}

/// Where and when the previous trade closed. Survives position resets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastExit {
    pub price: f64,
    pub time: Timestamp,
}

/// One row in the trade record sink. Every state change writes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub time: Timestamp,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub exited: bool,
    pub pnl: f64,
    pub strategy: String,
    pub metadata: serde_json::Value,
    pub symbol: String,
    pub exit_price: f64,
    pub exit_time: Timestamp,
    pub lots: u32,
}

/// Aggregates over all records with non-zero PnL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeSummary {
    pub wins_pnl: f64,
    pub wins_avg: f64,
    pub losses_pnl: f64,
    pub losses_avg: f64,
    pub total_pnl: f64,
    pub total_trades: u64,
    pub win_count: u64,
    pub loss_count: u64,
    pub win_pct: f64,
    /// Lots on the most recent record with a non-zero lot size.
    pub last_lots: u32,
}

impl TradeSummary {
    /// Build from the PnL column and the lots of the latest non-zero-lot row.
    pub fn from_pnls(pnls: impl IntoIterator<Item = f64>, last_lots: u32) -> Self {
        let mut s = TradeSummary {
            last_lots,
            ..TradeSummary::default()
        };
        for pnl in pnls {
            s.total_pnl += pnl;
            if pnl > 0.0 {
                s.wins_pnl += pnl;
                s.win_count += 1;
            } else if pnl < 0.0 {
                s.losses_pnl += pnl;
                s.loss_count += 1;
            }
        }
        s.total_trades = s.win_count + s.loss_count;
        if s.win_count > 0 {
            s.wins_avg = round2(s.wins_pnl / s.win_count as f64);
        }
        if s.loss_count > 0 {
            s.losses_avg = round2(s.losses_pnl / s.loss_count as f64);
        }
        if s.total_trades > 0 {
            s.win_pct = round2(s.win_count as f64 / s.total_trades as f64 * 100.0);
        }
        s.wins_pnl = round2(s.wins_pnl);
        s.losses_pnl = round2(s.losses_pnl);
        s.total_pnl = round2(s.total_pnl);
        s
    }

    pub fn expectancy(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            round2(self.total_pnl / self.total_trades as f64)
        }
    }
}

/// Row of the end-of-day trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLogEntry {
    pub tr_date: NaiveDate,
    pub action: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub lots: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    /// Stop-loss-market: becomes a market order once `trigger_price` trades.
    StopLossMarket,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::StopLossMarket => write!(f, "SL-M"),
        }
    }
}

/// An order handed to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: u32,
    pub order_type: OrderType,
    pub trigger_price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: Side, quantity: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            trigger_price: None,
        }
    }

    /// Stop-loss-market order; the trigger is sent with one decimal.
    pub fn stop_loss_market(symbol: impl Into<String>, side: Side, quantity: u32, trigger: f64) -> Self {
        Self {
            order_type: OrderType::StopLossMarket,
            trigger_price: Some((trigger * 10.0).round() / 10.0),
            ..Self::market(symbol, side, quantity)
        }
    }
}

/// Whether orders reach the broker or are only recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Why the admission filter turned a proposal down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VetoReason {
    InvalidSignal,
    LateSessionLowVolatility { atr: f64, required: f64 },
    InsufficientHistory { have: usize, need: usize },
    WeakMomentum,
    WeakCandleAfterExit,
    SameZoneReentry { distance: f64, zone: f64 },
    NoPullback { moved: f64, required: f64 },
}

impl std::fmt::Display for VetoReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VetoReason::InvalidSignal => write!(f, "not a valid signal"),
            VetoReason::LateSessionLowVolatility { atr, required } => {
                write!(f, "late session: ATR {atr:.2} below {required:.2}")
            }
            VetoReason::InsufficientHistory { have, need } => {
                write!(f, "momentum: {have} prior bars, need {need}")
            }
            VetoReason::WeakMomentum => write!(f, "momentum: prior bars not directional"),
            VetoReason::WeakCandleAfterExit => write!(f, "weak signal candle right after exit"),
            VetoReason::SameZoneReentry { distance, zone } => {
                write!(f, "same-zone re-entry: {distance:.2} from last exit (zone {zone:.2})")
            }
            VetoReason::NoPullback { moved, required } => {
                write!(f, "no pullback: moved {moved:.2} past last exit, need {required:.2}")
            }
        }
    }
}

/// Why an open position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    SessionCutoff,
    StopLoss,
    ProfitStall,
    ProfitRetracement,
    SidewaysStall,
    EndOfData,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::SessionCutoff => write!(f, "session cutoff"),
            ExitReason::StopLoss => write!(f, "stop-loss hit"),
            ExitReason::ProfitStall => write!(f, "profit stall"),
            ExitReason::ProfitRetracement => write!(f, "profit retracement"),
            ExitReason::SidewaysStall => write!(f, "sideways stall"),
            ExitReason::EndOfData => write!(f, "end of data"),
        }
    }
}

/// Current state of the live driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
    Halted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
            EngineState::Halted => write!(f, "halted"),
        }
    }
}

/// Commands sent to the live driver via its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Stop,
    /// Keep managing an open position but take no new entries.
    Pause,
    Resume,
}
