use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{Bar, OrderRequest, Result, TradeRecord, TradeSummary};

/// What to ask a bar source for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Feed interval identifier, e.g. `"5minute"`.
    pub interval: String,
}

/// Supplier of OHLC bars, live or historical.
///
/// Implementations return bars sorted by timestamp with duplicate timestamps
/// removed (first occurrence kept). The engine never knows which one it has.
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>>;
}

/// Broker order placement. Only `OrderExecutor` in `crates/engine` holds one,
/// and only outside paper mode.
#[async_trait]
pub trait OrderPlacer: Send + Sync {
    /// Submit an order and return the broker's order id.
    async fn place_order(&self, order: &OrderRequest) -> Result<String>;
}

/// Persistent trade log.
///
/// Writes from the engine are best-effort: a failure is logged by the caller
/// and never unwinds the decision loop.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn record(&self, record: &TradeRecord) -> Result<()>;

    /// Remove every trade record. Used at startup for run isolation.
    async fn truncate(&self) -> Result<()>;

    async fn summary(&self) -> Result<TradeSummary>;

    /// Sum of PnL over records whose trade time falls on `date`.
    async fn pnl_for_day(&self, date: NaiveDate) -> Result<f64>;

    /// Copy the day's exited trades into the end-of-day log. Returns rows written.
    async fn populate_daily_log(&self, date: NaiveDate) -> Result<u64>;
}
