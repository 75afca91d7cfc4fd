use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use common::{DailyLogEntry, RecordSink, Result, TradeRecord, TradeSummary};

/// In-process `RecordSink` for backtests and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<TradeRecord>>,
    daily_log: RwLock<Vec<DailyLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<TradeRecord> {
        self.records.read().await.clone()
    }

    pub async fn daily_log(&self) -> Vec<DailyLogEntry> {
        self.daily_log.read().await.clone()
    }
}

#[async_trait]
impl RecordSink for MemoryStore {
    async fn record(&self, record: &TradeRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn truncate(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn summary(&self) -> Result<TradeSummary> {
        let records = self.records.read().await;
        let last_lots = records.iter().rev().find(|r| r.lots != 0).map_or(0, |r| r.lots);
        let pnls = records.iter().map(|r| r.pnl).filter(|p| *p != 0.0);
        Ok(TradeSummary::from_pnls(pnls, last_lots))
    }

    async fn pnl_for_day(&self, date: NaiveDate) -> Result<f64> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.time.date_naive() == date)
            .map(|r| r.pnl)
            .sum())
    }

    async fn populate_daily_log(&self, date: NaiveDate) -> Result<u64> {
        let records = self.records.read().await;
        let rows: Vec<DailyLogEntry> = records
            .iter()
            .filter(|r| r.exited && r.time.date_naive() == date)
            .map(|r| DailyLogEntry {
                tr_date: r.exit_time.date_naive(),
                action: r.side,
                entry_price: r.entry_price,
                exit_price: r.exit_price,
                pnl: r.pnl,
                lots: r.lots,
            })
            .collect();
        let n = rows.len() as u64;
        self.daily_log.write().await.extend(rows);
        Ok(n)
    }
}
