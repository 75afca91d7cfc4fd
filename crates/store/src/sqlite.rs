use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

use common::{DailyLogEntry, Error, RecordSink, Result, Side, TradeRecord, TradeSummary};

/// `RecordSink` backed by SQLite. Timestamps are stored as RFC 3339 text in
/// exchange-local offset, so the first ten characters are the trading date.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let store = Self::from_pool(pool).await?;
        info!(url = %database_url, "Database ready");
        Ok(store)
    }

    /// Wrap an existing pool and apply migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("../../migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// End-of-day log rows for `date`.
    pub async fn daily_log(&self, date: NaiveDate) -> Result<Vec<DailyLogEntry>> {
        let rows: Vec<DailyLogRow> = sqlx::query_as(
            "SELECT tr_date, action, entry_price, exit_price, pnl, lots
             FROM trade_log WHERE tr_date = ?1 ORDER BY id",
        )
        .bind(date.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DailyLogRow::into_entry).collect()
    }

    pub async fn record_count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[derive(sqlx::FromRow)]
struct DailyLogRow {
    tr_date: String,
    action: String,
    entry_price: f64,
    exit_price: f64,
    pnl: f64,
    lots: i64,
}

impl DailyLogRow {
    fn into_entry(self) -> Result<DailyLogEntry> {
        let tr_date = NaiveDate::parse_from_str(&self.tr_date, "%Y-%m-%d")
            .map_err(|e| Error::Data(format!("bad trade_log date '{}': {e}", self.tr_date)))?;
        let action = match self.action.as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            other => return Err(Error::Data(format!("bad trade_log action '{other}'"))),
        };
        Ok(DailyLogEntry {
            tr_date,
            action,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            pnl: self.pnl,
            lots: u32::try_from(self.lots).unwrap_or(0),
        })
    }
}

#[async_trait]
impl RecordSink for SqliteStore {
    async fn record(&self, r: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (trade_id, time, side, entry_price, stop_loss, exited, pnl,
                                strategy, metadata, symbol, exit_price, exit_time, lots)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&r.trade_id)
        .bind(r.time.to_rfc3339())
        .bind(r.side.to_string())
        .bind(r.entry_price)
        .bind(r.stop_loss)
        .bind(r.exited)
        .bind(r.pnl)
        .bind(&r.strategy)
        .bind(serde_json::to_string(&r.metadata)?)
        .bind(&r.symbol)
        .bind(r.exit_price)
        .bind(r.exit_time.to_rfc3339())
        .bind(i64::from(r.lots))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn truncate(&self) -> Result<()> {
        sqlx::query("DELETE FROM trades").execute(&self.pool).await?;
        info!("Trade table truncated");
        Ok(())
    }

    async fn summary(&self) -> Result<TradeSummary> {
        let pnls: Vec<f64> = sqlx::query_scalar("SELECT pnl FROM trades WHERE pnl != 0 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let last_lots: Option<i64> =
            sqlx::query_scalar("SELECT lots FROM trades WHERE lots != 0 ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        let last_lots = last_lots.and_then(|l| u32::try_from(l).ok()).unwrap_or(0);
        Ok(TradeSummary::from_pnls(pnls, last_lots))
    }

    async fn pnl_for_day(&self, date: NaiveDate) -> Result<f64> {
        let total: Option<f64> = sqlx::query_scalar("SELECT SUM(pnl) FROM trades WHERE substr(time, 1, 10) = ?1")
            .bind(date.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(total.unwrap_or(0.0))
    }

    async fn populate_daily_log(&self, date: NaiveDate) -> Result<u64> {
        let done = sqlx::query(
            r#"
            INSERT INTO trade_log (tr_date, action, entry_price, exit_price, pnl, lots)
            SELECT substr(exit_time, 1, 10), side, entry_price, exit_price, pnl, lots
            FROM trades WHERE exited = 1 AND substr(time, 1, 10) = ?1
            ORDER BY id
            "#,
        )
        .bind(date.to_string())
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }
}
