use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use backtest::{export_trades_csv, CsvBarSource, ReplayDriver};
use common::{Config, RecordSink, TradingMode};
use engine::{
    EngineConfig, EngineContext, HttpBarSource, KiteOrderClient, LiveDriver, OrderExecutor, TradeManager,
};
use store::SqliteStore;
use strategy::StrategyKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Poll the bar feed and trade the current session.
    Live,
    /// Replay a historical CSV file.
    Backtest,
}

#[derive(Parser)]
#[command(name = "trailbot", about = "Intraday trade lifecycle and risk engine")]
struct Cli {
    #[arg(long, value_enum, default_value = "live")]
    mode: Mode,

    /// Historical bars for backtest mode.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Engine parameters; overrides TRAILBOT_CONFIG.
    #[arg(long)]
    config: Option<String>,

    /// Write the closed trades of a backtest to this CSV file.
    #[arg(long)]
    trades_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let config_path = cli.config.clone().unwrap_or_else(|| cfg.engine_config_path.clone());
    let engine_cfg = EngineConfig::load(&config_path).with_context(|| format!("loading {config_path}"))?;
    info!(mode = ?cli.mode, trading = %cfg.trading_mode, symbol = %engine_cfg.symbol, "Trailbot starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let store = Arc::new(SqliteStore::connect(&cfg.database_url).await.context("opening database")?);
    if cfg.truncate_on_startup {
        store.truncate().await.context("truncating trade records")?;
        info!("Trade records truncated");
    }

    let strategy = StrategyKind::from_config(&engine_cfg.strategy);

    match cli.mode {
        Mode::Backtest => {
            let Some(csv) = cli.csv.as_ref() else {
                bail!("--csv is required in backtest mode");
            };
            // Replays never reach the broker.
            let ctx = EngineContext::new(engine_cfg, store.clone(), OrderExecutor::paper());
            let bars = CsvBarSource::new(csv).load()?;
            let mut driver = ReplayDriver::new(TradeManager::new(ctx), strategy);
            let stats = driver.run(bars).await;

            info!(stats = %serde_json::to_string_pretty(&stats)?, "Backtest statistics");
            match store.summary().await {
                Ok(summary) => info!(
                    total_pnl = summary.total_pnl,
                    trades = summary.total_trades,
                    wins = summary.win_count,
                    losses = summary.loss_count,
                    win_pct = summary.win_pct,
                    last_lots = summary.last_lots,
                    "Trade summary"
                ),
                Err(e) => error!(error = %e, "Failed to read trade summary"),
            }

            if let Some(out) = cli.trades_out.as_ref() {
                std::fs::write(out, export_trades_csv(driver.closed_trades())?)
                    .with_context(|| format!("writing {}", out.display()))?;
                info!(path = %out.display(), "Trades exported");
            }
        }
        Mode::Live => {
            // ── Order executor (injected based on TRADING_MODE) ──────────────
            let executor = match cfg.trading_mode {
                TradingMode::Live => {
                    let (Some(key), Some(token)) = (cfg.broker_api_key.as_ref(), cfg.broker_access_token.as_ref())
                    else {
                        bail!("live trading needs BROKER_API_KEY and BROKER_ACCESS_TOKEN");
                    };
                    info!(url = %cfg.broker_api_url, "Live trading mode: orders go to the broker");
                    let client = KiteOrderClient::new(&cfg.broker_api_url, key, token);
                    OrderExecutor::new(Arc::new(client), TradingMode::Live)
                }
                TradingMode::Paper => {
                    info!("Paper trading mode: orders are logged only");
                    OrderExecutor::paper()
                }
            };

            let ctx = EngineContext::new(engine_cfg, store.clone(), executor);
            let source = Arc::new(HttpBarSource::new(&cfg.bar_source_url));
            let (driver, handle) = LiveDriver::new(TradeManager::new(ctx), source, strategy);
            let mut task = tokio::spawn(driver.run());

            tokio::select! {
                res = &mut task => {
                    let manager = res.context("live driver task failed")?;
                    info!(capital = manager.capital(), "Session finished");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received. Stopping live driver.");
                    handle.stop().await;
                    let manager = task.await.context("live driver task failed")?;
                    info!(capital = manager.capital(), open = manager.is_open(), "Stopped");
                }
            }
            info!(state = %handle.state().await, "Live driver exited");
        }
    }
    Ok(())
}
