use std::sync::Arc;

use tracing::error;

use common::{RecordSink, TradeRecord, TradingMode};

use crate::config::EngineConfig;
use crate::executor::OrderExecutor;

/// Everything the trade manager needs from the outside world, handed over
/// once at construction.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub sink: Arc<dyn RecordSink>,
    pub executor: OrderExecutor,
}

impl EngineContext {
    pub fn new(config: EngineConfig, sink: Arc<dyn RecordSink>, executor: OrderExecutor) -> Self {
        Self {
            config: Arc::new(config),
            sink,
            executor,
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.executor.mode()
    }

    /// Best-effort write; a failure is logged and otherwise ignored.
    pub async fn persist(&self, record: &TradeRecord) {
        if let Err(e) = self.sink.record(record).await {
            error!(trade_id = %record.trade_id, error = %e, "Failed to record trade");
        }
    }
}
