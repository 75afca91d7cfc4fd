use std::sync::Arc;

use tracing::{debug, error, info};

use common::{OrderPlacer, OrderRequest, TradingMode};

/// Forwards orders to the broker outside paper mode.
///
/// This is the ONLY component that calls `OrderPlacer::place_order`. Failures
/// are logged and never change position state.
#[derive(Clone)]
pub struct OrderExecutor {
    placer: Option<Arc<dyn OrderPlacer>>,
    mode: TradingMode,
}

impl OrderExecutor {
    pub fn new(placer: Arc<dyn OrderPlacer>, mode: TradingMode) -> Self {
        Self {
            placer: Some(placer),
            mode,
        }
    }

    /// Executor that never forwards anything.
    pub fn paper() -> Self {
        Self {
            placer: None,
            mode: TradingMode::Paper,
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    /// Submit `order`. Returns the broker order id when one was placed.
    pub async fn submit(&self, order: &OrderRequest) -> Option<String> {
        let placer = match (&self.placer, self.mode) {
            (Some(placer), TradingMode::Live) => placer,
            _ => {
                debug!(side = %order.side, qty = order.quantity, kind = %order.order_type, "Paper mode: order not forwarded");
                return None;
            }
        };

        info!(
            symbol = %order.symbol,
            side = %order.side,
            qty = order.quantity,
            kind = %order.order_type,
            trigger = ?order.trigger_price,
            "Executing order"
        );
        match placer.place_order(order).await {
            Ok(order_id) => {
                info!(%order_id, "Order accepted");
                Some(order_id)
            }
            Err(e) => {
                error!(symbol = %order.symbol, error = %e, "Order submission failed");
                None
            }
        }
    }
}
