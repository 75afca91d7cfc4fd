pub mod config;
pub mod context;
pub mod executor;
pub mod http_feed;
pub mod kite;
pub mod lifecycle;
pub mod live;
pub mod retry;

pub use config::EngineConfig;
pub use context::EngineContext;
pub use executor::OrderExecutor;
pub use http_feed::HttpBarSource;
pub use kite::KiteOrderClient;
pub use lifecycle::{ClosedTrade, OpenRequest, OpenTrade, PositionState, TradeManager};
pub use live::{CycleOutcome, LiveDriver, LiveHandle};
pub use retry::fetch_with_retry;
