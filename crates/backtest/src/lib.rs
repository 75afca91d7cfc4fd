//! Historical replay of the trade lifecycle.

pub mod csv_source;
pub mod export;
pub mod replay;
pub mod stats;

pub use csv_source::CsvBarSource;
pub use export::export_trades_csv;
pub use replay::ReplayDriver;
pub use stats::{BacktestAccumulator, BacktestStats};
