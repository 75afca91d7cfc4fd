pub mod config;
pub mod error;
pub mod exchange;
pub mod time;
pub mod types;
pub mod window;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{BarSource, FetchRequest, OrderPlacer, RecordSink};
pub use time::Timestamp;
pub use types::*;
pub use window::BarWindow;
