//! Decision components of the trade lifecycle.
//!
//! Everything in here is a pure function of its inputs: the engine owns the
//! position and feeds these a read-only [`PositionView`], then applies what
//! comes back.

pub mod admission;
pub mod charges;
pub mod exits;
pub mod stops;
pub mod targets;

use serde::{Deserialize, Serialize};

use common::{Side, Timestamp};

pub use admission::{AdmissionConfig, AdmissionContext};
pub use charges::{ChargeBreakdown, ChargeModel};
pub use exits::ExitConfig;
pub use stops::{StopAdjustment, StopConfig, TrailRule};
pub use targets::{AtrHistory, TargetConfig};

/// All risk parameters, one TOML table per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskConfig {
    pub stops: StopConfig,
    pub exits: ExitConfig,
    pub admission: AdmissionConfig,
    pub charges: ChargeModel,
    pub targets: TargetConfig,
}

/// Read-only view of an open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionView {
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target_price: f64,
    pub entry_time: Timestamp,
}

impl PositionView {
    pub fn age_secs(&self, now: Timestamp) -> i64 {
        (now - self.entry_time).num_seconds()
    }
}
