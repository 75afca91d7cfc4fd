use serde::{Deserialize, Serialize};

use common::{round2, Side};

/// How transaction costs are charged against a closed trade.
/// One model is used for every trade of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum ChargeModel {
    /// Fixed amount per trade, by entry side.
    Flat {
        #[serde(default = "default_flat_buy")]
        buy: f64,
        #[serde(default = "default_flat_sell")]
        sell: f64,
    },
    /// Exchange-style itemised charges.
    Percentage(PercentageRates),
}

impl Default for ChargeModel {
    fn default() -> Self {
        ChargeModel::Flat {
            buy: default_flat_buy(),
            sell: default_flat_sell(),
        }
    }
}

fn default_flat_buy() -> f64 {
    250.0
}

fn default_flat_sell() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PercentageRates {
    /// Brokerage per leg is `min(brokerage_cap, brokerage_rate * turnover)`.
    pub brokerage_rate: f64,
    pub brokerage_cap: f64,
    /// On the exit leg of SELL trades.
    pub stt_rate: f64,
    /// Applied to brokerage.
    pub gst_rate: f64,
    pub sebi_rate: f64,
    /// On the entry leg of BUY trades.
    pub stamp_rate: f64,
}

impl Default for PercentageRates {
    fn default() -> Self {
        Self {
            brokerage_rate: 0.0003,
            brokerage_cap: 20.0,
            stt_rate: 0.00025,
            gst_rate: 0.18,
            sebi_rate: 0.000001,
            stamp_rate: 0.00003,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeBreakdown {
    pub brokerage: f64,
    pub stt: f64,
    pub gst: f64,
    pub sebi: f64,
    pub stamp: f64,
    pub flat: f64,
}

impl ChargeBreakdown {
    pub fn total(&self) -> f64 {
        self.brokerage + self.stt + self.gst + self.sebi + self.stamp + self.flat
    }
}

impl ChargeModel {
    pub fn charges(&self, side: Side, entry: f64, exit: f64, qty: u32) -> ChargeBreakdown {
        let qty = qty as f64;
        match self {
            ChargeModel::Flat { buy, sell } => ChargeBreakdown {
                flat: match side {
                    Side::Buy => *buy,
                    Side::Sell => *sell,
                },
                ..ChargeBreakdown::default()
            },
            ChargeModel::Percentage(r) => {
                let turnover = (entry + exit) * qty;
                let brokerage = r.brokerage_cap.min(r.brokerage_rate * turnover) * 2.0;
                ChargeBreakdown {
                    brokerage,
                    stt: match side {
                        Side::Sell => r.stt_rate * exit * qty,
                        Side::Buy => 0.0,
                    },
                    gst: r.gst_rate * brokerage,
                    sebi: r.sebi_rate * turnover,
                    stamp: match side {
                        Side::Buy => r.stamp_rate * entry * qty,
                        Side::Sell => 0.0,
                    },
                    flat: 0.0,
                }
            }
        }
    }

    /// Realised PnL after charges, rounded to 2 decimals.
    pub fn net_pnl(&self, side: Side, entry: f64, exit: f64, qty: u32) -> f64 {
        let charges = self.charges(side, entry, exit, qty).total();
        round2(gross_pnl(side, entry, exit, qty) - charges)
    }
}

pub fn gross_pnl(side: Side, entry: f64, exit: f64, qty: u32) -> f64 {
    side.favorable_move(entry, exit) * qty as f64
}
