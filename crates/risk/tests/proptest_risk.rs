use chrono::Duration;
use proptest::prelude::*;

use common::time::parse_timestamp;
use common::Side;
use risk::stops::next_stop;
use risk::{ChargeModel, PositionView, StopConfig};

fn position(side: Side, entry: f64, atr: f64) -> PositionView {
    let sign = side.sign();
    PositionView {
        side,
        entry_price: entry,
        stop_loss: entry - sign * atr,
        target_price: entry + sign * 2.5 * atr,
        entry_time: parse_timestamp("2024-03-04 09:30:00").unwrap(),
    }
}

proptest! {
    /// Feeding any price path through the trailing stop never loosens it.
    #[test]
    fn stop_only_ratchets_in_favour(
        buy in any::<bool>(),
        atr in 5.0f64..150.0,
        steps in prop::collection::vec(-120.0f64..120.0, 1..80),
    ) {
        let cfg = StopConfig::default();
        let side = if buy { Side::Buy } else { Side::Sell };
        let mut pos = position(side, 50_000.0, atr);
        let mut price = pos.entry_price;

        for (i, step) in steps.iter().enumerate() {
            price += step;
            let now = pos.entry_time + Duration::minutes(5 * (i as i64 + 1));
            let before = pos.stop_loss;
            if let Some(adj) = next_stop(&cfg, &pos, now, price, atr) {
                pos.stop_loss = adj.stop;
            }
            match side {
                Side::Buy => prop_assert!(pos.stop_loss >= before),
                Side::Sell => prop_assert!(pos.stop_loss <= before),
            }
        }
    }

    /// Flat charges are exactly the per-side amount off the gross move.
    #[test]
    fn flat_pnl_is_gross_minus_charge(
        entry in 10_000.0f64..60_000.0,
        delta in -500.0f64..500.0,
        qty in 1u32..500,
    ) {
        let model = ChargeModel::default();
        let exit = entry + delta;
        let buy = model.net_pnl(Side::Buy, entry, exit, qty);
        let expected = delta * qty as f64 - 250.0;
        prop_assert!((buy - expected).abs() <= 0.006);
        let sell = model.net_pnl(Side::Sell, entry, exit, qty);
        let expected = -delta * qty as f64 - 100.0;
        prop_assert!((sell - expected).abs() <= 0.006);
    }
}
