use common::{Error, Result};
use engine::ClosedTrade;

/// Trade tape as CSV, one row per closed trade.
pub fn export_trades_csv(trades: &[ClosedTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let csv_err = |e: csv::Error| Error::Data(format!("CSV write: {e}"));

    wtr.write_record([
        "trade_id",
        "side",
        "strategy",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "lots",
        "pnl",
        "reason",
    ])
    .map_err(csv_err)?;

    for t in trades {
        wtr.write_record([
            t.trade_id.as_str(),
            &t.side.to_string(),
            &t.strategy,
            &t.entry_time.to_rfc3339(),
            &format!("{:.2}", t.entry_price),
            &t.exit_time.to_rfc3339(),
            &format!("{:.2}", t.exit_price),
            &t.lots.to_string(),
            &format!("{:.2}", t.pnl),
            &t.reason.to_string(),
        ])
        .map_err(csv_err)?;
    }

    let data = wtr
        .into_inner()
        .map_err(|e| Error::Data(format!("flush CSV writer: {e}")))?;
    String::from_utf8(data).map_err(|e| Error::Data(format!("CSV output is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::time::parse_timestamp;
    use common::{ExitReason, Side};

    #[test]
    fn writes_header_and_rows() {
        let t = parse_timestamp("2024-03-04 10:00:00").unwrap();
        let trade = ClosedTrade {
            trade_id: "abc".into(),
            side: Side::Sell,
            strategy: "VWAP_REV".into(),
            entry_price: 50_000.0,
            exit_price: 49_900.0,
            entry_time: t,
            exit_time: t,
            lots: 2,
            pnl: 4_900.0,
            reason: ExitReason::ProfitStall,
        };
        let out = export_trades_csv(&[trade]).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("trade_id,side,strategy"));
        assert!(lines[1].contains(",49900.00,2,4900.00,profit stall"));
    }
}
