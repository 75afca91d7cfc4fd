use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use common::time::parse_timestamp;
use common::{normalize_bars, Bar, BarSource, Error, FetchRequest, Result};

/// Bars from an HTTP endpoint serving `GET /historical_data` as a JSON
/// array of candles: a broker proxy or the local market simulator.
pub struct HttpBarSource {
    base_url: String,
    http: Client,
}

impl HttpBarSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    #[serde(alias = "datetime", alias = "timestamp")]
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// Decode a candle payload into sorted, de-duplicated bars. Numeric extra
/// fields become indicators; `atr`/`ATR` fills the ATR slot.
pub fn bars_from_json(body: &str) -> Result<Vec<Bar>> {
    let rows: Vec<CandleRow> = serde_json::from_str(body)?;
    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let timestamp = match parse_timestamp(&row.date) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = %e, "Skipping candle");
                continue;
            }
        };
        let mut atr = 0.0;
        let mut indicators = std::collections::BTreeMap::new();
        for (key, value) in row.extra {
            let Some(v) = value.as_f64() else { continue };
            if key.eq_ignore_ascii_case("atr") {
                atr = v;
            } else {
                indicators.insert(key, v);
            }
        }
        let bar = Bar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            atr,
            indicators,
        };
        if !bar.has_finite_prices() {
            warn!(ts = %bar.timestamp, "Skipping candle with non-finite prices");
            continue;
        }
        bars.push(bar);
    }
    normalize_bars(&mut bars);
    Ok(bars)
}

#[async_trait]
impl BarSource for HttpBarSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>> {
        let url = format!("{}/historical_data", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", request.symbol.clone()),
                ("from_date", request.from.to_string()),
                ("to_date", request.to.to_string()),
                ("interval", request.interval.clone()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Http(format!("HTTP {status}: {body}")));
        }
        let bars = bars_from_json(&body)?;
        debug!(count = bars.len(), symbol = %request.symbol, "Fetched bars");
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn decodes_sorts_and_dedups() {
        let body = r#"[
            {"date": "2024-03-04T09:20:00+05:30", "open": 2, "high": 3, "low": 1, "close": 2.5, "volume": 10, "ATR": 41.5, "vwap": 2.2},
            {"date": "2024-03-04T09:15:00+05:30", "open": 1, "high": 2, "low": 0.5, "close": 1.5, "volume": 5, "ATR": 40.0},
            {"date": "2024-03-04T09:20:00+05:30", "open": 9, "high": 9, "low": 9, "close": 9, "volume": 1},
            {"date": "not a time", "open": 1, "high": 1, "low": 1, "close": 1}
        ]"#;
        let bars = bars_from_json(body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp.minute(), 15);
        assert_eq!(bars[1].close, 2.5);
        assert_eq!(bars[1].atr, 41.5);
        assert_eq!(bars[1].indicator("vwap"), Some(2.2));
    }

    #[test]
    fn utc_candles_land_in_exchange_time() {
        let body = r#"[{"date": "2024-03-04T03:45:00Z", "open": 1, "high": 1, "low": 1, "close": 1}]"#;
        let bars = bars_from_json(body).unwrap();
        assert_eq!(bars[0].timestamp.hour(), 9);
        assert_eq!(bars[0].timestamp.minute(), 15);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(bars_from_json("{\"error\": \"not ready\"}").is_err());
    }
}
