use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use common::time::parse_timestamp;
use common::{normalize_bars, Bar, BarSource, Error, FetchRequest, Result};

/// Bars from a CSV file with a header row.
///
/// The timestamp column is `date`, `datetime` or `timestamp` (else the first
/// column). `open`, `high`, `low`, `close` are required, `volume` optional,
/// `atr`/`ATR` fills the ATR slot and every other numeric column becomes an
/// indicator. Rows that fail to parse, or whose prices are not finite
/// (`NaN`, `inf`), are skipped.
pub struct CsvBarSource {
    path: PathBuf,
}

impl CsvBarSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Every bar in the file, sorted and de-duplicated.
    pub fn load(&self) -> Result<Vec<Bar>> {
        let file = std::fs::File::open(&self.path)?;
        let bars = Self::from_reader(file)?;
        info!(path = %self.path.display(), bars = bars.len(), "Loaded historical bars");
        Ok(bars)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<Bar>> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| Error::Data(format!("CSV header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();
        let layout = Layout::from_headers(&headers)?;

        let mut bars = Vec::new();
        let mut skipped = 0usize;
        for (line, row) in rdr.records().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(line = line + 2, error = %e, "Skipping unreadable CSV row");
                    skipped += 1;
                    continue;
                }
            };
            match layout.parse(&headers, &row) {
                Some(bar) => bars.push(bar),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "Skipped malformed CSV rows");
        }
        normalize_bars(&mut bars);
        Ok(bars)
    }
}

struct Layout {
    ts: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
    atr: Option<usize>,
}

impl Layout {
    fn from_headers(headers: &[String]) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        };
        let need = |name: &str| find(&[name]).ok_or_else(|| Error::Data(format!("CSV has no '{name}' column")));
        Ok(Self {
            ts: find(&["date", "datetime", "timestamp"]).unwrap_or(0),
            open: need("open")?,
            high: need("high")?,
            low: need("low")?,
            close: need("close")?,
            volume: find(&["volume"]),
            atr: find(&["atr"]),
        })
    }

    fn parse(&self, headers: &[String], row: &csv::StringRecord) -> Option<Bar> {
        let num = |i: usize| {
            row.get(i)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        let timestamp = parse_timestamp(row.get(self.ts)?).ok()?;

        let mut indicators = BTreeMap::new();
        for (i, name) in headers.iter().enumerate() {
            let known = [self.ts, self.open, self.high, self.low, self.close];
            if known.contains(&i) || Some(i) == self.volume || Some(i) == self.atr {
                continue;
            }
            if let Some(v) = num(i) {
                indicators.insert(name.clone(), v);
            }
        }
        Some(Bar {
            timestamp,
            open: num(self.open)?,
            high: num(self.high)?,
            low: num(self.low)?,
            close: num(self.close)?,
            volume: self.volume.and_then(num).unwrap_or(0.0),
            atr: self.atr.and_then(num).unwrap_or(0.0),
            indicators,
        })
    }
}

#[async_trait]
impl BarSource for CsvBarSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>> {
        let bars = self.load()?;
        Ok(bars
            .into_iter()
            .filter(|b| {
                let d = b.timestamp.date_naive();
                request.from <= d && d <= request.to
            })
            .collect())
    }
}
