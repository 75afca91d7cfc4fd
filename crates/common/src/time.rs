use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday,
};

use crate::{Error, Result};

/// Zoned timestamp in exchange-local time.
pub type Timestamp = DateTime<FixedOffset>;

/// NSE trades on IST (UTC+05:30) with no daylight saving.
const EXCHANGE_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub fn exchange_offset() -> FixedOffset {
    FixedOffset::east_opt(EXCHANGE_OFFSET_SECS).expect("exchange offset is within one day")
}

/// Current wall-clock time in exchange-local time.
pub fn now() -> Timestamp {
    Utc::now().with_timezone(&exchange_offset())
}

/// Interpret a naive date-time as exchange-local.
pub fn localize(naive: NaiveDateTime) -> Timestamp {
    let utc = naive - Duration::seconds(i64::from(EXCHANGE_OFFSET_SECS));
    DateTime::from_naive_utc_and_offset(utc, exchange_offset())
}

pub fn at(date: NaiveDate, time: NaiveTime) -> Timestamp {
    localize(date.and_time(time))
}

/// Parse a feed timestamp. Zoned inputs are converted to exchange-local time;
/// naive inputs are assumed to already be exchange-local.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp> {
    let s = raw.trim();
    let offset = exchange_offset();

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&offset));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Ok(ts.with_timezone(&offset));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(localize(naive));
        }
    }
    Err(Error::Data(format!("unparseable timestamp '{s}'")))
}

/// Weekday, not a holiday, and within `[open, close]` local time.
pub fn is_market_open(now: Timestamp, open: NaiveTime, close: NaiveTime, holidays: &[NaiveDate]) -> bool {
    let is_weekday = !matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    let not_holiday = !holidays.contains(&now.date_naive());
    let t = now.time();
    is_weekday && not_holiday && open <= t && t <= close
}
