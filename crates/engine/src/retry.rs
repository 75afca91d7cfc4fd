use std::time::Duration;

use tracing::warn;

use common::{Bar, BarSource, FetchRequest};

/// Fetch with exponential backoff: the wait before retry `n` (0-based) is
/// `base_delay * 2^n`. Exhausting every attempt yields `None`, never an error.
pub async fn fetch_with_retry(
    source: &dyn BarSource,
    request: &FetchRequest,
    attempts: u32,
    base_delay: Duration,
) -> Option<Vec<Bar>> {
    let attempts = attempts.max(1);
    for attempt in 0..attempts {
        match source.fetch(request).await {
            Ok(bars) => return Some(bars),
            Err(e) => {
                warn!(attempt = attempt + 1, of = attempts, error = %e, "Bar fetch failed");
                if attempt + 1 < attempts {
                    tokio::time::sleep(base_delay * 2u32.saturating_pow(attempt)).await;
                }
            }
        }
    }
    warn!(symbol = %request.symbol, "Bar fetch retries exhausted");
    None
}
