use crate::market::types::MarketTimeframe;
use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

/// Axis label for a candle opening at `open_time_ms`, coarser for longer intervals.
pub fn candle_label(open_time_ms: i64, timeframe: MarketTimeframe) -> String {
    let Some(time) = DateTime::<Utc>::from_timestamp_millis(open_time_ms) else {
        return open_time_ms.to_string();
    };

    let pattern = match timeframe {
        MarketTimeframe::M1
        | MarketTimeframe::M3
        | MarketTimeframe::M5
        | MarketTimeframe::M15
        | MarketTimeframe::M30 => "%d.%m %H:%M:%S",
        MarketTimeframe::H1 | MarketTimeframe::H2 => "%d.%m %H:%M",
        MarketTimeframe::H4 | MarketTimeframe::H6 | MarketTimeframe::H8 | MarketTimeframe::H12 => {
            "%d.%m %H:00"
        }
        MarketTimeframe::D1 | MarketTimeframe::D3 | MarketTimeframe::W1 => "%d.%m.%Y",
        MarketTimeframe::Mo1 => "%m.%Y",
    };

    time.format(pattern).to_string()
}
