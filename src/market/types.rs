use crate::error::AppError;
use crate::market::feed::{FeedState, SocketPhase};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
pub const DEFAULT_TIMEFRAME: MarketTimeframe = MarketTimeframe::H1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MarketTimeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    Mo1,
}

impl MarketTimeframe {
    pub const ALL: [MarketTimeframe; 15] = [
        Self::M1,
        Self::M3,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H2,
        Self::H4,
        Self::H6,
        Self::H8,
        Self::H12,
        Self::D1,
        Self::D3,
        Self::W1,
        Self::Mo1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
            Self::Mo1 => "1M",
        }
    }

    /// Interval strings are case sensitive: `1m` is a minute, `1M` a month.
    pub fn parse_str(value: &str) -> Result<Self, AppError> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|timeframe| timeframe.as_str() == trimmed)
            .ok_or_else(|| AppError::InvalidArgument(format!("unsupported timeframe '{trimmed}'")))
    }

    /// Number of candles kept on the chart for this interval.
    pub fn history_limit(self) -> u16 {
        match self {
            Self::Mo1 => 100,
            Self::W1 => 200,
            Self::D1 | Self::D3 => 300,
            Self::H4 | Self::H6 | Self::H8 | Self::H12 => 400,
            Self::H1 | Self::H2 => 500,
            Self::M30 => 120,
            Self::M15 => 200,
            Self::M5 => 240,
            Self::M3 => 300,
            Self::M1 => 200,
        }
    }
}

/// Uppercases and strips the `BASE/QUOTE` separator used by the dashboard forms.
pub fn normalize_symbol(raw: &str) -> Result<String, AppError> {
    let symbol = raw.trim().replace('/', "").to_ascii_uppercase();
    if symbol.is_empty() || !symbol.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidArgument(
            "symbol must be non-empty alphanumeric ASCII".to_string(),
        ));
    }
    Ok(symbol)
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartLiveChartArgs {
    pub symbol: Option<String>,
    pub timeframe: Option<MarketTimeframe>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveChartConfig {
    pub symbol: String,
    pub timeframe: MarketTimeframe,
    pub history_limit: u16,
}

impl StartLiveChartArgs {
    pub fn normalize(self) -> Result<LiveChartConfig, AppError> {
        let symbol = normalize_symbol(self.symbol.as_deref().unwrap_or(DEFAULT_SYMBOL))?;
        let timeframe = self.timeframe.unwrap_or(DEFAULT_TIMEFRAME);

        Ok(LiveChartConfig {
            symbol,
            timeframe,
            history_limit: timeframe.history_limit(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChartSession {
    pub running: bool,
    pub symbol: String,
    pub timeframe: MarketTimeframe,
    pub history_limit: u16,
    pub generation: u64,
}

impl LiveChartSession {
    pub fn from_config(config: &LiveChartConfig, generation: u64) -> Self {
        Self {
            running: true,
            symbol: config.symbol.clone(),
            timeframe: config.timeframe,
            history_limit: config.history_limit,
            generation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChartStopResult {
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveChartStatusSnapshot {
    pub state: FeedState,
    pub socket: SocketPhase,
    pub symbol: Option<String>,
    pub timeframe: MarketTimeframe,
    pub generation: u64,
    pub candles: usize,
    pub last_price: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TickSource {
    Live,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub source: TickSource,
    pub t: i64,
}

impl PriceTick {
    pub fn new(
        symbol: String,
        price: f64,
        previous: Option<f64>,
        source: TickSource,
        now_ms: i64,
    ) -> Self {
        let change = previous.map(|previous| price - previous);
        let change_percent = previous.map(|previous| {
            if previous != 0.0 {
                (price - previous) / previous * 100.0
            } else {
                0.0
            }
        });

        Self {
            symbol,
            price,
            change,
            change_percent,
            source,
            t: now_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A kline cell; the proxy forwards exchange rows where prices are strings,
/// but cached rows may come back as plain numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireNumber {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl WireNumber {
    pub fn as_f64(&self) -> Result<f64, AppError> {
        match self {
            Self::Integer(value) => Ok(*value as f64),
            Self::Float(value) => Ok(*value),
            Self::Text(value) => Ok(value.trim().parse::<f64>()?),
        }
    }

    pub fn as_i64(&self) -> Result<i64, AppError> {
        match self {
            Self::Integer(value) => Ok(*value),
            Self::Float(value) if value.is_finite() => Ok(*value as i64),
            Self::Float(_) => Err(AppError::InvalidArgument(
                "kline open time must be finite".to_string(),
            )),
            Self::Text(value) => value.trim().parse::<i64>().map_err(|error| {
                AppError::InvalidArgument(format!("invalid kline open time '{value}': {error}"))
            }),
        }
    }
}

pub type KlineRowWire = Vec<WireNumber>;

pub fn candle_from_row(row: &[WireNumber]) -> Result<Candle, AppError> {
    if row.len() < 5 {
        return Err(AppError::InvalidArgument(format!(
            "kline row must have at least 5 cells, got {}",
            row.len()
        )));
    }

    let open_time = row[0].as_i64()?;
    let open = row[1].as_f64()?;
    let high = row[2].as_f64()?;
    let low = row[3].as_f64()?;
    let close = row[4].as_f64()?;
    let volume = match row.get(5) {
        Some(cell) => cell.as_f64()?,
        None => 0.0,
    };

    if !open.is_finite()
        || !high.is_finite()
        || !low.is_finite()
        || !close.is_finite()
        || !volume.is_finite()
    {
        return Err(AppError::InvalidArgument(
            "kline values must be finite".to_string(),
        ));
    }

    Ok(Candle {
        open_time,
        open,
        high,
        low,
        close,
        volume: volume.max(0.0),
    })
}

#[derive(Debug, Deserialize)]
pub struct KlineStreamWire {
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    #[serde(rename = "k", default)]
    pub kline: Option<KlineBodyWire>,
}

#[derive(Debug, Deserialize)]
pub struct KlineBodyWire {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "x", default)]
    pub is_closed: bool,
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KlineEvent {
    pub symbol: Option<String>,
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub is_closed: bool,
}

impl KlineStreamWire {
    pub fn into_event(self) -> Result<Option<KlineEvent>, AppError> {
        let Some(body) = self.kline else {
            return Ok(None);
        };

        let open = body.open.parse::<f64>()?;
        let high = body.high.parse::<f64>()?;
        let low = body.low.parse::<f64>()?;
        let close = body.close.parse::<f64>()?;
        if !open.is_finite() || !high.is_finite() || !low.is_finite() || !close.is_finite() {
            return Err(AppError::InvalidArgument(
                "kline stream values must be finite".to_string(),
            ));
        }

        Ok(Some(KlineEvent {
            symbol: body.symbol.or(self.symbol),
            open_time: body.open_time,
            open,
            high,
            low,
            close,
            is_closed: body.is_closed,
        }))
    }
}

/// Returns `Ok(None)` for frames that carry no kline body (subscription acks and the like).
pub fn parse_kline_payload(payload: &mut [u8]) -> Result<Option<KlineEvent>, AppError> {
    let wire: KlineStreamWire = simd_json::serde::from_slice(payload)?;
    wire.into_event()
}

#[derive(Debug, Deserialize)]
pub struct TickerPriceWire {
    pub symbol: String,
    pub price: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_kline_payload() {
        let mut payload = br#"{"e":"kline","E":1700000000500,"s":"BTCUSDT","k":{"t":1700000000000,"T":1700000059999,"s":"BTCUSDT","i":"1m","o":"100.5","c":"101.25","h":"102","l":"99.75","v":"12.5","x":false}}"#
            .to_vec();
        let event = parse_kline_payload(&mut payload)
            .expect("kline payload should parse")
            .expect("payload carries a kline body");

        assert_eq!(event.symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(event.open_time, 1_700_000_000_000);
        assert_eq!(event.open, 100.5);
        assert_eq!(event.high, 102.0);
        assert_eq!(event.low, 99.75);
        assert_eq!(event.close, 101.25);
        assert!(!event.is_closed);
    }

    #[test]
    fn ignores_frames_without_kline_body() {
        let mut payload = br#"{"result":null,"id":1}"#.to_vec();
        let event = parse_kline_payload(&mut payload).expect("ack frame should decode");
        assert!(event.is_none());
    }

    #[test]
    fn rejects_invalid_kline_payload() {
        let mut payload =
            br#"{"s":"BTCUSDT","k":{"t":1,"o":"broken","h":"1","l":"1","c":"1","x":true}}"#
                .to_vec();
        assert!(parse_kline_payload(&mut payload).is_err());
    }

    #[test]
    fn parses_rows_with_string_and_numeric_cells() {
        let rows: Vec<KlineRowWire> = serde_json::from_str(
            r#"[[1700000000000,"100.0","110.0","95.0","105.0","3.5",1700000059999],
                [1700000060000,105.0,106.5,104,106,0]]"#,
        )
        .expect("rows should decode");

        let first = candle_from_row(&rows[0]).expect("string cells parse");
        let second = candle_from_row(&rows[1]).expect("numeric cells parse");

        assert_eq!(first.open_time, 1_700_000_000_000);
        assert_eq!(first.close, 105.0);
        assert_eq!(first.volume, 3.5);
        assert_eq!(second.low, 104.0);
        assert_eq!(second.close, 106.0);
    }

    #[test]
    fn rejects_short_rows() {
        let rows: Vec<KlineRowWire> =
            serde_json::from_str(r#"[[1700000000000,"1","2"]]"#).expect("rows should decode");
        assert!(candle_from_row(&rows[0]).is_err());
    }

    #[test]
    fn normalizes_start_args_defaults() {
        let config = StartLiveChartArgs::default()
            .normalize()
            .expect("defaults should be valid");

        assert_eq!(config.symbol, DEFAULT_SYMBOL);
        assert_eq!(config.timeframe, DEFAULT_TIMEFRAME);
        assert_eq!(config.history_limit, 500);
    }

    #[test]
    fn normalizes_slash_separated_symbols() {
        let config = StartLiveChartArgs {
            symbol: Some(" eth/usdt ".to_string()),
            timeframe: Some(MarketTimeframe::M5),
        }
        .normalize()
        .expect("slash symbol should normalize");

        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.history_limit, 240);
    }

    #[test]
    fn rejects_non_alphanumeric_symbols() {
        let result = StartLiveChartArgs {
            symbol: Some("BTC-USDT".to_string()),
            timeframe: None,
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn timeframe_strings_round_trip() {
        for timeframe in MarketTimeframe::ALL {
            assert_eq!(
                MarketTimeframe::parse_str(timeframe.as_str()).expect("known timeframe"),
                timeframe
            );
        }
        assert_eq!(
            MarketTimeframe::parse_str("1M").expect("month"),
            MarketTimeframe::Mo1
        );
        assert!(MarketTimeframe::parse_str("2w").is_err());
    }

    #[test]
    fn history_limits_follow_interval_length() {
        assert_eq!(MarketTimeframe::Mo1.history_limit(), 100);
        assert_eq!(MarketTimeframe::W1.history_limit(), 200);
        assert_eq!(MarketTimeframe::D3.history_limit(), 300);
        assert_eq!(MarketTimeframe::H12.history_limit(), 400);
        assert_eq!(MarketTimeframe::H2.history_limit(), 500);
        assert_eq!(MarketTimeframe::M30.history_limit(), 120);
        assert_eq!(MarketTimeframe::M1.history_limit(), 200);
    }

    #[test]
    fn price_tick_reports_change_against_previous_price() {
        let tick = PriceTick::new("BTCUSDT".to_string(), 110.0, Some(100.0), TickSource::Live, 1);
        assert_eq!(tick.change, Some(10.0));
        let change_percent = tick.change_percent.expect("change percent present");
        assert!((change_percent - 10.0).abs() < 1e-9);

        let first = PriceTick::new("BTCUSDT".to_string(), 110.0, None, TickSource::Live, 1);
        assert_eq!(first.change, None);
    }
}
