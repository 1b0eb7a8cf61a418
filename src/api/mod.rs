pub mod plan;

use crate::db::preferences::Language;
use crate::error::{AppError, ErrorBodyWire};
use crate::market::binance::check_status;
use crate::market::overlay::{AnalysisOverlay, Direction, TradingStyle, DEFAULT_TRAILING_PERCENT};
use crate::market::types::{normalize_symbol, MarketTimeframe};
use crate::report::StrategyStat;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use plan::{Plan, UserInfoWire};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const DEFAULT_CAPITAL: f64 = 10_000.0;
pub const DEFAULT_BACKTEST_DAYS: u32 = 60;
pub const DEFAULT_MIN_RELIABILITY: f64 = 50.0;

/// Marker the server sends when no strategy statistics exist yet.
const NO_DATA_MARKER: &str = "Нет данных";

/// Form values of an analysis run, as the UI collects them.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeArgs {
    pub symbol: String,
    pub strategy: String,
    pub trading_type: String,
    pub capital: Option<f64>,
    pub risk: f64,
    pub confirmation: String,
    /// `None` or `"auto"` lets the server choose.
    pub timeframe: Option<String>,
    pub min_reliability: Option<f64>,
    #[serde(default)]
    pub enable_forecast: bool,
    #[serde(default)]
    pub enable_backtest: bool,
    #[serde(default)]
    pub enable_ml: bool,
    pub backtest_days: Option<u32>,
    #[serde(default)]
    pub enable_trailing: bool,
    pub trailing_percent: Option<f64>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalyzeRequest {
    pub symbol: String,
    pub strategy: String,
    pub trading_type: String,
    pub capital: f64,
    pub risk: f64,
    pub confirmation: String,
    pub timeframe: Option<MarketTimeframe>,
    pub min_reliability: f64,
    pub enable_forecast: bool,
    pub enable_backtest: bool,
    pub enable_ml: bool,
    pub backtest_days: u32,
    pub enable_trailing: bool,
    pub trailing_percent: f64,
    pub language: Language,
}

fn require_text(field: &str, value: String) -> Result<String, AppError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::InvalidArgument(format!("{field} is required")));
    }
    Ok(value)
}

fn require_positive(field: &str, value: f64) -> Result<f64, AppError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::InvalidArgument(format!(
            "{field} must be a positive number"
        )));
    }
    Ok(value)
}

impl AnalyzeArgs {
    pub fn normalize(self, default_language: Language) -> Result<AnalyzeRequest, AppError> {
        let timeframe = match self.timeframe.as_deref().map(str::trim) {
            None | Some("") | Some("auto") => None,
            Some(value) => Some(MarketTimeframe::parse_str(value)?),
        };
        let language = match self.language.as_deref() {
            Some(value) => Language::parse_str(value)?,
            None => default_language,
        };
        let trading_type = require_text("trading type", self.trading_type)?;
        if TradingStyle::parse_str(&trading_type).is_none() {
            return Err(AppError::InvalidArgument(format!(
                "unsupported trading type: {trading_type}"
            )));
        }

        Ok(AnalyzeRequest {
            symbol: normalize_symbol(&self.symbol)?,
            strategy: require_text("strategy", self.strategy)?,
            trading_type,
            capital: require_positive("capital", self.capital.unwrap_or(DEFAULT_CAPITAL))?,
            risk: require_positive("risk", self.risk)?,
            confirmation: require_text("confirmation", self.confirmation)?,
            timeframe,
            min_reliability: self.min_reliability.unwrap_or(DEFAULT_MIN_RELIABILITY),
            enable_forecast: self.enable_forecast,
            enable_backtest: self.enable_backtest,
            enable_ml: self.enable_ml,
            backtest_days: self.backtest_days.unwrap_or(DEFAULT_BACKTEST_DAYS),
            enable_trailing: self.enable_trailing,
            trailing_percent: require_positive(
                "trailing percent",
                self.trailing_percent.unwrap_or(DEFAULT_TRAILING_PERCENT),
            )?,
            language,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub report_text: Option<String>,
    #[serde(default)]
    pub reports_by_language: Option<HashMap<String, String>>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub zip_base64: Option<String>,
    #[serde(default)]
    pub enable_trailing: Option<bool>,
    #[serde(default)]
    pub trailing_percent: Option<f64>,
    #[serde(default)]
    pub backtest: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    limit_reached: bool,
}

fn strip_data_url(encoded: &str) -> &str {
    match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded,
    }
}

pub(crate) fn decode_base64(encoded: &str) -> Result<Vec<u8>, AppError> {
    Ok(STANDARD.decode(strip_data_url(encoded.trim()))?)
}

impl AnalyzeResponse {
    /// Error bodies may arrive with a 200 too; both become `Analysis` errors.
    pub fn from_body(status: u16, body: &[u8]) -> Result<Self, AppError> {
        let is_success = (200..300).contains(&status);
        if !is_success {
            let wire = ErrorBodyWire::parse(body);
            if let Some(message) = wire.error.filter(|message| !message.trim().is_empty()) {
                return Err(AppError::Analysis {
                    message,
                    limit_reached: wire.limit_reached,
                });
            }
            return Err(AppError::upstream(status, body));
        }

        let response: Self = serde_json::from_slice(body)?;
        if let Some(message) = response.error.clone() {
            return Err(AppError::Analysis {
                message,
                limit_reached: response.limit_reached,
            });
        }
        Ok(response)
    }

    /// Report in the preferred language, falling back to `report_text`.
    pub fn report_for(&self, language: Language) -> Option<&str> {
        self.reports_by_language
            .as_ref()
            .and_then(|reports| reports.get(language.as_str()))
            .or(self.report_text.as_ref())
            .map(String::as_str)
            .filter(|report| !report.trim().is_empty())
    }

    pub fn decode_bundle(&self) -> Result<Option<Vec<u8>>, AppError> {
        self.zip_base64
            .as_deref()
            .filter(|encoded| !encoded.trim().is_empty())
            .map(decode_base64)
            .transpose()
    }

    /// Levels to draw on the live chart; `None` when the response lacks any of them.
    pub fn overlay(&self) -> Option<AnalysisOverlay> {
        let symbol = normalize_symbol(self.symbol.as_deref()?).ok()?;
        let trailing_percent = self
            .enable_trailing
            .unwrap_or(false)
            .then(|| self.trailing_percent.unwrap_or(DEFAULT_TRAILING_PERCENT));

        let overlay = AnalysisOverlay {
            symbol,
            entry_price: self.entry_price?,
            stop_loss: self.stop_loss?,
            take_profit: self.take_profit?,
            direction: Direction::parse_str(self.direction.as_deref()?)?,
            trailing_percent,
        };
        overlay.validate().ok()?;
        Some(overlay)
    }
}

#[derive(Debug, Deserialize, Default)]
struct StrategyAnalysisWire {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    auto_summary: Option<String>,
    #[serde(default)]
    strategy_stats: Option<HashMap<String, StrategyStat>>,
    #[serde(default, alias = "heatmap_base64")]
    heatmap_image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyAnalysis {
    pub auto_summary: Option<String>,
    pub strategy_stats: HashMap<String, StrategyStat>,
    pub heatmap_png: Option<Vec<u8>>,
}

impl StrategyAnalysis {
    /// `"Нет данных"` is an empty result, not a failure.
    pub fn from_body(status: u16, body: &[u8]) -> Result<Self, AppError> {
        let wire: StrategyAnalysisWire = match serde_json::from_slice(body) {
            Ok(wire) => wire,
            Err(_) if !(200..300).contains(&status) => return Err(AppError::upstream(status, body)),
            Err(error) => return Err(error.into()),
        };

        if let Some(message) = wire.error {
            if message.trim() == NO_DATA_MARKER {
                return Ok(Self::default());
            }
            return Err(AppError::upstream(status, body));
        }
        if !(200..300).contains(&status) {
            return Err(AppError::upstream(status, body));
        }

        let heatmap_png = match wire.heatmap_image.as_deref() {
            Some(encoded) if !encoded.trim().is_empty() => Some(decode_base64(encoded)?),
            _ => None,
        };

        Ok(Self {
            auto_summary: wire.auto_summary.filter(|summary| !summary.trim().is_empty()),
            strategy_stats: wire.strategy_stats.unwrap_or_default(),
            heatmap_png,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.auto_summary.is_none() && self.strategy_stats.is_empty() && self.heatmap_png.is_none()
    }
}

/// Client of the dashboard's own HTTP API.
#[derive(Debug, Clone)]
pub struct DashboardApi {
    client: Client,
    base_url: String,
}

impl DashboardApi {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, AppError> {
        info!(
            symbol = %request.symbol,
            trading_type = %request.trading_type,
            language = request.language.as_str(),
            "requesting analysis"
        );
        let response = self
            .client
            .post(format!("{}/api/analyze", self.base_url))
            .json(request)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        AnalyzeResponse::from_body(status, &body).inspect_err(|error| {
            warn!(symbol = %request.symbol, %error, "analysis request failed");
        })
    }

    pub async fn strategy_analysis(&self, language: Language) -> Result<StrategyAnalysis, AppError> {
        let response = self
            .client
            .get(format!("{}/api/strategy_analysis", self.base_url))
            .query(&[("language", language.as_str())])
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        let analysis = StrategyAnalysis::from_body(status, &body)?;
        debug!(
            strategies = analysis.strategy_stats.len(),
            has_heatmap = analysis.heatmap_png.is_some(),
            "strategy analysis loaded"
        );
        Ok(analysis)
    }

    /// Zip of the user's accumulated statistics.
    pub async fn download_stats_bundle(&self) -> Result<Vec<u8>, AppError> {
        let response = self
            .client
            .get(format!("{}/download_user_stats_bundle", self.base_url))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn user_info(&self) -> Result<Plan, AppError> {
        let response = self
            .client
            .get(format!("{}/api/user_info", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await?;
            return Err(AppError::upstream(status.as_u16(), &body));
        }

        let wire = response.json::<UserInfoWire>().await?;
        Ok(Plan::parse_lossy(wire.plan.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_args() -> AnalyzeArgs {
        AnalyzeArgs {
            symbol: "btc/usdt".to_string(),
            strategy: "Balanced".to_string(),
            trading_type: "Свинг".to_string(),
            capital: None,
            risk: 1.5,
            confirmation: "all".to_string(),
            timeframe: Some("auto".to_string()),
            ..AnalyzeArgs::default()
        }
    }

    const ANALYZE_BODY: &str = r#"{
        "report_text": "=== Report ===\n### Notes\nfallback",
        "reports_by_language": {"en": "=== Report ===\n### Notes\nenglish"},
        "symbol": "ETHUSDT",
        "entry_price": 2000.0,
        "stop_loss": 1900.0,
        "take_profit": 2300.0,
        "direction": "long",
        "zip_base64": "UEsDBA==",
        "enable_trailing": true,
        "backtest": {"trades": 3}
    }"#;

    #[test]
    fn normalize_applies_defaults_and_validates() {
        let request = analyze_args().normalize(Language::Ru).expect("valid args");

        assert_eq!(request.symbol, "BTCUSDT");
        assert_eq!(request.capital, DEFAULT_CAPITAL);
        assert_eq!(request.timeframe, None);
        assert_eq!(request.trailing_percent, DEFAULT_TRAILING_PERCENT);
        assert_eq!(request.backtest_days, DEFAULT_BACKTEST_DAYS);
        assert_eq!(request.language, Language::Ru);
    }

    #[test]
    fn normalize_rejects_non_positive_capital() {
        for capital in [0.0, -5.0, f64::NAN] {
            let error = AnalyzeArgs {
                capital: Some(capital),
                ..analyze_args()
            }
            .normalize(Language::En)
            .expect_err("capital must be positive");
            assert!(matches!(error, AppError::InvalidArgument(_)));
        }
    }

    #[test]
    fn request_serializes_wire_names() {
        let request = AnalyzeArgs {
            timeframe: Some("4h".to_string()),
            language: Some("uk".to_string()),
            ..analyze_args()
        }
        .normalize(Language::Ru)
        .expect("valid args");

        let value = serde_json::to_value(&request).expect("serializable");
        assert_eq!(value["timeframe"], "4h");
        assert_eq!(value["language"], "uk");
        assert_eq!(value["trading_type"], "Свинг");
        assert_eq!(value["min_reliability"], 50.0);
    }

    #[test]
    fn response_picks_report_language_and_overlay() {
        let response = AnalyzeResponse::from_body(200, ANALYZE_BODY.as_bytes()).expect("parses");

        assert!(response.report_for(Language::En).expect("en").ends_with("english"));
        assert!(response.report_for(Language::Uk).expect("fallback").ends_with("fallback"));

        let overlay = response.overlay().expect("complete levels");
        assert_eq!(overlay.symbol, "ETHUSDT");
        assert_eq!(overlay.direction, Direction::Long);
        assert_eq!(overlay.trailing_percent, Some(DEFAULT_TRAILING_PERCENT));

        let bundle = response.decode_bundle().expect("valid base64").expect("bundle");
        assert_eq!(bundle, b"PK\x03\x04");
    }

    #[test]
    fn overlay_requires_every_level() {
        let response = AnalyzeResponse {
            symbol: Some("BTCUSDT".to_string()),
            entry_price: Some(100.0),
            stop_loss: Some(95.0),
            direction: Some("short".to_string()),
            ..AnalyzeResponse::default()
        };
        assert!(response.overlay().is_none());
        assert_eq!(response.decode_bundle().expect("no bundle"), None);
    }

    #[test]
    fn limit_reached_is_reported_distinctly() {
        let error = AnalyzeResponse::from_body(
            429,
            br#"{"error": "Free limit reached", "limit_reached": true}"#,
        )
        .expect_err("must fail");
        assert!(matches!(
            error,
            AppError::Analysis {
                limit_reached: true,
                ..
            }
        ));

        let error = AnalyzeResponse::from_body(200, r#"{"error": "Пара не найдена на бирже"}"#.as_bytes())
            .expect_err("must fail");
        assert!(matches!(
            error,
            AppError::Analysis {
                limit_reached: false,
                ..
            }
        ));

        let error = AnalyzeResponse::from_body(502, b"Bad Gateway").expect_err("must fail");
        assert!(matches!(error, AppError::Upstream { status: 502, .. }));
    }

    #[test]
    fn strategy_no_data_marker_is_empty() {
        let analysis = StrategyAnalysis::from_body(404, "{\"error\": \"Нет данных\"}".as_bytes())
            .expect("no data is not an error");
        assert!(analysis.is_empty());

        let error = StrategyAnalysis::from_body(500, br#"{"error": "boom"}"#).expect_err("fails");
        assert!(matches!(error, AppError::Upstream { status: 500, .. }));
    }

    #[test]
    fn strategy_analysis_decodes_stats_and_heatmap() {
        let body = br#"{
            "auto_summary": "**Best**: Balanced",
            "strategy_stats": {
                "Balanced": {"total_trades": 4, "successful_trades": 3, "win_rate": 75.0,
                             "avg_profit_percent": 1.2, "total_profit_percent": 4.8,
                             "max_profit": 3.0, "max_loss": null}
            },
            "heatmap_base64": "data:image/png;base64,iVBORw=="
        }"#;
        let analysis = StrategyAnalysis::from_body(200, body).expect("parses");

        assert_eq!(analysis.auto_summary.as_deref(), Some("**Best**: Balanced"));
        assert_eq!(analysis.strategy_stats["Balanced"].total_trades, 4);
        assert_eq!(analysis.heatmap_png.as_deref(), Some(&b"\x89PNG"[..]));
    }
}
