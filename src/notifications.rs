use crate::error::AppError;
use crate::market::overlay::LevelHit;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NOTIFICATION_MS: u64 = 3_500;
pub const LEVEL_HIT_NOTIFICATION_MS: u64 = 10_000;
const OVERLAY_EXPIRED_NOTIFICATION_MS: u64 = 3_000;
const NOT_LISTED_NOTIFICATION_MS: u64 = 8_000;
const NETWORK_NOTIFICATION_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

/// A dismissible message for whoever renders the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub duration_ms: u64,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            level,
            message: message.into(),
            duration_ms,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message, DEFAULT_NOTIFICATION_MS)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message, DEFAULT_NOTIFICATION_MS)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message, DEFAULT_NOTIFICATION_MS)
    }

    pub fn level_hit(hit: LevelHit, price: f64) -> Self {
        match hit {
            LevelHit::TakeProfit => Self::new(
                NotificationLevel::Success,
                format!("Take Profit reached! Price: ${price:.2}"),
                LEVEL_HIT_NOTIFICATION_MS,
            ),
            LevelHit::StopLoss => Self::new(
                NotificationLevel::Error,
                format!("Stop Loss triggered! Price: ${price:.2}"),
                LEVEL_HIT_NOTIFICATION_MS,
            ),
        }
    }

    pub fn overlay_expired() -> Self {
        Self::new(
            NotificationLevel::Info,
            "Analysis lines hidden (time expired)",
            OVERLAY_EXPIRED_NOTIFICATION_MS,
        )
    }

    /// Turns a failed history load into something a user can act on.
    pub fn history_error(symbol: &str, error: &AppError) -> Self {
        if error.is_network() {
            return Self::new(
                NotificationLevel::Error,
                "Could not reach the server. Check your internet connection.",
                NETWORK_NOTIFICATION_MS,
            );
        }

        let message = server_message(error);
        let lowered = message.to_lowercase();
        if lowered.contains("не найдена на бирже") || lowered.contains("not found") {
            return Self::new(
                NotificationLevel::Error,
                format!("{message}\nThe pair {symbol} may not be traded on the exchange."),
                NOT_LISTED_NOTIFICATION_MS,
            );
        }

        Self::new(
            NotificationLevel::Error,
            format!("Failed to load market data: {message}"),
            NETWORK_NOTIFICATION_MS,
        )
    }

    pub fn analysis_error(error: &AppError) -> Self {
        match error {
            AppError::Analysis {
                limit_reached: true,
                ..
            } => Self::new(
                NotificationLevel::Error,
                "Free analysis limit reached. Upgrade to Pro for more analyses.",
                LEVEL_HIT_NOTIFICATION_MS,
            ),
            AppError::PlanRequired { .. } => Self::error("Available on Pro and Pro+ plans only"),
            error if error.is_network() => Self::new(
                NotificationLevel::Error,
                "Could not reach the server. Check your internet connection.",
                NETWORK_NOTIFICATION_MS,
            ),
            other => Self::error(format!("Analysis failed: {}", server_message(other))),
        }
    }
}

fn server_message(error: &AppError) -> String {
    match error {
        AppError::Upstream { message, .. } | AppError::Analysis { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_hit_notifications_last_ten_seconds() {
        let profit = Notification::level_hit(LevelHit::TakeProfit, 120.456);
        assert_eq!(profit.level, NotificationLevel::Success);
        assert_eq!(profit.message, "Take Profit reached! Price: $120.46");
        assert_eq!(profit.duration_ms, 10_000);

        let loss = Notification::level_hit(LevelHit::StopLoss, 89.5);
        assert_eq!(loss.level, NotificationLevel::Error);
        assert!(loss.message.starts_with("Stop Loss triggered!"));
    }

    #[test]
    fn unlisted_pair_gets_a_hint() {
        let error = AppError::Upstream {
            status: 404,
            message: "Пара XYZUSDT не найдена на бирже".to_string(),
        };
        let notification = Notification::history_error("XYZUSDT", &error);

        assert_eq!(notification.level, NotificationLevel::Error);
        assert!(notification.message.starts_with("Пара XYZUSDT не найдена на бирже"));
        assert!(notification.message.contains("may not be traded"));
        assert_eq!(notification.duration_ms, 8_000);
    }

    #[test]
    fn other_server_errors_keep_raw_message() {
        let error = AppError::Upstream {
            status: 500,
            message: "exchange timeout".to_string(),
        };
        let notification = Notification::history_error("BTCUSDT", &error);

        assert_eq!(notification.message, "Failed to load market data: exchange timeout");
    }

    #[test]
    fn analysis_errors_distinguish_the_free_limit() {
        let limit = Notification::analysis_error(&AppError::Analysis {
            message: "limit".to_string(),
            limit_reached: true,
        });
        assert!(limit.message.starts_with("Free analysis limit reached"));
        assert_eq!(limit.duration_ms, 10_000);

        let failed = Notification::analysis_error(&AppError::Analysis {
            message: "no candles".to_string(),
            limit_reached: false,
        });
        assert_eq!(failed.message, "Analysis failed: no candles");
    }

    #[test]
    fn serializes_level_in_lowercase() {
        let encoded = serde_json::to_value(Notification::info("hello")).expect("serializes");
        assert_eq!(encoded["level"], "info");
        assert_eq!(encoded["durationMs"], 3_500);
    }
}
