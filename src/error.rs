use serde::ser::Serializer;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("server responded with {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("analysis failed: {message}")]
    Analysis { message: String, limit_reached: bool },
    #[error("feature '{feature}' requires a paid plan")]
    PlanRequired { feature: &'static str },
    #[error("live chart is not running")]
    NotRunning,
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("json decode error: {0}")]
    SimdJson(#[from] simd_json::Error),
    #[error("json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("float parse error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

/// Body the dashboard API sends alongside a non-OK status.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBodyWire {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub limit_reached: bool,
}

impl ErrorBodyWire {
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

impl AppError {
    /// Builds an `Upstream` error, preferring the server's own `error` text.
    pub fn upstream(status: u16, body: &[u8]) -> Self {
        let message = ErrorBodyWire::parse(body)
            .error
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| {
                let text = String::from_utf8_lossy(body).trim().to_string();
                if text.is_empty() {
                    format!("HTTP {status}")
                } else {
                    text
                }
            });
        Self::Upstream { status, message }
    }

    /// Transport-level failures, as opposed to errors reported by a server.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Reqwest(error) => error.is_connect() || error.is_timeout() || error.is_request(),
            Self::WebSocket(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
