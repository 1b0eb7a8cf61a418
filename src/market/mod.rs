pub mod binance;
pub mod controller;
pub mod feed;
pub mod labels;
pub mod overlay;
mod poller;
pub mod series;
pub mod source;
pub mod types;

pub const CHART_STATUS_EVENT: &str = "chart_status";
pub const HISTORY_LOADED_EVENT: &str = "history_loaded";
pub const CANDLE_UPDATE_EVENT: &str = "candle_update";
pub const PRICE_UPDATE_EVENT: &str = "price_update";
pub const TRAILING_STOP_EVENT: &str = "trailing_stop_update";
pub const LEVEL_HIT_EVENT: &str = "level_hit";
pub const NOTIFICATION_EVENT: &str = "notification";
pub const OVERLAY_APPLIED_EVENT: &str = "overlay_applied";
pub const OVERLAY_CLEARED_EVENT: &str = "overlay_cleared";
