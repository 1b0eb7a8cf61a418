use crate::error::AppError;
use crate::market::types::MarketTimeframe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TRAILING_PERCENT: f64 = 50.0;
const STOP_MOVE_EPSILON: f64 = 0.001;
const DEFAULT_OVERLAY_DURATION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "long" => Some(Self::Long),
            "short" => Some(Self::Short),
            _ => None,
        }
    }
}

/// Trade levels of the last analysis, drawn on top of the price chart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOverlay {
    pub symbol: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub direction: Direction,
    /// `Some` when the trailing stop is enabled.
    pub trailing_percent: Option<f64>,
}

impl AnalysisOverlay {
    pub fn validate(&self) -> Result<(), AppError> {
        let levels = [self.entry_price, self.stop_loss, self.take_profit];
        if levels.iter().any(|level| !level.is_finite() || *level <= 0.0) {
            return Err(AppError::InvalidArgument(
                "overlay levels must be finite and positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStopState {
    pub entry: f64,
    pub base_stop: f64,
    pub current_stop: f64,
    pub best_price: Option<f64>,
    pub direction: Direction,
    pub fraction: f64,
}

impl TrailingStopState {
    pub fn new(entry: f64, base_stop: f64, direction: Direction, trailing_percent: Option<f64>) -> Self {
        let percent = trailing_percent
            .filter(|percent| percent.is_finite() && *percent > 0.0)
            .unwrap_or(DEFAULT_TRAILING_PERCENT)
            .min(100.0);

        Self {
            entry,
            base_stop,
            current_stop: base_stop,
            best_price: None,
            direction,
            fraction: percent / 100.0,
        }
    }

    /// Feeds a tick. Returns the new stop when it moved by more than the
    /// reporting threshold; the stop never moves against the position.
    pub fn update(&mut self, price: f64) -> Option<f64> {
        let candidate = match self.direction {
            Direction::Long => {
                if price <= self.entry {
                    return None;
                }
                let best = self.best_price.map_or(price, |best| best.max(price));
                self.best_price = Some(best);
                let trailing = self.entry + (best - self.entry) * self.fraction;
                self.base_stop.max(self.current_stop).max(trailing)
            }
            Direction::Short => {
                if price >= self.entry {
                    return None;
                }
                let best = self.best_price.map_or(price, |best| best.min(price));
                self.best_price = Some(best);
                let trailing = self.entry - (self.entry - best) * self.fraction;
                self.base_stop.min(self.current_stop).min(trailing)
            }
        };

        if (candidate - self.current_stop).abs() > STOP_MOVE_EPSILON {
            self.current_stop = candidate;
            Some(candidate)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LevelHit {
    TakeProfit,
    StopLoss,
}

impl LevelHit {
    pub fn is_profit(self) -> bool {
        self == LevelHit::TakeProfit
    }
}

pub fn check_levels(direction: Direction, price: f64, take_profit: f64, stop: f64) -> Option<LevelHit> {
    match direction {
        Direction::Long if price >= take_profit => Some(LevelHit::TakeProfit),
        Direction::Long if price <= stop => Some(LevelHit::StopLoss),
        Direction::Short if price <= take_profit => Some(LevelHit::TakeProfit),
        Direction::Short if price >= stop => Some(LevelHit::StopLoss),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverlayTick {
    pub stop_moved: Option<f64>,
    pub hit: Option<LevelHit>,
}

/// Overlay currently on the chart plus its per-tick bookkeeping.
#[derive(Debug, Clone)]
pub struct ActiveOverlay {
    pub id: u64,
    pub overlay: AnalysisOverlay,
    pub trailing: Option<TrailingStopState>,
    pub hit: Option<LevelHit>,
}

impl ActiveOverlay {
    pub fn new(id: u64, overlay: AnalysisOverlay) -> Self {
        let trailing = overlay.trailing_percent.map(|percent| {
            TrailingStopState::new(
                overlay.entry_price,
                overlay.stop_loss,
                overlay.direction,
                Some(percent),
            )
        });

        Self {
            id,
            overlay,
            trailing,
            hit: None,
        }
    }

    pub fn effective_stop(&self) -> f64 {
        self.trailing
            .as_ref()
            .map_or(self.overlay.stop_loss, |trailing| trailing.current_stop)
    }

    /// A level fires at most once per overlay.
    pub fn on_price(&mut self, price: f64) -> OverlayTick {
        if self.hit.is_some() {
            return OverlayTick::default();
        }

        let stop_moved = self
            .trailing
            .as_mut()
            .and_then(|trailing| trailing.update(price));
        let hit = check_levels(
            self.overlay.direction,
            price,
            self.overlay.take_profit,
            self.effective_stop(),
        );
        self.hit = hit;

        OverlayTick { stop_moved, hit }
    }

    pub fn lines(&self, series_len: usize) -> OverlayLines {
        let len = series_len.max(1);
        OverlayLines {
            entry: vec![self.overlay.entry_price; len],
            stop_loss: vec![self.effective_stop(); len],
            take_profit: vec![self.overlay.take_profit; len],
            stop_label: if self.trailing.is_some() {
                "Trailing Stop Loss"
            } else {
                "Stop Loss"
            },
        }
    }
}

/// Flat line series spanning the chart's label range.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverlayLines {
    pub entry: Vec<f64>,
    pub stop_loss: Vec<f64>,
    pub take_profit: Vec<f64>,
    pub stop_label: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradingStyle {
    Scalping,
    Daytrading,
    Swing,
    MediumTerm,
    LongTerm,
}

impl TradingStyle {
    /// Accepts the API keys as well as the legacy Russian form labels.
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim() {
            "scalping" | "Скальпинг" => Some(Self::Scalping),
            "daytrading" | "Дейтрейдинг" => Some(Self::Daytrading),
            "swing" | "Свинг" => Some(Self::Swing),
            "medium_term" | "Среднесрочная" => Some(Self::MediumTerm),
            "long_term" | "Долгосрочная" => Some(Self::LongTerm),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scalping => "scalping",
            Self::Daytrading => "daytrading",
            Self::Swing => "swing",
            Self::MediumTerm => "medium_term",
            Self::LongTerm => "long_term",
        }
    }

    pub fn recommended_timeframe(self) -> MarketTimeframe {
        match self {
            Self::Scalping => MarketTimeframe::M5,
            Self::Daytrading => MarketTimeframe::H1,
            Self::Swing => MarketTimeframe::H4,
            Self::MediumTerm => MarketTimeframe::D1,
            Self::LongTerm => MarketTimeframe::W1,
        }
    }

    pub fn overlay_duration(self) -> Duration {
        let minutes = match self {
            Self::Scalping => 5,
            Self::Daytrading => 15,
            Self::Swing => 30,
            Self::MediumTerm => 60,
            Self::LongTerm => 120,
        };
        Duration::from_secs(minutes * 60)
    }
}

pub fn overlay_duration(style: Option<TradingStyle>) -> Duration {
    style.map_or(DEFAULT_OVERLAY_DURATION, TradingStyle::overlay_duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(direction: Direction, trailing_percent: Option<f64>) -> AnalysisOverlay {
        match direction {
            Direction::Long => AnalysisOverlay {
                symbol: "BTCUSDT".to_string(),
                entry_price: 100.0,
                stop_loss: 90.0,
                take_profit: 120.0,
                direction,
                trailing_percent,
            },
            Direction::Short => AnalysisOverlay {
                symbol: "BTCUSDT".to_string(),
                entry_price: 100.0,
                stop_loss: 110.0,
                take_profit: 80.0,
                direction,
                trailing_percent,
            },
        }
    }

    #[test]
    fn long_trailing_stop_follows_best_price() {
        let mut trailing = TrailingStopState::new(100.0, 90.0, Direction::Long, Some(50.0));

        assert_eq!(trailing.update(99.0), None);
        assert_eq!(trailing.update(110.0), Some(105.0));
        assert_eq!(trailing.best_price, Some(110.0));
        // pullback keeps the tightened stop
        assert_eq!(trailing.update(104.0), None);
        assert_eq!(trailing.current_stop, 105.0);
        assert_eq!(trailing.update(120.0), Some(110.0));
    }

    #[test]
    fn short_trailing_stop_follows_best_price() {
        let mut trailing = TrailingStopState::new(100.0, 110.0, Direction::Short, Some(25.0));

        assert_eq!(trailing.update(101.0), None);
        assert_eq!(trailing.update(80.0), Some(95.0));
        assert_eq!(trailing.update(90.0), None);
        assert_eq!(trailing.current_stop, 95.0);
    }

    #[test]
    fn trailing_stop_never_loosens() {
        let mut trailing = TrailingStopState::new(100.0, 90.0, Direction::Long, None);
        let mut previous = trailing.current_stop;
        for price in [101.0, 130.0, 105.0, 125.0, 99.0, 140.0, 100.5] {
            trailing.update(price);
            assert!(trailing.current_stop >= previous);
            assert!(trailing.current_stop >= trailing.base_stop);
            previous = trailing.current_stop;
        }
        assert_eq!(trailing.current_stop, 120.0);
    }

    #[test]
    fn tiny_stop_moves_are_not_reported() {
        let mut trailing = TrailingStopState::new(100.0, 90.0, Direction::Long, Some(50.0));
        assert_eq!(trailing.update(110.0), Some(105.0));
        assert_eq!(trailing.update(110.0015), None);
        assert_eq!(trailing.current_stop, 105.0);
    }

    #[test]
    fn invalid_trailing_percent_falls_back_to_default() {
        let trailing = TrailingStopState::new(100.0, 90.0, Direction::Long, Some(-3.0));
        assert_eq!(trailing.fraction, 0.5);
    }

    #[test]
    fn long_levels_trigger_on_take_profit_and_stop() {
        assert_eq!(check_levels(Direction::Long, 120.0, 120.0, 90.0), Some(LevelHit::TakeProfit));
        assert_eq!(check_levels(Direction::Long, 89.0, 120.0, 90.0), Some(LevelHit::StopLoss));
        assert_eq!(check_levels(Direction::Long, 100.0, 120.0, 90.0), None);
    }

    #[test]
    fn short_levels_invert_comparisons() {
        assert_eq!(check_levels(Direction::Short, 80.0, 80.0, 110.0), Some(LevelHit::TakeProfit));
        assert_eq!(check_levels(Direction::Short, 111.0, 80.0, 110.0), Some(LevelHit::StopLoss));
        assert_eq!(check_levels(Direction::Short, 100.0, 80.0, 110.0), None);
    }

    #[test]
    fn level_hit_fires_once() {
        let mut active = ActiveOverlay::new(1, overlay(Direction::Long, None));

        assert_eq!(active.on_price(121.0).hit, Some(LevelHit::TakeProfit));
        assert_eq!(active.on_price(122.0), OverlayTick::default());
        assert_eq!(active.hit, Some(LevelHit::TakeProfit));
    }

    #[test]
    fn trailing_stop_is_the_effective_stop_for_level_checks() {
        let mut active = ActiveOverlay::new(1, overlay(Direction::Long, Some(50.0)));

        let tick = active.on_price(116.0);
        assert_eq!(tick.stop_moved, Some(108.0));
        assert_eq!(tick.hit, None);

        let tick = active.on_price(107.0);
        assert_eq!(tick.hit, Some(LevelHit::StopLoss));
    }

    #[test]
    fn lines_span_series_length() {
        let active = ActiveOverlay::new(1, overlay(Direction::Short, Some(50.0)));
        let lines = active.lines(4);

        assert_eq!(lines.entry, vec![100.0; 4]);
        assert_eq!(lines.stop_loss, vec![110.0; 4]);
        assert_eq!(lines.take_profit, vec![80.0; 4]);
        assert_eq!(lines.stop_label, "Trailing Stop Loss");

        let plain = ActiveOverlay::new(2, overlay(Direction::Long, None));
        let lines = plain.lines(0);
        assert_eq!(lines.entry.len(), 1);
        assert_eq!(lines.stop_label, "Stop Loss");
    }

    #[test]
    fn trading_styles_map_to_timeframes_and_durations() {
        assert_eq!(
            TradingStyle::parse_str("Свинг").map(TradingStyle::recommended_timeframe),
            Some(MarketTimeframe::H4)
        );
        assert_eq!(
            overlay_duration(TradingStyle::parse_str("scalping")),
            Duration::from_secs(300)
        );
        assert_eq!(
            overlay_duration(Some(TradingStyle::LongTerm)),
            Duration::from_secs(7_200)
        );
        assert_eq!(overlay_duration(TradingStyle::parse_str("unknown")), Duration::from_secs(900));
    }

    #[test]
    fn rejects_non_positive_levels() {
        let mut broken = overlay(Direction::Long, None);
        broken.stop_loss = 0.0;
        assert!(broken.validate().is_err());
        assert!(overlay(Direction::Short, None).validate().is_ok());
    }
}
