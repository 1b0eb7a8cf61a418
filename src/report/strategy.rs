use super::escape_html;
use super::render_bold;
use serde::Deserialize;
use std::collections::HashMap;

pub const NO_STRATEGY_DATA: &str = "No strategy data yet.";
pub const INSUFFICIENT_DATA: &str = "Not enough closed trades for a summary yet.";

const PROFIT_COLOR: &str = "#34D399";
const LOSS_COLOR: &str = "#EF4444";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrategyStat {
    #[serde(default)]
    pub total_trades: u32,
    #[serde(default)]
    pub successful_trades: u32,
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default)]
    pub avg_profit_percent: f64,
    #[serde(default)]
    pub total_profit_percent: f64,
    #[serde(default)]
    pub max_profit: Option<f64>,
    #[serde(default)]
    pub max_loss: Option<f64>,
}

/// Summary text to HTML: escaped, `**bold**` per line, blank-line runs
/// collapsed, newlines as `<br>`.
pub fn format_summary(summary: Option<&str>) -> String {
    let Some(summary) = summary.filter(|text| !text.trim().is_empty()) else {
        return INSUFFICIENT_DATA.to_string();
    };

    let normalized = summary.replace('\r', "");
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0usize;
    for line in normalized.split('\n') {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(render_bold(&escape_html(line)));
    }
    lines.join("<br>")
}

fn percent_or_na(value: Option<f64>) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{value:.2}%"),
        _ => "N/A".to_string(),
    }
}

/// Strategy stats ordered by average profit, best first.
pub fn sorted_strategies(stats: &HashMap<String, StrategyStat>) -> Vec<(&str, &StrategyStat)> {
    let mut sorted: Vec<(&str, &StrategyStat)> = stats
        .iter()
        .map(|(name, stat)| (name.as_str(), stat))
        .collect();
    sorted.sort_by(|left, right| {
        right
            .1
            .avg_profit_percent
            .total_cmp(&left.1.avg_profit_percent)
            .then_with(|| left.0.cmp(right.0))
    });
    sorted
}

pub fn render_strategy_table(stats: &HashMap<String, StrategyStat>) -> String {
    if stats.is_empty() {
        return format!("<p>{NO_STRATEGY_DATA}</p>");
    }

    let mut html = String::from(
        r#"<table class="report-table"><thead><tr><th>Strategy</th><th>Trades</th><th>Successful</th><th>Win rate</th><th>Avg profit</th><th>Total profit</th><th>Max profit</th><th>Max loss</th></tr></thead><tbody>"#,
    );

    for (name, stat) in sorted_strategies(stats) {
        let profit_color = if stat.avg_profit_percent >= 0.0 {
            PROFIT_COLOR
        } else {
            LOSS_COLOR
        };
        html.push_str("<tr>");
        html.push_str(&format!("<td><strong>{}</strong></td>", escape_html(name)));
        html.push_str(&format!("<td>{}</td>", stat.total_trades));
        html.push_str(&format!("<td>{}</td>", stat.successful_trades));
        html.push_str(&format!("<td>{:.1}%</td>", stat.win_rate));
        html.push_str(&format!(
            r#"<td style="color: {profit_color}">{:.2}%</td>"#,
            stat.avg_profit_percent
        ));
        html.push_str(&format!(
            r#"<td style="color: {profit_color}">{:.2}%</td>"#,
            stat.total_profit_percent
        ));
        html.push_str(&format!(
            r#"<td style="color: {PROFIT_COLOR}">{}</td>"#,
            percent_or_na(stat.max_profit)
        ));
        html.push_str(&format!(
            r#"<td style="color: {LOSS_COLOR}">{}</td>"#,
            percent_or_na(stat.max_loss)
        ));
        html.push_str("</tr>");
    }

    html.push_str("</tbody></table>");
    html
}
