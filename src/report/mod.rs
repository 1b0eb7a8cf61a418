mod strategy;
mod table;

pub use strategy::{format_summary, render_strategy_table, sorted_strategies, StrategyStat};
pub use table::{escape_html, md_table_to_html};

use table::{parse_table, render_table};

pub const DEFAULT_REPORT_TITLE: &str = "Trading Report";

const GENERATED_MARKERS: [&str; 4] = ["Generated", "generated", "Сгенерировано", "Згенеровано"];
const MARKET_MARKERS: [&str; 4] = [
    "Current market",
    "current market",
    "Текущий рынок",
    "Поточний ринок",
];
const BULL_MARKERS: [&str; 4] = ["бычий", "uptrend", "бичий", "bullish"];
const BEAR_MARKERS: [&str; 4] = ["медвежий", "downtrend", "ведмежий", "bearish"];
const LONG_MARKERS: [&str; 2] = ["long", "лонг"];
const SHORT_MARKERS: [&str; 2] = ["short", "шорт"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportHeader {
    pub title: Option<String>,
    pub generated: Option<String>,
    pub bias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub title: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasTone {
    Bull,
    Bear,
    Neutral,
}

impl BiasTone {
    pub fn detect(bias: &str) -> Self {
        let lowered = bias.to_lowercase();
        if BULL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            Self::Bull
        } else if BEAR_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            Self::Bear
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bull => "bull",
            Self::Bear => "bear",
            Self::Neutral => "neutral",
        }
    }
}

/// Text after `marker`, past any `:` and whitespace.
fn value_after_marker(line: &str, markers: &[&str]) -> Option<String> {
    markers.iter().find_map(|marker| {
        let start = line.find(marker)? + marker.len();
        let value = line[start..].trim_start_matches(|ch: char| ch == ':' || ch.is_whitespace());
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub fn parse_report(text: &str) -> (ReportHeader, Vec<ReportSection>) {
    let normalized = text.replace('\r', "");
    let mut header = ReportHeader::default();
    let mut sections: Vec<ReportSection> = Vec::new();
    let mut in_header = true;

    for raw_line in normalized.split('\n') {
        if let Some(title) = raw_line.strip_prefix("### ") {
            in_header = false;
            sections.push(ReportSection {
                title: title.trim().to_string(),
                lines: Vec::new(),
            });
            continue;
        }

        if in_header {
            let line = raw_line.trim();
            if line.starts_with("=== ") && line.ends_with(" ===") {
                let title = line.replace('=', "").trim().to_string();
                header.title = (!title.is_empty()).then_some(title);
            } else if let Some(generated) = value_after_marker(line, &GENERATED_MARKERS) {
                header.generated = Some(generated);
            } else if let Some(bias) = value_after_marker(line, &MARKET_MARKERS) {
                header.bias = Some(bias);
            }
        } else if let Some(section) = sections.last_mut() {
            section.lines.push(raw_line.to_string());
        }
    }

    (header, sections)
}

fn is_levels_title(title: &str) -> bool {
    let lowered = title.to_lowercase();
    ["level", "уровн", "рівн"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn mentions_any(text: &str, markers: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    markers.iter().any(|marker| lowered.contains(marker))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Long,
    Short,
}

/// A `**Long**` / `**Лонг**` style marker line, with the label as written.
fn side_marker(line: &str) -> Option<(Side, String)> {
    let label = line.trim().strip_prefix("**")?.strip_suffix("**")?.trim();
    let side = match label.to_lowercase().as_str() {
        "long" | "лонг" => Side::Long,
        "short" | "шорт" => Side::Short,
        _ => return None,
    };
    Some((side, label.to_string()))
}

struct SideCard {
    title: String,
    body: String,
}

fn render_side_cards(long: SideCard, short: SideCard) -> String {
    let mut html = String::from(r#"<div class="subcards">"#);
    for card in [long, short] {
        if card.body.is_empty() {
            continue;
        }
        html.push_str(r#"<div class="card"><div class="card-title">"#);
        html.push_str(&escape_html(&card.title));
        html.push_str("</div>");
        html.push_str(&card.body);
        html.push_str("</div>");
    }
    html.push_str("</div>");
    html
}

/// Splits trade levels into a long and a short table: by `**Long**` /
/// `**Short**` marker lines when present, else by the columns of a single
/// table whose header names both sides.
fn render_levels(lines: &[String]) -> String {
    let has_markers = lines.iter().any(|line| side_marker(line).is_some());
    if has_markers {
        let mut long_lines: Vec<&str> = Vec::new();
        let mut short_lines: Vec<&str> = Vec::new();
        let mut long_title = String::from("Long");
        let mut short_title = String::from("Short");
        let mut side = None;
        for line in lines {
            if let Some((marker, label)) = side_marker(line) {
                match marker {
                    Side::Long => long_title = label,
                    Side::Short => short_title = label,
                }
                side = Some(marker);
                continue;
            }
            if !line.contains('|') {
                continue;
            }
            match side {
                Some(Side::Long) => long_lines.push(line),
                Some(Side::Short) => short_lines.push(line),
                None => {}
            }
        }
        return render_side_cards(
            SideCard {
                title: long_title,
                body: md_table_to_html(&long_lines),
            },
            SideCard {
                title: short_title,
                body: md_table_to_html(&short_lines),
            },
        );
    }

    let table_lines: Vec<&str> = lines
        .iter()
        .map(String::as_str)
        .filter(|line| line.contains('|'))
        .collect();
    let Some((header, rows)) = parse_table(&table_lines) else {
        return String::new();
    };

    let long_index = header.iter().position(|cell| mentions_any(cell, &LONG_MARKERS));
    let short_index = header.iter().position(|cell| mentions_any(cell, &SHORT_MARKERS));
    let label_indexes: Vec<usize> = (0..header.len())
        .filter(|index| Some(*index) != long_index && Some(*index) != short_index)
        .collect();

    let (Some(long_index), Some(short_index)) = (long_index, short_index) else {
        return render_table(&header, &rows);
    };
    if label_indexes.is_empty() {
        return render_table(&header, &rows);
    }

    let project = |side_index: usize| {
        let columns: Vec<usize> = label_indexes
            .iter()
            .copied()
            .chain(std::iter::once(side_index))
            .collect();
        let side_header: Vec<String> = columns.iter().map(|index| header[*index].clone()).collect();
        let side_rows: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|index| row.get(*index).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        render_table(&side_header, &side_rows)
    };

    render_side_cards(
        SideCard {
            title: header[long_index].clone(),
            body: project(long_index),
        },
        SideCard {
            title: header[short_index].clone(),
            body: project(short_index),
        },
    )
}

fn render_list(lines: &[String]) -> String {
    let mut html = String::from(r#"<ul class="report-list">"#);
    for item in lines
        .iter()
        .filter_map(|line| line.trim().strip_prefix("- "))
    {
        html.push_str("<li>");
        html.push_str(&escape_html(item));
        html.push_str("</li>");
    }
    html.push_str("</ul>");
    html
}

/// `key:\n value` becomes `key: value`.
fn join_colon_breaks(text: &str) -> String {
    let mut joined = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(position) = rest.find(':') {
        joined.push_str(&rest[..=position]);
        rest = &rest[position + 1..];

        let whitespace_len = rest.len() - rest.trim_start().len();
        let whitespace = &rest[..whitespace_len];
        if let Some(last_break) = whitespace.rfind('\n') {
            joined.push(' ');
            rest = &rest[last_break + 1..];
        }
    }
    joined.push_str(rest);
    joined
}

/// `**bold**` pairs on one line become `<strong>`; an unpaired `**` is kept.
pub(crate) fn render_bold(line: &str) -> String {
    let mut html = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find("**") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("**") else {
            break;
        };
        html.push_str(&rest[..open]);
        html.push_str("<strong>");
        html.push_str(&after_open[..close]);
        html.push_str("</strong>");
        rest = &after_open[close + 2..];
    }
    html.push_str(rest);
    html
}

fn render_text(lines: &[String]) -> String {
    let text = lines.join("\n");
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let escaped = escape_html(&join_colon_breaks(text));
    let mut html = String::from(r#"<div class="report-text">"#);
    for line in escaped.split('\n').map(str::trim).filter(|line| !line.is_empty()) {
        let line = render_bold(line).replace("[DIVIDER]", r#"<div class="backtest-divider"></div>"#);
        html.push_str(r#"<div class="report-line">"#);
        html.push_str(&line);
        html.push_str("</div>");
    }
    html.push_str("</div>");
    html
}

fn render_section_body(section: &ReportSection) -> String {
    let lines = &section.lines;
    let has_table = lines.iter().any(|line| line.contains('|'));
    if has_table && is_levels_title(&section.title) {
        return render_levels(lines);
    }
    if has_table {
        let table_lines: Vec<&str> = lines
            .iter()
            .map(String::as_str)
            .filter(|line| line.contains('|'))
            .collect();
        return md_table_to_html(&table_lines);
    }
    let first_line = lines.iter().map(|line| line.trim()).find(|line| !line.is_empty());
    if first_line.is_some_and(|line| line.starts_with("- ")) {
        return render_list(lines);
    }
    render_text(lines)
}

/// Renders the analysis report text (a header block followed by `### `
/// sections) to HTML. Pure and deterministic.
pub fn render_report(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let (header, sections) = parse_report(text);
    let title = header.title.as_deref().unwrap_or(DEFAULT_REPORT_TITLE);

    let mut html = String::from(r#"<div class="report"><div class="report-header">"#);
    html.push_str(r#"<div class="report-title">"#);
    html.push_str(&escape_html(title));
    html.push_str("</div>");
    if let Some(bias) = header.bias.as_deref() {
        html.push_str(&format!(
            r#"<div class="chip {}">{}</div>"#,
            BiasTone::detect(bias).as_str(),
            escape_html(bias)
        ));
    }
    if let Some(generated) = header.generated.as_deref() {
        html.push_str(r#"<div class="report-meta">Generated: "#);
        html.push_str(&escape_html(generated));
        html.push_str("</div>");
    }
    html.push_str("</div>");

    for section in &sections {
        html.push_str(r#"<div class="section"><div class="section-title">"#);
        html.push_str(&escape_html(&section.title));
        html.push_str("</div>");
        html.push_str(&render_section_body(section));
        html.push_str("</div>");
    }

    html.push_str("</div>");
    html
}
