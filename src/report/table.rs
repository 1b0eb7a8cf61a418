/// Escapes the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn is_separator_row(line: &str) -> bool {
    line.chars().all(|ch| matches!(ch, '-' | '|' | ' ' | ':'))
}

/// Splits a markdown table row into trimmed cells. Leading and trailing pipes
/// are edges, not empty cells.
pub fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// Header row plus body rows, separator rows dropped.
pub fn parse_table<S: AsRef<str>>(lines: &[S]) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let mut rows = lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter(|line| !line.is_empty() && !is_separator_row(line))
        .map(split_row);

    let header = rows.next()?;
    Some((header, rows.collect()))
}

/// Body rows are padded or cut to the header width.
pub fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut html = String::from(r#"<table class="report-table"><thead><tr>"#);
    for cell in header {
        html.push_str("<th>");
        html.push_str(&escape_html(cell));
        html.push_str("</th>");
    }
    html.push_str("</tr></thead><tbody>");

    for row in rows {
        html.push_str("<tr>");
        for index in 0..header.len() {
            html.push_str("<td>");
            html.push_str(&escape_html(row.get(index).map(String::as_str).unwrap_or("")));
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }

    html.push_str("</tbody></table>");
    html
}

pub fn md_table_to_html<S: AsRef<str>>(lines: &[S]) -> String {
    match parse_table(lines) {
        Some((header, rows)) => render_table(&header, &rows),
        None => String::new(),
    }
}
