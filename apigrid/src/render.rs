//! Cell renderers and the terminal table preview.

use std::cmp::Ordering;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ColumnDef, SortOrder};
use crate::response_mapping::get_nested_value;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_true_label() -> String {
    "Yes".to_string()
}

fn default_false_label() -> String {
    "No".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Renderer {
    #[default]
    Default,
    Date {
        #[serde(default = "default_date_format")]
        format: String,
    },
    Boolean {
        #[serde(rename = "trueLabel", default = "default_true_label")]
        true_label: String,
        #[serde(rename = "falseLabel", default = "default_false_label")]
        false_label: String,
    },
}

impl Renderer {
    #[must_use]
    pub fn date() -> Self {
        Renderer::Date {
            format: default_date_format(),
        }
    }

    #[must_use]
    pub fn boolean() -> Self {
        Renderer::Boolean {
            true_label: default_true_label(),
            false_label: default_false_label(),
        }
    }
}

// =====================
// Cells
// =====================

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn parse_date(v: &Value) -> Option<NaiveDateTime> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.naive_utc())
                .ok()
                .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
                .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.naive_utc()),
        _ => None,
    }
}

fn parse_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Format one cell. Values a renderer cannot interpret fall back to the
/// default rendering.
#[must_use]
pub fn render_cell(value: &Value, renderer: &Renderer) -> String {
    match renderer {
        Renderer::Default => scalar_to_string(value),
        Renderer::Date { format } => {
            let Some(dt) = parse_date(value) else {
                return scalar_to_string(value);
            };
            let mut out = String::new();
            // chrono reports unknown specifiers as a fmt error
            if write!(out, "{}", dt.format(format)).is_err() {
                return scalar_to_string(value);
            }
            out
        }
        Renderer::Boolean {
            true_label,
            false_label,
        } => match parse_bool(value) {
            Some(true) => true_label.clone(),
            Some(false) => false_label.clone(),
            None => scalar_to_string(value),
        },
    }
}

// =====================
// Columns
// =====================

/// `created_at` -> `Created At`, using the last path segment.
#[must_use]
pub fn humanize_column_label(path: &str) -> String {
    let last = path.split('.').next_back().unwrap_or(path);
    let spaced = last.replace(['_', '-'], " ");
    let mut out_words: Vec<String> = Vec::new();
    for w in spaced.split_whitespace() {
        let mut chars = w.chars();
        if let Some(first) = chars.next() {
            let mut s = String::new();
            s.push(first.to_ascii_uppercase());
            for c in chars {
                s.push(c.to_ascii_lowercase());
            }
            out_words.push(s);
        }
    }
    if out_words.is_empty() {
        last.to_string()
    } else {
        out_words.join(" ")
    }
}

fn infer_renderer(sample: &Value) -> Renderer {
    match sample {
        Value::Bool(_) => Renderer::boolean(),
        Value::String(_) if parse_date(sample).is_some() => Renderer::date(),
        _ => Renderer::Default,
    }
}

fn note_path<'a>(paths: &mut Vec<(String, Option<&'a Value>)>, path: String, sample: &'a Value) {
    let sample = (!sample.is_null()).then_some(sample);
    if let Some((_, existing)) = paths.iter_mut().find(|(p, _)| *p == path) {
        if existing.is_none() {
            *existing = sample;
        }
    } else {
        paths.push((path, sample));
    }
}

/// Columns derived from item keys in first-seen order. Nested objects are
/// flattened one level into `outer.inner` paths.
#[must_use]
pub fn suggest_columns(items: &[Value]) -> Vec<ColumnDef> {
    let mut paths: Vec<(String, Option<&Value>)> = Vec::new();
    for item in items {
        if let Value::Object(map) = item {
            for (k, v) in map {
                match v {
                    Value::Object(inner) => {
                        for (inner_k, inner_v) in inner {
                            note_path(&mut paths, format!("{k}.{inner_k}"), inner_v);
                        }
                    }
                    _ => note_path(&mut paths, k.clone(), v),
                }
            }
        }
    }
    paths
        .into_iter()
        .map(|(path, sample)| {
            let renderer = sample.map(infer_renderer).unwrap_or_default();
            let title = humanize_column_label(&path);
            ColumnDef::new(path, title).with_renderer(renderer)
        })
        .collect()
}

// =====================
// Sorting and paging
// =====================

fn compare_present(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => scalar_to_string(a).cmp(&scalar_to_string(b)),
    }
}

/// Stable local sort by a dot path. Missing and null values go last in both
/// directions.
pub fn sort_items(items: &mut [Value], key: &str, order: SortOrder) {
    items.sort_by(|a, b| {
        let a = get_nested_value(a, key).filter(|v| !v.is_null());
        let b = get_nested_value(b, key).filter(|v| !v.is_null());
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => match order {
                SortOrder::Asc => compare_present(x, y),
                SortOrder::Desc => compare_present(y, x),
            },
        }
    });
}

/// The rows of `page` (counted from `first_page`) for local paging.
#[must_use]
pub fn page_slice(items: &[Value], page: u32, page_size: u32, first_page: u32) -> &[Value] {
    if page_size == 0 {
        return items;
    }
    let size = page_size as usize;
    let start = (page.saturating_sub(first_page) as usize).saturating_mul(size);
    if start >= items.len() {
        return &[];
    }
    let end = (start + size).min(items.len());
    &items[start..end]
}

/// `Showing 11-20 of 50`. `offset` is the zero-based index of the first row.
#[must_use]
pub fn page_summary(offset: u64, shown: usize, total: u64) -> String {
    if shown == 0 {
        return format!("No records (total {total})");
    }
    let first = offset + 1;
    let last = offset + shown as u64;
    format!("Showing {first}-{last} of {total}")
}

// =====================
// Table
// =====================

fn truncate_cell(cell: String, width: Option<u16>) -> String {
    match width {
        Some(w) if cell.chars().count() > usize::from(w) && w > 3 => {
            let kept: String = cell.chars().take(usize::from(w) - 3).collect();
            format!("{kept}...")
        }
        _ => cell,
    }
}

/// ASCII grid of `items`. With no columns configured, columns are suggested
/// from the items.
#[must_use]
pub fn render_table(items: &[Value], columns: &[ColumnDef]) -> String {
    if items.is_empty() {
        return "(empty)\n".to_string();
    }

    let suggested;
    let columns = if columns.is_empty() {
        suggested = suggest_columns(items);
        suggested.as_slice()
    } else {
        columns
    };
    let mut lines: Vec<String> = Vec::new();
    if columns.is_empty() {
        for (i, item) in items.iter().enumerate() {
            lines.push(format!("{:<6} {}", i, scalar_to_string(item)));
        }
        return finish_lines(&lines);
    }

    // Header labels, multi-line by whitespace
    let header_lines: Vec<Vec<String>> = columns
        .iter()
        .map(|c| {
            let label = if c.title.trim().is_empty() {
                humanize_column_label(&c.key)
            } else {
                c.title.clone()
            };
            label.split_whitespace().map(str::to_string).collect()
        })
        .collect();
    let header_max_lines = header_lines.iter().map(Vec::len).max().unwrap_or(1);

    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| {
            columns
                .iter()
                .map(|c| {
                    let value = get_nested_value(item, &c.key).unwrap_or(&Value::Null);
                    truncate_cell(render_cell(value, &c.renderer), c.width)
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = header_lines
        .iter()
        .map(|parts| parts.iter().map(|s| s.chars().count()).max().unwrap_or(0))
        .collect();
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut sep_line = String::from("+");
    for w in &widths {
        sep_line.push_str(&"-".repeat(w + 2));
        sep_line.push('+');
    }
    lines.push(sep_line.clone());

    for line_idx in 0..header_max_lines {
        let parts: Vec<String> = header_lines
            .iter()
            .enumerate()
            .map(|(i, col_parts)| {
                let s = col_parts.get(line_idx).map_or("", String::as_str);
                format!(" {:<width$} ", s, width = widths[i])
            })
            .collect();
        lines.push(format!("|{}|", parts.join("|")));
    }
    lines.push(sep_line.clone());

    for row in &rows {
        let parts: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!(" {:<width$} ", cell, width = widths[i]))
            .collect();
        lines.push(format!("|{}|", parts.join("|")));
    }
    lines.push(sep_line);
    finish_lines(&lines)
}

fn finish_lines(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
