use crate::error::Result;
use crate::structs::{Column, DATETIME_FORMAT, MergeConfig, Table, Value};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use std::collections::HashMap;

/// Date-time layouts tried, in order, when coercing text.
const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %I:%M:%S %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%d-%b-%Y %H:%M:%S",
];

/// Date-only layouts, read as midnight.
const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Normalizes one sheet's table before it is collected for merging.
///
/// Steps, each a no-op when its column is absent:
///
/// 1. Drop every column listed in `config.drop_columns`.
/// 2. Drop every column without a single non-null value.
/// 3. Rename `config.time_column` to `config.datetime_column` and coerce its
///    values to `YYYY-MM-DD HH:MM:SS` text; values that do not parse become
///    null.
///
/// The row count is never changed.
pub fn normalize(mut table: Table, config: &MergeConfig) -> Table {
    for name in &config.drop_columns {
        if table.remove_column(name) > 0 {
            debug!("Dropped column {}", name);
        }
    }

    let width = table.width();
    table.retain_columns(|column| column.non_null_count() > 0);
    let dropped = width - table.width();
    if dropped > 0 {
        debug!("Dropped {} all-null column(s)", dropped);
    }
    if width > 0 && table.width() == 0 && table.height() > 0 {
        warn!("Every column was dropped; {} row(s) remain", table.height());
    }

    if let Some(index) = table.position(&config.time_column) {
        if config.datetime_column != config.time_column
            && table.remove_column(&config.datetime_column) > 0
        {
            debug!(
                "Replaced existing {} column with coerced {}",
                config.datetime_column, config.time_column
            );
        }
        // Removing a column before `index` shifts it.
        let index = table.position(&config.time_column).unwrap_or(index);
        if let Some(column) = table.column_mut(index) {
            column.name = config.datetime_column.clone();
            let mut failed = 0;
            for value in column.values.iter_mut() {
                let was_null = value.is_null();
                *value = match coerce_datetime(value) {
                    Some(dt) => Value::Text(dt.format(DATETIME_FORMAT).to_string()),
                    None => {
                        if !was_null {
                            failed += 1;
                        }
                        Value::Null
                    }
                };
            }
            if failed > 0 {
                debug!(
                    "{} value(s) in {} could not be parsed as date-times",
                    failed, config.datetime_column
                );
            }
        }
    }

    table
}

/// Interprets a cell as a date-time, returning `None` when it cannot be.
///
/// Text is matched against RFC 3339 and a set of common layouts; numbers are
/// read as Excel serial day numbers.
///
/// Numeric values are never treated as epoch offsets (e.g. nanoseconds since
/// 1970): a number in a workbook cell is a serial date, so `45292.5` is
/// `2024-01-01 12:00:00`, not an instant a few microseconds after 1970.
pub fn coerce_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Text(s) => parse_datetime_text(s),
        Value::Int(i) => excel_serial_to_datetime(*i as f64),
        Value::Float(f) => excel_serial_to_datetime(*f),
        Value::Bool(_) | Value::Null => None,
    }
}

/// Parses date-time text in any of the accepted layouts.
pub fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Converts an Excel serial day number (1900 date system) to a date-time.
///
/// Fractions of a day are rounded to the nearest millisecond.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round();
    if millis > i64::MAX as f64 {
        return None;
    }
    epoch.checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

/// Concatenates tables row-wise.
///
/// The result's columns are the union of the input columns in first-seen
/// order; a table lacking a column contributes nulls for it. The result has
/// as many rows as all inputs together.
///
/// # Errors
/// Returns `PipelineError::Data` if an input table violates the equal
/// column length invariant.
pub fn concatenate(tables: Vec<Table>) -> Result<Table> {
    let height: usize = tables.iter().map(Table::height).sum();

    let mut order: Vec<String> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    for table in &tables {
        for name in table.column_names() {
            if !slots.contains_key(name) {
                slots.insert(name.to_string(), order.len());
                order.push(name.to_string());
            }
        }
    }

    let mut merged: Vec<Vec<Value>> = vec![Vec::with_capacity(height); order.len()];
    for table in tables {
        let rows = table.height();
        let mut filled = vec![false; order.len()];
        for column in table.into_columns() {
            let slot = slots[&column.name];
            merged[slot].extend(column.values);
            filled[slot] = true;
        }
        for (slot, done) in filled.into_iter().enumerate() {
            if !done {
                merged[slot].extend(std::iter::repeat_n(Value::Null, rows));
            }
        }
    }

    let mut result = Table::with_height(height);
    for (name, values) in order.into_iter().zip(merged) {
        result.push_column(Column::new(name, values))?;
    }
    debug!(
        "Concatenated table: {} rows x {} columns",
        result.height(),
        result.width()
    );
    Ok(result)
}
