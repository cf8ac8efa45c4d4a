use chrono::NaiveDateTime;
use log::{Level, Log, Metadata, Record as LogRecord};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Canonical textual form of every date-time written to the output.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Simple logger implementation
///
/// Errors and warnings go to stderr, everything else to stdout.
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &LogRecord) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Error | Level::Warn => eprintln!("[{}] {}", record.level(), record.args()),
            _ => println!("[{}] {}", record.level(), record.args()),
        }
    }

    fn flush(&self) {}
}

/// A single cell value, tagged with the type the workbook reader inferred.
///
/// `Null` is the null marker: empty cells, blank text and values that failed
/// coercion all end up here and are rendered as an empty field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Renders the value the way it appears in a delimited text file.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
        }
    }

    /// Numeric view used by the Parquet writer.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::DateTime(_) => serializer.serialize_str(&self.render()),
        }
    }
}

/// A named column of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Number of non-null entries.
    pub fn non_null_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_null()).count()
    }
}

/// Schema-less row/column table.
///
/// Every column holds exactly `height` values. The height is tracked
/// separately so a table whose columns were all removed still reports
/// its rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    height: usize,
    columns: Vec<Column>,
}

impl Table {
    /// Creates a table with `height` rows and no columns.
    pub fn with_height(height: usize) -> Self {
        Self {
            height,
            columns: Vec::new(),
        }
    }

    /// Builds a table from columns, checking that all lengths agree.
    pub fn from_columns(columns: Vec<Column>) -> crate::Result<Self> {
        let height = columns.first().map_or(0, |c| c.values.len());
        let mut table = Self::with_height(height);
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn push_column(&mut self, column: Column) -> crate::Result<()> {
        if column.values.len() != self.height {
            return Err(crate::PipelineError::Data(format!(
                "Column {} has {} values, table has {} rows",
                column.name,
                column.values.len(),
                self.height
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Removes every column matching `name`, returning how many were removed.
    pub fn remove_column(&mut self, name: &str) -> usize {
        let before = self.columns.len();
        self.columns.retain(|c| c.name != name);
        before - self.columns.len()
    }

    /// Keeps only the columns for which `keep` returns true.
    pub fn retain_columns<F: FnMut(&Column) -> bool>(&mut self, keep: F) {
        self.columns.retain(keep);
    }

    pub fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Iterates over row `index` in column order.
    pub fn row(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.columns.iter().map(move |c| &c.values[index])
    }

    /// Serializable view of row `index` keyed by column name.
    pub fn row_record(&self, index: usize) -> RowRecord<'_> {
        RowRecord {
            columns: &self.columns,
            index,
        }
    }
}

/// One table row serialized as a map whose keys follow column order.
pub struct RowRecord<'a> {
    columns: &'a [Column],
    index: usize,
}

impl Serialize for RowRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in self.columns {
            map.serialize_entry(&column.name, &column.values[self.index])?;
        }
        map.end()
    }
}

/// Workbook encoding, decided purely from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    /// Legacy binary `.xls`
    Xls,
    /// Zip-based `.xlsx`
    Xlsx,
}

impl WorkbookFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(OsStr::to_str)?;
        if ext.eq_ignore_ascii_case("xls") {
            Some(Self::Xls)
        } else if ext.eq_ignore_ascii_case("xlsx") {
            Some(Self::Xlsx)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
        }
    }
}

/// A discovered workbook on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetFile {
    pub path: PathBuf,
    pub format: WorkbookFormat,
}

/// One named sheet loaded into memory.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub table: Table,
}

/// Configuration for sheet normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Columns removed from every sheet when present
    pub drop_columns: Vec<String>,
    /// Column renamed and coerced to date-times
    pub time_column: String,
    /// New name of the coerced column
    pub datetime_column: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            drop_columns: vec!["Serial number".to_string()],
            time_column: "Time".to_string(),
            datetime_column: "Datetime".to_string(),
        }
    }
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Parquet => "parquet",
        }
    }
}
