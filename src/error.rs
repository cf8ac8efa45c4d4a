use arrow_schema::ArrowError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Glob Error: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("Pattern Error: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("XLS Error: {0}")]
    Xls(#[from] calamine::XlsError),
    #[error("XLSX Error: {0}")]
    Xlsx(#[from] calamine::XlsxError),
    #[error("Parquet Error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow Error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("Data Error: {0}")]
    Data(String),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to write {path}: {source}", path = .path.display())]
    Write {
        path: std::path::PathBuf,
        source: Box<PipelineError>,
    },
    #[error("Logger Error: {0}")]
    Logger(#[from] log::SetLoggerError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
