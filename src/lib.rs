pub mod error;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod structs;
pub mod transform;

// Re-export public API
pub use error::{PipelineError, Result};
pub use extract::{discover, load};
pub use load::{write, write_csv, write_json, write_parquet};
pub use pipeline::{FileFailure, MergeOutcome, MergeReport, RunOptions, merge_directory, run};
pub use structs::{
    Column, MergeConfig, OutputFormat, Sheet, SimpleLogger, SpreadsheetFile, Table, Value,
    WorkbookFormat,
};
pub use transform::{concatenate, normalize};
