use crate::error::{PipelineError, Result};
use crate::extract::{discover, load};
use crate::load::write;
use crate::structs::{MergeConfig, OutputFormat, Sheet, SpreadsheetFile, Table};
use crate::transform::{concatenate, normalize};
use log::{debug, error};
use std::path::{Path, PathBuf};

/// A workbook that could not be loaded, with the reason.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: PipelineError,
}

/// Result of a merge that produced a table.
#[derive(Debug)]
pub struct MergeReport {
    /// Number of workbooks found in the input folder
    pub discovered: usize,
    /// Workbooks whose sheets all loaded, in processing order
    pub loaded: Vec<PathBuf>,
    /// Workbooks skipped because they failed to load
    pub failures: Vec<FileFailure>,
    /// Number of sheets merged
    pub sheets: usize,
    pub table: Table,
}

/// How a merge run ended. All three are successful terminations.
#[derive(Debug)]
pub enum MergeOutcome {
    /// The folder holds no `.xls` or `.xlsx` file.
    NoInputFiles,
    /// Every workbook failed to load.
    NoValidData {
        discovered: usize,
        failures: Vec<FileFailure>,
    },
    Merged(MergeReport),
}

/// Everything `run` needs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_dir: PathBuf,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub config: MergeConfig,
}

impl RunOptions {
    /// Default output location: `merged.<ext>` inside the input folder.
    pub fn default_output(input_dir: &Path, format: OutputFormat) -> PathBuf {
        input_dir.join(format!("merged.{}", format.extension()))
    }
}

/// Discovers, loads, normalizes and concatenates every workbook in `input_dir`.
///
/// Workbooks are processed one at a time in discovery order and sheets in
/// workbook order. A workbook that fails to load is logged and skipped; the
/// rest of the batch carries on.
///
/// # Errors
/// Returns `PipelineError` only if the folder itself cannot be scanned or the
/// collected tables cannot be concatenated.
pub fn merge_directory(input_dir: &Path, config: &MergeConfig) -> Result<MergeOutcome> {
    let files = discover(input_dir)?;
    if files.is_empty() {
        return Ok(MergeOutcome::NoInputFiles);
    }
    let discovered = files.len();

    let results: Vec<(SpreadsheetFile, Result<Vec<Sheet>>)> = files
        .into_iter()
        .map(|file| {
            let sheets = load(&file);
            (file, sheets)
        })
        .collect();

    let mut tables = Vec::new();
    let mut loaded = Vec::new();
    let mut failures = Vec::new();
    for (file, sheets) in results {
        match sheets {
            Ok(sheets) => {
                debug!(
                    "Loaded {} sheet(s) from {}",
                    sheets.len(),
                    file.path.display()
                );
                for sheet in sheets {
                    debug!("Normalizing sheet {}", sheet.name);
                    tables.push(normalize(sheet.table, config));
                }
                loaded.push(file.path);
            }
            Err(err) => {
                error!("Error processing {}: {}", file.path.display(), err);
                failures.push(FileFailure {
                    path: file.path,
                    error: err,
                });
            }
        }
    }

    if tables.is_empty() {
        return Ok(MergeOutcome::NoValidData {
            discovered,
            failures,
        });
    }

    let sheets = tables.len();
    let table = concatenate(tables)?;
    Ok(MergeOutcome::Merged(MergeReport {
        discovered,
        loaded,
        failures,
        sheets,
        table,
    }))
}

/// Runs a merge and writes the result when there is one.
///
/// Nothing is written for `NoInputFiles` or `NoValidData`.
///
/// # Errors
/// Returns `PipelineError` if scanning the folder fails, or
/// `PipelineError::Write` naming the output path if writing it fails.
pub fn run(options: &RunOptions) -> Result<MergeOutcome> {
    let outcome = merge_directory(&options.input_dir, &options.config)?;
    if let MergeOutcome::Merged(report) = &outcome {
        write(&report.table, &options.output, options.format).map_err(|err| {
            PipelineError::Write {
                path: options.output.clone(),
                source: Box::new(err),
            }
        })?;
    }
    Ok(outcome)
}
