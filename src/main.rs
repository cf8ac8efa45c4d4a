use clap::Parser;
use lib::{MergeConfig, MergeOutcome, OutputFormat, PipelineError, RunOptions, SimpleLogger, run};
use log::{debug, error};
use std::path::PathBuf;
use std::time::Instant;

static LOGGER: SimpleLogger = SimpleLogger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder containing the .xls / .xlsx workbooks to merge (not searched recursively)
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Output file (defaults to merged.<format> inside the input folder)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output file format
    #[arg(short, long, default_value = "csv")]
    format: OutputFormat,

    /// Columns removed from every sheet (e.g., "Serial number,Batch")
    #[arg(long, value_delimiter = ',', default_value = "Serial number")]
    drop_column: Vec<String>,

    /// Column renamed and converted to date-times
    #[arg(long, default_value = "Time")]
    time_column: String,

    /// New name of the converted date-time column
    #[arg(long, default_value = "Datetime")]
    datetime_column: String,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,
}

fn main() -> Result<(), PipelineError> {
    // Initialize timer and logger
    let total_start = Instant::now();
    log::set_logger(&LOGGER)?;

    // Acquire CLI args
    let args = Args::parse();
    if args.debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| RunOptions::default_output(&args.input_dir, args.format));
    let config = MergeConfig {
        drop_columns: args.drop_column,
        time_column: args.time_column,
        datetime_column: args.datetime_column,
    };

    // UI
    println!("Sheet Merger! Workbook folder to single table");
    debug!(
        "Input folder: {} | Output: {} ({:?})",
        args.input_dir.display(),
        output.display(),
        args.format
    );
    debug!("Merge configuration: {}", serde_json::to_string(&config)?);

    let options = RunOptions {
        input_dir: args.input_dir,
        output,
        format: args.format,
        config,
    };

    println!("Starting merge...");
    let outcome = match run(&options) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("{}", err);
            return Err(err);
        }
    };

    match outcome {
        MergeOutcome::NoInputFiles => {
            println!("No .xls or .xlsx files found in the folder!");
        }
        MergeOutcome::NoValidData {
            discovered,
            failures,
        } => {
            debug!("{} of {} workbook(s) failed to load", failures.len(), discovered);
            println!("No valid data found to merge.");
        }
        MergeOutcome::Merged(report) => {
            println!(
                "Merged {} sheet(s) into {} rows x {} columns",
                report.sheets,
                report.table.height(),
                report.table.width()
            );
            for failure in &report.failures {
                debug!("  - skipped {}", failure.path.display());
            }
            println!(
                "Successfully combined {} of {} files into {}",
                report.loaded.len(),
                report.discovered,
                options.output.display()
            );
        }
    }

    println!("\nTotal runtime: {:.2?}", total_start.elapsed());
    Ok(())
}
