use crate::error::{PipelineError, Result};
use crate::structs::{Column, Sheet, SpreadsheetFile, Table, Value, WorkbookFormat};
use crate::transform::parse_datetime_text;
use calamine::{Data, Range, Reader, Xls, Xlsx, open_workbook};
use glob::{MatchOptions, Pattern, glob_with};
use log::debug;
use std::collections::HashSet;
use std::fs;
use std::io::{Read, Seek};
use std::path::Path;

/// Scans `directory` (non-recursively) for `.xls` and `.xlsx` workbooks.
///
/// Extensions are matched case-insensitively and only regular files are
/// returned. The result is sorted by path so repeated runs over an unchanged
/// folder visit the workbooks in the same order.
///
/// # Errors
/// Returns an error if the directory does not exist, is not a directory, or
/// an entry cannot be read while scanning.
pub fn discover(directory: &Path) -> Result<Vec<SpreadsheetFile>> {
    let metadata = fs::metadata(directory)?;
    if !metadata.is_dir() {
        return Err(PipelineError::Data(format!(
            "Not a directory: {}",
            directory.display()
        )));
    }

    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let base = Pattern::escape(&directory.to_string_lossy());

    let mut files = Vec::new();
    for format in [WorkbookFormat::Xls, WorkbookFormat::Xlsx] {
        let pattern = Path::new(&base).join(format!("*.{}", format.extension()));
        for entry in glob_with(&pattern.to_string_lossy(), options)? {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            if WorkbookFormat::from_path(&path) == Some(format) {
                files.push(SpreadsheetFile { path, format });
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
    debug!(
        "Discovered {} workbook(s) in {}",
        files.len(),
        directory.display()
    );
    Ok(files)
}

/// Loads every sheet of a workbook, in workbook order.
///
/// The reader is picked from the file extension alone: a `.xls` file is
/// always opened with the legacy binary reader and a `.xlsx` file with the
/// zip-based one. A file either yields all of its sheets or an error.
///
/// # Errors
/// Returns an error if the workbook cannot be opened or any of its sheets
/// cannot be read.
pub fn load(file: &SpreadsheetFile) -> Result<Vec<Sheet>> {
    debug!(
        "Opening {} as {}",
        file.path.display(),
        file.format.extension()
    );
    match file.format {
        WorkbookFormat::Xls => {
            let mut workbook: Xls<_> = open_workbook(&file.path)?;
            read_sheets(&mut workbook)
        }
        WorkbookFormat::Xlsx => {
            let mut workbook: Xlsx<_> = open_workbook(&file.path)?;
            read_sheets(&mut workbook)
        }
    }
}

fn read_sheets<RS, W>(workbook: &mut W) -> Result<Vec<Sheet>>
where
    RS: Read + Seek,
    W: Reader<RS>,
    PipelineError: From<W::Error>,
{
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let table = table_from_range(&range)?;
        debug!(
            "Sheet {}: {} rows x {} columns",
            name,
            table.height(),
            table.width()
        );
        sheets.push(Sheet { name, table });
    }
    Ok(sheets)
}

/// Converts a sheet range into a table, using the first row as the header.
fn table_from_range(range: &Range<Data>) -> Result<Table> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };

    let names = header_names(header);
    let mut values: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
    for row in rows {
        for (index, column) in values.iter_mut().enumerate() {
            column.push(row.get(index).map_or(Value::Null, convert_cell));
        }
    }

    let height = values.first().map_or(0, Vec::len);
    let mut table = Table::with_height(height);
    for (name, values) in names.into_iter().zip(values) {
        table.push_column(Column::new(name, values))?;
    }
    Ok(table)
}

/// Builds unique column names from a header row.
///
/// Blank headers become `Unnamed: <index>`; repeated names get a `.1`,
/// `.2`, ... suffix.
fn header_names(header: &[Data]) -> Vec<String> {
    let mut used = HashSet::new();
    header
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            let rendered = convert_cell(cell).render();
            let base = if rendered.trim().is_empty() {
                format!("Unnamed: {}", index)
            } else {
                rendered
            };

            let mut name = base.clone();
            let mut suffix = 1;
            while used.contains(&name) {
                name = format!("{}.{}", base, suffix);
                suffix += 1;
            }
            used.insert(name.clone());
            name
        })
        .collect()
}

/// Maps a calamine cell onto the crate's tagged value.
fn convert_cell(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) if f.is_nan() => Value::Null,
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or(Value::Float(dt.as_f64()), Value::DateTime),
        Data::DateTimeIso(s) => {
            parse_datetime_text(s).map_or_else(|| Value::Text(s.clone()), Value::DateTime)
        }
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(e) => Value::Text(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;
    use std::fs::File;
    use tempfile::tempdir;

    fn range_of(rows: Vec<Vec<Data>>) -> Range<Data> {
        let height = rows.len() as u32;
        let width = rows.iter().map(Vec::len).max().unwrap_or(0) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in rows.into_iter().enumerate() {
            for (c, cell) in row.into_iter().enumerate() {
                range.set_value((r as u32, c as u32), cell);
            }
        }
        range
    }

    #[test]
    fn test_convert_cell() {
        assert_eq!(convert_cell(&Data::Empty), Value::Null);
        assert_eq!(convert_cell(&Data::String("  ".to_string())), Value::Null);
        assert_eq!(
            convert_cell(&Data::String("abc".to_string())),
            Value::Text("abc".to_string())
        );
        assert_eq!(convert_cell(&Data::Int(7)), Value::Int(7));
        assert_eq!(convert_cell(&Data::Float(f64::NAN)), Value::Null);
        assert_eq!(convert_cell(&Data::Float(1.5)), Value::Float(1.5));
        assert_eq!(convert_cell(&Data::Bool(false)), Value::Bool(false));
        assert_eq!(
            convert_cell(&Data::Error(CellErrorType::Div0)),
            Value::Text("#DIV/0!".to_string())
        );
        assert_eq!(
            convert_cell(&Data::DateTimeIso("2024-05-01T08:30:00".to_string())).render(),
            "2024-05-01 08:30:00"
        );
    }

    #[test]
    fn test_header_names_fill_blanks_and_dedup() {
        let header = vec![
            Data::String("Power".to_string()),
            Data::Empty,
            Data::String("Power".to_string()),
            Data::Float(2024.0),
            Data::String("Power".to_string()),
        ];
        assert_eq!(
            header_names(&header),
            vec!["Power", "Unnamed: 1", "Power.1", "2024", "Power.2"]
        );
    }

    #[test]
    fn test_table_from_range() {
        let range = range_of(vec![
            vec![Data::String("Time".to_string()), Data::String("Power".to_string())],
            vec![Data::String("2024-01-01 00:00:00".to_string()), Data::Float(1.0)],
            vec![Data::Empty, Data::Float(2.0)],
        ]);
        let table = table_from_range(&range).unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["Time", "Power"]);
        assert_eq!(
            table.column("Power").unwrap().values,
            vec![Value::Float(1.0), Value::Float(2.0)]
        );
        assert_eq!(table.column("Time").unwrap().values[1], Value::Null);
    }

    #[test]
    fn test_table_from_header_only_range() {
        let range = range_of(vec![vec![Data::String("Time".to_string())]]);
        let table = table_from_range(&range).unwrap();
        assert_eq!(table.height(), 0);
        assert_eq!(table.width(), 1);
    }

    #[test]
    fn test_table_from_empty_range() {
        let range: Range<Data> = Range::empty();
        let table = table_from_range(&range).unwrap();
        assert_eq!(table.height(), 0);
        assert_eq!(table.width(), 0);
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b.xlsx", "a.XLS", "c.csv", "d.xlsm", "notes.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("nested.xlsx")).unwrap();

        let files = discover(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.XLS", "b.xlsx"]);
        assert_eq!(files[0].format, WorkbookFormat::Xls);
        assert_eq!(files[1].format, WorkbookFormat::Xlsx);
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempdir().unwrap();
        assert!(discover(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_load_corrupt_workbook() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        fs::write(&path, b"this is not a zip archive").unwrap();
        let file = SpreadsheetFile {
            path,
            format: WorkbookFormat::Xlsx,
        };
        assert!(load(&file).is_err());
    }

    #[test]
    fn test_load_legacy_workbook() {
        let file = SpreadsheetFile {
            path: Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/B.xls"),
            format: WorkbookFormat::Xls,
        };
        let sheets = load(&file).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].name, "S1");

        let table = &sheets[0].table;
        assert_eq!(table.height(), 2);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["Time", "Power", "Voltage"]
        );
        let time = &table.column("Time").unwrap().values;
        assert_eq!(time[0].render(), "2024-02-01 06:00:00");
        assert!(matches!(time[0], Value::DateTime(_)));
        assert_eq!(time[1], Value::Text("2024-02-01 09:30:00".to_string()));
        assert_eq!(
            table.column("Voltage").unwrap().values,
            vec![Value::Float(230.0), Value::Float(231.5)]
        );
    }

    #[test]
    fn test_load_mismatched_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.xls");
        fs::write(&path, b"Time,Power\n2024-01-01,1\n").unwrap();
        let file = SpreadsheetFile {
            path,
            format: WorkbookFormat::Xls,
        };
        assert!(load(&file).is_err());
    }
}
