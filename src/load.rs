use crate::error::Result;
use crate::structs::{Column, OutputFormat, Table, Value};
use arrow_array::{
    ArrayRef, BooleanArray, Float64Array, RecordBatch, RecordBatchOptions, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use csv::Writer;
use log::debug;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::ser::{SerializeSeq, Serializer};
use std::io::{BufWriter, Write};
use std::{fs::File, path::Path, sync::Arc};

/// Writes the merged table in the requested format, replacing any existing file.
///
/// # Errors
/// Returns error if the file cannot be created or written to.
pub fn write(table: &Table, output_path: &Path, format: OutputFormat) -> Result<()> {
    debug!(
        "Writing {} rows x {} columns as {:?} to {}",
        table.height(),
        table.width(),
        format,
        output_path.display()
    );
    match format {
        OutputFormat::Csv => write_csv(table, output_path),
        OutputFormat::Json => write_json(table, output_path),
        OutputFormat::Parquet => write_parquet(table, output_path),
    }
}

/// Writes the table as comma-separated text.
///
/// One header row of column names, no index column, nulls as empty fields.
///
/// # Arguments
/// * `table` - Merged table to write
/// * `output_path` - Path where the CSV file will be created
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_csv(table: &Table, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(table.column_names())?;
    for index in 0..table.height() {
        writer.write_record(table.row(index).map(Value::render))?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes the table to a pretty-formatted JSON array of row objects.
///
/// Keys follow column order; nulls are written as `null`.
///
/// # Errors
/// Returns error if file cannot be created or serialization fails.
pub fn write_json(table: &Table, output_path: &Path) -> Result<()> {
    let file = BufWriter::new(File::create(output_path)?);
    let mut serializer = serde_json::Serializer::pretty(file);
    let mut seq = serializer.serialize_seq(Some(table.height()))?;
    for index in 0..table.height() {
        seq.serialize_element(&table.row_record(index))?;
    }
    seq.end()?;
    serializer.into_inner().flush()?;
    Ok(())
}

/// Writes the table to a Parquet file using Arrow arrays.
///
/// Each column becomes a nullable field: `Float64` when every non-null value
/// is numeric, `Boolean` when every non-null value is boolean, `Utf8`
/// otherwise.
///
/// # Errors
/// Returns error if file cannot be created, schema is invalid, or Arrow operations fail.
pub fn write_parquet(table: &Table, output_path: &Path) -> Result<()> {
    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) =
        table.columns().iter().map(column_to_arrow).unzip();
    let schema = Arc::new(Schema::new(fields));

    let options = RecordBatchOptions::new().with_row_count(Some(table.height()));
    let batch = RecordBatch::try_new_with_options(schema.clone(), arrays, &options)?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

fn column_to_arrow(column: &Column) -> (Field, ArrayRef) {
    let data_type = if column.non_null_count() == 0 {
        DataType::Utf8
    } else if column.values.iter().all(|v| v.is_null() || v.is_numeric()) {
        DataType::Float64
    } else if column
        .values
        .iter()
        .all(|v| matches!(v, Value::Null | Value::Bool(_)))
    {
        DataType::Boolean
    } else {
        DataType::Utf8
    };

    let array: ArrayRef = match data_type {
        DataType::Float64 => Arc::new(Float64Array::from(
            column.values.iter().map(Value::as_f64).collect::<Vec<_>>(),
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            column
                .values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        _ => Arc::new(StringArray::from(
            column
                .values
                .iter()
                .map(|v| (!v.is_null()).then(|| v.render()))
                .collect::<Vec<_>>(),
        )),
    };

    (Field::new(column.name.as_str(), data_type, true), array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs;
    use tempfile::tempdir;

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::new(
                "Datetime",
                vec![
                    Value::Text("2024-01-01 00:00:00".to_string()),
                    Value::Null,
                ],
            ),
            Column::new("Power", vec![Value::Float(1.5), Value::Int(2)]),
            Column::new(
                "Note",
                vec![Value::Text("a, \"quoted\"".to_string()), Value::Null],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_write_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&sample(), &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Datetime,Power,Note\n2024-01-01 00:00:00,1.5,\"a, \"\"quoted\"\"\"\n,2,\n"
        );
    }

    #[test]
    fn test_write_csv_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale content that is longer than the new file\n".repeat(10)).unwrap();
        let table = Table::from_columns(vec![Column::new("x", vec![Value::Int(1)])]).unwrap();
        write(&table, &path, OutputFormat::Csv).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n1\n");
    }

    #[test]
    fn test_write_csv_to_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        assert!(write_csv(&sample(), &path).is_err());
    }

    #[test]
    fn test_write_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&sample(), &path).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([
                {"Datetime": "2024-01-01 00:00:00", "Power": 1.5, "Note": "a, \"quoted\""},
                {"Datetime": null, "Power": 2, "Note": null}
            ])
        );
    }

    #[test]
    fn test_write_parquet_infers_types() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let mut table = sample();
        table
            .push_column(Column::new("Online", vec![Value::Bool(true), Value::Null]))
            .unwrap();
        write_parquet(&table, &path).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.iter().map(RecordBatch::num_rows).sum::<usize>(), 2);

        let schema = batches[0].schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(3).data_type(), &DataType::Boolean);

        let power = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(power.value(1), 2.0);
        assert!(batches[0].column(0).is_null(1));
    }
}
