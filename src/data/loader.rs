use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    LargeStringArray, StringArray,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, Column, Dataset};

/// File extensions a directory store treats as tables.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "json", "parquet", "pq"];

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a table from a file.  Dispatch by extension; the dataset is named
/// after the file stem.
///
/// Supported formats:
/// * `.parquet` – flat Parquet file, one Arrow column per table column
/// * `.json`    – `[{ "year": 2000, "value": 1.5, ... }, ...]`
/// * `.csv`     – header row, cell types guessed per value
pub fn load_file(path: &Path) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("invalid file name: {}", path.display()))?
        .to_string();

    match ext.as_str() {
        "parquet" | "pq" => load_parquet(path, name),
        "json" => load_json(path, name),
        "csv" => load_csv(path, name),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "year": 2000, "value": 1.5 },
///   { "year": 2001, "value": null },
///   ...
/// ]
/// ```
///
/// Columns appear in first-seen order; keys absent from a record are `Null`.
fn load_json(path: &Path, name: String) -> Result<Dataset> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut headers: Vec<String> = Vec::new();
    let mut parsed: Vec<BTreeMap<String, CellValue>> = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let mut row = BTreeMap::new();
        for (key, val) in obj {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
            row.insert(key.clone(), json_to_cell(val));
        }
        parsed.push(row);
    }

    let rows = parsed
        .into_iter()
        .map(|mut row| {
            headers
                .iter()
                .map(|h| row.remove(h).unwrap_or(CellValue::Null))
                .collect()
        })
        .collect();

    Ok(Dataset::from_rows(name, headers, rows))
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names, one record per row.
/// Cell types are guessed per value (integer, float, bool, text, empty → null).
fn load_csv(path: &Path, name: String) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        rows.push(record.iter().map(guess_cell_type).collect());
    }

    Ok(Dataset::from_rows(name, headers, rows))
}

pub(crate) fn guess_cell_type(s: &str) -> CellValue {
    let s = s.trim();
    if s.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return CellValue::Float(f);
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    CellValue::Text(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a flat Parquet file.
///
/// Every top-level column becomes a table column.  Integer, float, boolean
/// and string columns map to the matching cells; nested or exotic types
/// are rejected.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path, name: String) -> Result<Dataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;

    let mut columns: Vec<Column> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| Column::new(f.name().clone(), Vec::new()))
        .collect();

    let reader = builder.build().context("building parquet reader")?;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (col_idx, column) in columns.iter_mut().enumerate() {
            let array = batch.column(col_idx);
            let cells = extract_cells(array)
                .with_context(|| format!("column '{}'", column.name))?;
            column.values.extend(cells);
        }
    }

    Ok(Dataset::from_columns(name, columns))
}

// -- Parquet / Arrow helpers --

fn downcast<'a, T: 'static>(col: &'a Arc<dyn Array>) -> Result<&'a T> {
    col.as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("unexpected array layout for {:?}", col.data_type()))
}

/// Convert one Arrow column into cells.
fn extract_cells(col: &Arc<dyn Array>) -> Result<Vec<CellValue>> {
    let cells = match col.data_type() {
        DataType::Utf8 => downcast::<StringArray>(col)?
            .iter()
            .map(|v| v.map_or(CellValue::Null, |s| CellValue::Text(s.to_string())))
            .collect(),
        DataType::LargeUtf8 => downcast::<LargeStringArray>(col)?
            .iter()
            .map(|v| v.map_or(CellValue::Null, |s| CellValue::Text(s.to_string())))
            .collect(),
        DataType::Int16 => downcast::<Int16Array>(col)?
            .iter()
            .map(|v| v.map_or(CellValue::Null, |i| CellValue::Integer(i64::from(i))))
            .collect(),
        DataType::Int32 => downcast::<Int32Array>(col)?
            .iter()
            .map(|v| v.map_or(CellValue::Null, |i| CellValue::Integer(i64::from(i))))
            .collect(),
        DataType::Int64 => downcast::<Int64Array>(col)?
            .iter()
            .map(|v| v.map_or(CellValue::Null, CellValue::Integer))
            .collect(),
        DataType::Float32 => downcast::<Float32Array>(col)?
            .iter()
            .map(|v| v.map_or(CellValue::Null, |f| CellValue::Float(f64::from(f))))
            .collect(),
        DataType::Float64 => downcast::<Float64Array>(col)?
            .iter()
            .map(|v| v.map_or(CellValue::Null, CellValue::Float))
            .collect(),
        DataType::Boolean => downcast::<BooleanArray>(col)?
            .iter()
            .map(|v| v.map_or(CellValue::Null, CellValue::Bool))
            .collect(),
        DataType::Null => vec![CellValue::Null; col.len()],
        other => bail!("unsupported column type {other:?}"),
    };
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    #[test]
    fn csv_types_are_guessed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gdp.csv");
        std::fs::write(&path, "year,value,note\n2000,1.5,ok\n2001,,\n2002,3,x\n").unwrap();

        let ds = load_file(&path).unwrap();
        assert_eq!(ds.name, "gdp");
        assert_eq!(ds.len(), 3);
        let value = &ds.column("value").unwrap().values;
        assert_eq!(
            value,
            &vec![CellValue::Float(1.5), CellValue::Null, CellValue::Integer(3)]
        );
        assert_eq!(ds.column("year").unwrap().values[0], CellValue::Integer(2000));
    }

    #[test]
    fn json_records_fill_absent_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pop.json");
        std::fs::write(&path, r#"[{"year": 2000, "value": 1}, {"year": 2001}]"#).unwrap();

        let ds = load_file(&path).unwrap();
        assert_eq!(ds.name, "pop");
        assert_eq!(ds.column("value").unwrap().values[1], CellValue::Null);
    }

    #[test]
    fn json_must_be_an_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"year": 2000}"#).unwrap();
        assert!(load_file(&path).is_err());
    }

    #[test]
    fn parquet_columns_map_to_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("co2.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("year", DataType::Int64, false),
            Field::new("value", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![2000, 2001])),
                Arc::new(Float64Array::from(vec![Some(1.0), None])),
            ],
        )
        .unwrap();
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ds = load_file(&path).unwrap();
        assert_eq!(ds.column_names(), vec!["year", "value"]);
        assert_eq!(ds.column("year").unwrap().values[1], CellValue::Integer(2001));
        assert_eq!(ds.column("value").unwrap().values[1], CellValue::Null);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_file(Path::new("table.xlsx")).unwrap_err();
        assert!(err.to_string().contains(".xlsx"));
    }
}
