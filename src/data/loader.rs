use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, Float32Array, Float64Array, Int32Array, Int64Array, LargeListArray, ListArray,
    UInt32Array,
};
use arrow::datatypes::DataType;
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{MetadataValue, Pixel, Spectrum, SpectrumSet};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a spectrum set from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – integer `x`/`y` columns, `mz`/`intensity` list columns
/// * `.json`    – `[{ "x": 0, "y": 0, "mz": [...], "intensity": [...] }, ...]`
/// * `.csv`     – columns `x`, `y`, `mz`, `intensity`; the arrays are
///   semicolon-separated floats
pub fn load_file(path: &Path) -> Result<SpectrumSet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let set = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    let (width, height) = set.dimensions();
    info!(
        "Loaded {} spectra ({width}×{height} pixels) from {}",
        set.len(),
        path.display()
    );
    Ok(set)
}

/// Insert one spectrum, rejecting duplicate coordinates.
fn insert_pixel(
    spectra: &mut BTreeMap<Pixel, Spectrum>,
    row: usize,
    pixel: Pixel,
    mz: Vec<f64>,
    intensity: Vec<f64>,
) -> Result<()> {
    let spectrum = Spectrum::try_new(mz, intensity).with_context(|| format!("Row {row}"))?;
    if spectra.insert(pixel, spectrum).is_some() {
        bail!("Row {row}: duplicate pixel {pixel}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema, either a bare array of records or an object with
/// acquisition metadata:
///
/// ```json
/// {
///   "metadata": { "polarity": "positive", "pixel size": 20 },
///   "spectra": [
///     { "x": 0, "y": 0, "mz": [100.0, 200.0], "intensity": [10.0, 100.0] },
///     ...
///   ]
/// }
/// ```
fn load_json(path: &Path) -> Result<SpectrumSet> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let (records, meta) = match &root {
        JsonValue::Array(records) => (records, None),
        JsonValue::Object(obj) => (
            obj.get("spectra")
                .and_then(|v| v.as_array())
                .context("Expected a 'spectra' array")?,
            obj.get("metadata").and_then(|v| v.as_object()),
        ),
        _ => bail!("Expected top-level JSON array or object"),
    };

    let mut spectra = BTreeMap::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let x = json_coord(obj.get("x"), i, "x")?;
        let y = json_coord(obj.get("y"), i, "y")?;
        let mz = json_array_to_f64(obj.get("mz"), i, "mz")?;
        let intensity = json_array_to_f64(obj.get("intensity"), i, "intensity")?;

        insert_pixel(&mut spectra, i, Pixel::new(x, y), mz, intensity)?;
    }

    let mut set = SpectrumSet::from_spectra(spectra);
    if let Some(meta) = meta {
        set.metadata = meta
            .iter()
            .map(|(key, val)| (key.clone(), json_to_metadata(val)))
            .collect();
    }
    Ok(set)
}

fn json_coord(val: Option<&JsonValue>, row: usize, col: &str) -> Result<u32> {
    let v = val
        .and_then(|v| v.as_u64())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' coordinate"))?;
    u32::try_from(v).with_context(|| format!("Row {row}: '{col}' = {v} out of range"))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

fn json_to_metadata(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names `x`, `y`, `mz`, `intensity`.
/// `mz` and `intensity` hold semicolon-separated floats:
///   `"100.0;200.0"`, `"10.0;100.0"`
/// Other columns are ignored.
fn load_csv(path: &Path) -> Result<SpectrumSet> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| format!("CSV missing '{name}' column"))
    };
    let x_idx = column("x")?;
    let y_idx = column("y")?;
    let mz_idx = column("mz")?;
    let int_idx = column("intensity")?;

    let mut spectra = BTreeMap::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let x: u32 = field(x_idx)
            .trim()
            .parse()
            .with_context(|| format!("Row {row_no}: invalid x coordinate"))?;
        let y: u32 = field(y_idx)
            .trim()
            .parse()
            .with_context(|| format!("Row {row_no}: invalid y coordinate"))?;
        let mz = parse_semicolon_floats(field(mz_idx), row_no, "mz")?;
        let intensity = parse_semicolon_floats(field(int_idx), row_no, "intensity")?;

        insert_pixel(&mut spectra, row_no, Pixel::new(x, y), mz, intensity)?;
    }

    Ok(SpectrumSet::from_spectra(spectra))
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing one spectrum per row.
///
/// Expected schema:
/// - `x`, `y`: Int32 / Int64 / UInt32 pixel coordinates
/// - `mz`, `intensity`: List<Float64> or LargeList<Float64> (Float32 accepted)
///
/// Key/value metadata of the file becomes acquisition metadata.
fn load_parquet(path: &Path) -> Result<SpectrumSet> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;

    let metadata: BTreeMap<String, MetadataValue> = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .filter(|kv| !kv.key.starts_with("ARROW:"))
                .map(|kv| {
                    let value = kv
                        .value
                        .clone()
                        .map_or(MetadataValue::Null, MetadataValue::String);
                    (kv.key.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    let reader = builder.build().context("building parquet reader")?;

    let mut spectra = BTreeMap::new();
    let mut row_offset = 0;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let column = |name: &str| {
            schema
                .index_of(name)
                .map(|i| batch.column(i))
                .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))
        };
        let x_col = column("x")?;
        let y_col = column("y")?;
        let mz_col = column("mz")?;
        let int_col = column("intensity")?;

        for row in 0..batch.num_rows() {
            let abs_row = row_offset + row;
            let x = extract_coord(x_col, row)
                .with_context(|| format!("Row {abs_row}: failed to read 'x'"))?;
            let y = extract_coord(y_col, row)
                .with_context(|| format!("Row {abs_row}: failed to read 'y'"))?;
            let mz = extract_f64_list(mz_col, row)
                .with_context(|| format!("Row {abs_row}: failed to read 'mz'"))?;
            let intensity = extract_f64_list(int_col, row)
                .with_context(|| format!("Row {abs_row}: failed to read 'intensity'"))?;

            insert_pixel(&mut spectra, abs_row, Pixel::new(x, y), mz, intensity)?;
        }
        row_offset += batch.num_rows();
    }

    let mut set = SpectrumSet::from_spectra(spectra);
    set.metadata = metadata;
    Ok(set)
}

// -- Parquet / Arrow helpers --

/// Extract a non-negative pixel coordinate from an integer column.
fn extract_coord(col: &Arc<dyn Array>, row: usize) -> Result<u32> {
    if col.is_null(row) {
        bail!("null coordinate");
    }
    let value: i64 = match col.data_type() {
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .context("expected Int32Array")?
            .value(row)
            .into(),
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .context("expected Int64Array")?
            .value(row),
        DataType::UInt32 => col
            .as_any()
            .downcast_ref::<UInt32Array>()
            .context("expected UInt32Array")?
            .value(row)
            .into(),
        other => bail!("Expected an integer coordinate column, got {other:?}"),
    };
    u32::try_from(value).with_context(|| format!("coordinate {value} out of range"))
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}
