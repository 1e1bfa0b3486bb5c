//! JSON Lines datasets.
//!
//! Each non-blank line is one JSON object; its scalar members become the
//! cells of a [`RawRecord`]. Nested arrays and objects are kept as their JSON
//! text so the normalizer can still map or drop them.

use std::io::{BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use nuisance_core::{RawRecord, RawValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while reading or writing JSON Lines files.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file could not be opened.
    #[error("failed to open dataset at {path}")]
    Open {
        /// Requested file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// Reading a line failed.
    #[error("failed to read line {line} of {path}")]
    Read {
        /// File path.
        path: Utf8PathBuf,
        /// One-based line number.
        line: usize,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// A line was not valid JSON.
    #[error("line {line} of {path} is not valid JSON")]
    Parse {
        /// File path.
        path: Utf8PathBuf,
        /// One-based line number.
        line: usize,
        /// Source error from `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// A line held JSON other than an object.
    #[error("line {line} of {path} is not a JSON object")]
    NotAnObject {
        /// File path.
        path: Utf8PathBuf,
        /// One-based line number.
        line: usize,
    },
    /// Serialising rows failed.
    #[error("failed to serialise rows for {path}")]
    Serialise {
        /// Target file path.
        path: Utf8PathBuf,
        /// Source error from `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// Writing the file failed.
    #[error("failed to write dataset at {path}")]
    Write {
        /// Target file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
}

/// Read every row of a JSON Lines dataset, tagging rows with `source`.
///
/// Blank lines are skipped.
///
/// # Errors
/// Returns [`DatasetError`] when the file cannot be read or a line is not a
/// JSON object.
pub fn load_jsonl(path: &Utf8Path, source: &str) -> Result<Vec<RawRecord>, DatasetError> {
    let mut records = Vec::new();
    for (line, value) in read_rows::<Value>(path)? {
        let Value::Object(object) = value else {
            return Err(DatasetError::NotAnObject {
                path: path.to_path_buf(),
                line,
            });
        };
        records.push(
            object
                .into_iter()
                .fold(RawRecord::new(source), |record, (name, cell)| {
                    record.with(name, raw_value(cell))
                }),
        );
    }
    info!("loaded {} rows from {source} ({path})", records.len());
    Ok(records)
}

/// Read a JSON Lines file into typed rows.
///
/// # Errors
/// Returns [`DatasetError`] when the file cannot be read or a line does not
/// deserialise into `T`.
pub fn load_jsonl_as<T: DeserializeOwned>(path: &Utf8Path) -> Result<Vec<T>, DatasetError> {
    Ok(read_rows(path)?.into_iter().map(|(_, row)| row).collect())
}

/// Non-blank lines paired with their one-based line numbers.
fn read_rows<T: DeserializeOwned>(path: &Utf8Path) -> Result<Vec<(usize, T)>, DatasetError> {
    let file = nuisance_fs::open_utf8_file(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rows = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let number = index + 1;
        let text = line.map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            line: number,
            source,
        })?;
        if text.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&text).map_err(|source| DatasetError::Parse {
            path: path.to_path_buf(),
            line: number,
            source,
        })?;
        rows.push((number, row));
    }
    Ok(rows)
}

fn raw_value(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(flag) => RawValue::Bool(flag),
        Value::Number(number) => number.as_i64().map_or_else(
            || RawValue::Float(number.as_f64().unwrap_or(f64::NAN)),
            RawValue::Integer,
        ),
        Value::String(text) => RawValue::Text(text),
        nested @ (Value::Array(_) | Value::Object(_)) => {
            debug!("kept nested JSON value as text");
            RawValue::Text(nested.to_string())
        }
    }
}

/// Encode `rows` as JSON Lines.
///
/// # Errors
/// Returns the first serialisation failure.
pub fn encode_jsonl<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, serde_json::Error> {
    let mut buffer = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buffer, row)?;
        buffer.push(b'\n');
    }
    Ok(buffer)
}

/// Write `rows` to `path` as JSON Lines, replacing any file atomically.
///
/// # Errors
/// Returns [`DatasetError`] when serialisation or the write fails.
pub fn write_jsonl<T: Serialize>(path: &Utf8Path, rows: &[T]) -> Result<(), DatasetError> {
    let bytes = encode_jsonl(rows).map_err(|source| DatasetError::Serialise {
        path: path.to_path_buf(),
        source,
    })?;
    nuisance_fs::write_atomic(path, &bytes).map_err(|source| DatasetError::Write {
        path: path.to_path_buf(),
        source,
    })
}
