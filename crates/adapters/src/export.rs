use std::fs;
use std::path::Path;
use std::str::FromStr;

use qdesk_core::query_runner::StatementResult;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Picks the format from the file extension, defaulting to CSV.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown export format `{0}` (expected csv or json)")]
    UnknownFormat(String),
    #[error("statement returned no columns to export")]
    NoColumns,
    #[error("failed to write export file at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize JSON export: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn export_statement(
    path: &Path,
    format: ExportFormat,
    statement: &StatementResult,
) -> Result<usize, ExportError> {
    if statement.columns.is_empty() {
        return Err(ExportError::NoColumns);
    }
    match format {
        ExportFormat::Csv => export_rows_to_csv(path, &statement.columns, &statement.rows),
        ExportFormat::Json => export_rows_to_json(path, &statement.columns, &statement.rows),
    }
}

pub fn export_rows_to_csv(
    path: &Path,
    headers: &[String],
    rows: &[Vec<Value>],
) -> Result<usize, ExportError> {
    let mut content = headers
        .iter()
        .map(|header| csv_escape(header))
        .collect::<Vec<_>>()
        .join(",");
    content.push('\n');

    for row in rows {
        let values = (0..headers.len())
            .map(|column_index| {
                row.get(column_index)
                    .map_or_else(String::new, |value| csv_escape(&cell_text(value)))
            })
            .collect::<Vec<_>>();
        content.push_str(&values.join(","));
        content.push('\n');
    }

    write_file(path, content)?;
    Ok(rows.len())
}

/// One object per row keyed by column name. Cell values keep their JSON type.
pub fn export_rows_to_json(
    path: &Path,
    headers: &[String],
    rows: &[Vec<Value>],
) -> Result<usize, ExportError> {
    let records = rows
        .iter()
        .map(|row| {
            let object = headers
                .iter()
                .enumerate()
                .map(|(column_index, header)| {
                    (
                        header.clone(),
                        row.get(column_index).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect::<Map<_, _>>();
            Value::Object(object)
        })
        .collect::<Vec<_>>();

    let payload = serde_json::to_string_pretty(&records)?;
    write_file(path, payload)?;
    Ok(rows.len())
}

/// Display form of a cell: strings unquoted, null empty, anything else as JSON.
#[must_use]
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn write_file(path: &Path, content: String) -> Result<(), ExportError> {
    fs::write(path, content).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
