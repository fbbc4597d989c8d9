//! Batch output: the flat CSV table and the full JSON dump.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use indexmap::IndexSet;
use tracing::info;

use crate::table::row::is_working_field;
use crate::table::{Cell, Dataset, Row, TableError};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Reload(#[from] TableError),
}

/// `columns` first, then the remaining row keys in first-seen order, working fields excluded.
pub fn export_schema(columns: &[String], rows: &[Row]) -> Vec<String> {
    let mut schema: IndexSet<&str> = columns
        .iter()
        .map(String::as_str)
        .filter(|k| !is_working_field(k))
        .collect();
    for row in rows {
        schema.extend(row.keys().filter(|k| !is_working_field(k)));
    }
    schema.into_iter().map(str::to_string).collect()
}

/// Write `rows` as CSV under [`export_schema`]. Missing keys become empty cells, lists
/// are comma-joined.
pub fn write_csv<W: Write>(
    columns: &[String],
    rows: &[Row],
    writer: W,
) -> Result<(), ExportError> {
    let schema = export_schema(columns, rows);
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(&schema)?;
    for row in rows {
        out.write_record(
            schema
                .iter()
                .map(|key| row.get(key).map(Cell::to_flat_string).unwrap_or_default()),
        )?;
    }
    out.flush().map_err(|e| ExportError::Csv(e.into()))?;
    Ok(())
}

pub fn write_csv_file(columns: &[String], rows: &[Row], path: &Path) -> Result<(), ExportError> {
    let file = create(path)?;
    write_csv(columns, rows, BufWriter::new(file))?;
    info!(path = %path.display(), rows = rows.len(), "CSV exported");
    Ok(())
}

/// Pretty JSON array of every row, working fields included.
pub fn write_json_dump(rows: &[Row], path: &Path) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(create(path)?);
    serde_json::to_writer_pretty(&mut writer, rows)?;
    writer.flush().map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), rows = rows.len(), "row dump written");
    Ok(())
}

/// Reload an exported CSV: its header and its rows as text cells.
pub fn load_csv(path: &Path) -> Result<(Vec<String>, Vec<Row>), ExportError> {
    let dataset = Dataset::load(path)?;
    let names: Vec<&str> = dataset.column_names().collect();
    let rows: Vec<Row> = (0..dataset.record_count())
        .map(|i| {
            names
                .iter()
                .map(|name| {
                    let value = dataset.column(name).map_or("", |c| c[i].as_str());
                    (*name, value)
                })
                .collect::<Row>()
        })
        .collect();
    Ok((names.into_iter().map(str::to_string).collect(), rows))
}

fn create(path: &Path) -> Result<File, ExportError> {
    File::create(path).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })
}
