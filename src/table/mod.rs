//! Tabular input: loading datasets and projecting them into distinct rows.

mod decode;
pub mod row;

pub use decode::decode_text;
pub use row::{Cell, Row};

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset has no header row")]
    MissingHeader,

    #[error("column '{column}' has {len} values, expected {expected}")]
    RaggedColumn {
        column: String,
        len: usize,
        expected: usize,
    },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

/// Column-oriented dataset: column name → ordered values, all columns the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: IndexMap<String, Vec<String>>,
    len: usize,
}

impl Dataset {
    pub fn from_columns<K, I>(columns: I) -> Result<Self, TableError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Vec<String>)>,
    {
        let columns: IndexMap<String, Vec<String>> =
            columns.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let len = columns.values().next().map_or(0, Vec::len);
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != len) {
            return Err(TableError::RaggedColumn {
                column: name.clone(),
                len: values.len(),
                expected: len,
            });
        }
        Ok(Self { columns, len })
    }

    /// Parse CSV bytes (UTF-8 or Latin-1). The first record is the header.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        let (text, encoding) = decode_text(bytes);
        debug!(encoding = encoding.name(), "decoding dataset");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(TableError::MissingHeader);
        }
        let names = dedupe_headers(headers.iter());

        let mut values: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record?;
            for (i, column) in values.iter_mut().enumerate() {
                column.push(record.get(i).unwrap_or_default().to_string());
            }
        }

        Self::from_columns(names.into_iter().zip(values))
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        let bytes = std::fs::read(path).map_err(|source| TableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_csv_bytes(&bytes)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn record_count(&self) -> usize {
        self.len
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Repeated header names get a `.N` suffix so every column stays addressable.
fn dedupe_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::new();
    for header in headers {
        let mut name = header.trim().to_string();
        let mut n = 1;
        while seen.contains(&name) {
            name = format!("{}.{n}", header.trim());
            n += 1;
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}

/// Distinct rows of `dataset` projected onto `selected`, in first-occurrence order.
///
/// Returns `Ok(None)` when nothing is selected.
pub fn extract_unique_rows(
    dataset: &Dataset,
    selected: &[String],
) -> Result<Option<Vec<Row>>, TableError> {
    if selected.is_empty() {
        return Ok(None);
    }

    let columns = selected
        .iter()
        .map(|name| {
            dataset
                .column(name)
                .ok_or_else(|| TableError::UnknownColumn(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen: HashSet<Vec<&str>> = HashSet::new();
    let mut rows: Vec<Row> = Vec::new();
    for i in 0..dataset.record_count() {
        let key: Vec<&str> = columns.iter().map(|c| c[i].as_str()).collect();
        if !seen.insert(key.clone()) {
            continue;
        }
        rows.push(selected.iter().zip(key).map(|(k, v)| (k.clone(), v)).collect());
    }

    debug!(
        records = dataset.record_count(),
        unique = rows.len(),
        "extracted unique rows"
    );
    Ok(Some(rows))
}
