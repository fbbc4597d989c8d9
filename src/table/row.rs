use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Queries generated for the row by the search-query phase.
pub const SEARCH_QUERIES: &str = "search_queries";
/// One search answer per consumed query, set by the search phase.
pub const ONE_VALUE: &str = "one_value";

pub const WORKING_FIELDS: [&str; 2] = [SEARCH_QUERIES, ONE_VALUE];

pub fn is_working_field(key: &str) -> bool {
    WORKING_FIELDS.contains(&key)
}

/// A single cell: a scalar text value or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    List(Vec<String>),
}

impl Cell {
    /// Flat text form used in CSV output. Lists are comma-joined.
    pub fn to_flat_string(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::List(items) => items.join(", "),
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Cell::List(items) => Some(items),
            Cell::Text(_) => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

/// One unit of work: an ordered mapping from field name to cell.
///
/// Starts with the selected source columns and grows working fields and
/// at most one extracted fact as the pipeline runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(IndexMap<String, Cell>);

impl Row {
    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, cell: impl Into<Cell>) {
        self.0.insert(key.into(), cell.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Cell> {
        self.0.shift_remove(key)
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Non-working fields, in insertion order.
    pub fn data_fields(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.iter().filter(|(k, _)| !is_working_field(k))
    }

    pub fn search_queries(&self) -> &[String] {
        self.list(SEARCH_QUERIES)
    }

    pub fn set_search_queries(&mut self, queries: Vec<String>) {
        self.0.insert(SEARCH_QUERIES.to_string(), Cell::List(queries));
    }

    pub fn one_value(&self) -> &[String] {
        self.list(ONE_VALUE)
    }

    pub fn set_one_value(&mut self, results: Vec<String>) {
        self.0.insert(ONE_VALUE.to_string(), Cell::List(results));
    }

    fn list(&self, key: &str) -> &[String] {
        self.0.get(key).and_then(Cell::as_list).unwrap_or(&[])
    }
}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
