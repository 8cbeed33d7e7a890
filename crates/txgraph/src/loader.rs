//! Database file parsing.
//!
//! The first line holds the number of transactions `N`. Each of the next `N`
//! lines is `left right timestamp`; line `i` (1-based) defines transaction
//! `i + 1`. Trailing blank lines are ignored.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::domain::{Transaction, TxId, ROOT_ID};
use crate::graph::{Graph, GraphError};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database is empty")]
    Empty,

    #[error("line 1: invalid transaction count `{0}`")]
    InvalidCount(String),

    #[error("line {line}: expected `left right timestamp`, got `{content}`")]
    InvalidRow { line: usize, content: String },

    #[error("expected {expected} transactions, found {found}")]
    CountMismatch { expected: usize, found: usize },

    #[error("line {line}: {source}")]
    Graph {
        line: usize,
        #[source]
        source: GraphError,
    },
}

/// Parse a database from its text.
pub fn parse_database(input: &str) -> Result<Graph, LoadError> {
    let mut lines = input.lines().map(str::trim);

    let header = lines.next().filter(|l| !l.is_empty()).ok_or(LoadError::Empty)?;
    let expected: usize = header
        .parse()
        .map_err(|_| LoadError::InvalidCount(header.to_string()))?;

    let rows: Vec<&str> = {
        let mut rows: Vec<&str> = lines.collect();
        while rows.last().is_some_and(|l| l.is_empty()) {
            rows.pop();
        }
        rows
    };
    if rows.len() != expected {
        return Err(LoadError::CountMismatch {
            expected,
            found: rows.len(),
        });
    }

    let mut graph = Graph::with_capacity(expected);
    for (index, row) in rows.iter().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let (left, right, timestamp) = parse_row(row).ok_or_else(|| LoadError::InvalidRow {
            line,
            content: row.to_string(),
        })?;
        let id = index as TxId + ROOT_ID + 1;
        graph
            .add_transaction(Transaction::new(id, left, right, timestamp))
            .map_err(|source| LoadError::Graph { line, source })?;
    }

    debug!(transactions = graph.transaction_count(), "Loaded database");
    Ok(graph)
}

fn parse_row(row: &str) -> Option<(TxId, TxId, u64)> {
    let mut fields = row.split_whitespace();
    let left = fields.next()?.parse().ok()?;
    let right = fields.next()?.parse().ok()?;
    let timestamp = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((left, right, timestamp))
}

/// Read and parse a database file.
pub fn load_database(path: &Path) -> Result<Graph, LoadError> {
    let input = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_database(&input)
}
