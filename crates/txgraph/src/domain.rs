//! Transactions and the metrics computed over them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction identifier. The root is always `1`.
pub type TxId = u32;

/// Id of the implicit root transaction.
pub const ROOT_ID: TxId = 1;

/// Per-transaction metrics, filled in when the transaction joins a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetrics {
    /// Shortest distance to the root.
    pub depth: u32,

    /// Number of references made to this transaction by its children.
    /// A child naming it as both parents counts twice.
    pub in_reference: u32,
}

impl fmt::Display for TransactionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(depth={}, in_reference={})",
            self.depth, self.in_reference
        )
    }
}

/// A node of the transaction DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,

    /// `(left, right)` parents; `None` only for the root.
    pub parents: Option<(TxId, TxId)>,

    pub timestamp: u64,

    pub metrics: TransactionMetrics,
}

impl Transaction {
    pub fn new(id: TxId, left: TxId, right: TxId, timestamp: u64) -> Self {
        Self {
            id,
            parents: Some((left, right)),
            timestamp,
            metrics: TransactionMetrics::default(),
        }
    }

    pub fn root() -> Self {
        Self {
            id: ROOT_ID,
            parents: None,
            timestamp: 0,
            metrics: TransactionMetrics::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_none()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parents {
            Some((left, right)) => write!(
                f,
                "- id={} (left={} right={}) t={} {}",
                self.id, left, right, self.timestamp, self.metrics
            ),
            None => write!(f, "- id={} (root) t={} {}", self.id, self.timestamp, self.metrics),
        }
    }
}

/// Aggregate metrics of a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    /// Transaction with the greatest timestamp (first loaded wins ties).
    pub last_transaction: Option<TxId>,

    /// First transaction to reach the highest in-reference count.
    pub most_referenced: Option<TxId>,

    /// Mean depth over every transaction, root included.
    pub avg_depth: f64,

    /// Non-root transactions divided by the number of distinct non-zero depths.
    pub avg_txs_per_depth: f64,

    /// Mean in-references per transaction, root included.
    pub avg_in_references: f64,
}

impl fmt::Display for GraphMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "> AVG DAG DEPTH: {:.2}", self.avg_depth)?;
        writeln!(f, "> AVG TXS PER DEPTH: {:.2}", self.avg_txs_per_depth)?;
        writeln!(f, "> AVG REF: {:.3}", self.avg_in_references)?;
        if let Some(id) = self.last_transaction {
            writeln!(f, "> LAST TX: {}", id)?;
        }
        if let Some(id) = self.most_referenced {
            writeln!(f, "> MOST REFERENCED TX: {}", id)?;
        }
        Ok(())
    }
}
