//! The transaction DAG.
//!
//! Transactions are kept in a map keyed by id. Each new transaction must
//! reference two transactions already in the graph, so the graph stays
//! acyclic and every node's depth is known as soon as it is added.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::domain::{GraphMetrics, Transaction, TxId, ROOT_ID};

/// Reasons a transaction can't join the graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate transaction id {0}")]
    DuplicateId(TxId),

    #[error("transaction {0} does not name its parents")]
    MissingParents(TxId),

    #[error("transaction {id} references unknown parent {parent}")]
    UnknownParent { id: TxId, parent: TxId },
}

/// Transaction DAG rooted at transaction `1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    transactions: HashMap<TxId, Transaction>,
    last_transaction: Option<TxId>,
    most_referenced: Option<TxId>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl Graph {
    /// Graph holding only the root, with room for `children` more transactions.
    pub fn with_capacity(children: usize) -> Self {
        let mut transactions = HashMap::with_capacity(children + 1);
        transactions.insert(ROOT_ID, Transaction::root());
        Self {
            transactions,
            last_transaction: None,
            most_referenced: None,
        }
    }

    /// Build a graph from `(left, right, timestamp)` rows; row `i` gets id `i + 2`.
    pub fn from_rows(rows: &[(TxId, TxId, u64)]) -> Result<Self, GraphError> {
        let mut graph = Self::with_capacity(rows.len());
        for (index, &(left, right, timestamp)) in rows.iter().enumerate() {
            let id = index as TxId + ROOT_ID + 1;
            graph.add_transaction(Transaction::new(id, left, right, timestamp))?;
        }
        Ok(graph)
    }

    /// Add a transaction, updating its metrics and those of its parents.
    pub fn add_transaction(&mut self, mut tx: Transaction) -> Result<(), GraphError> {
        if self.transactions.contains_key(&tx.id) {
            return Err(GraphError::DuplicateId(tx.id));
        }
        let (left, right) = tx.parents.ok_or(GraphError::MissingParents(tx.id))?;
        for parent in [left, right] {
            if !self.transactions.contains_key(&parent) {
                return Err(GraphError::UnknownParent { id: tx.id, parent });
            }
        }

        let mut parent_depths = Vec::with_capacity(2);
        for parent in [left, right] {
            if let Some(p) = self.transactions.get_mut(&parent) {
                p.metrics.in_reference += 1;
                parent_depths.push(p.metrics.depth);
            }
        }
        tx.metrics.depth = parent_depths.into_iter().min().unwrap_or_default() + 1;

        self.update_most_referenced(left);
        self.update_most_referenced(right);
        self.update_last_transaction(&tx);

        trace!(id = tx.id, depth = tx.metrics.depth, "Added transaction");
        self.transactions.insert(tx.id, tx);
        Ok(())
    }

    fn in_reference(&self, id: TxId) -> u32 {
        self.transactions
            .get(&id)
            .map(|t| t.metrics.in_reference)
            .unwrap_or_default()
    }

    fn update_most_referenced(&mut self, candidate: TxId) {
        let replace = match self.most_referenced {
            None => true,
            Some(best) => self.in_reference(best) < self.in_reference(candidate),
        };
        if replace {
            self.most_referenced = Some(candidate);
        }
    }

    fn update_last_transaction(&mut self, tx: &Transaction) {
        let replace = match self.last_transaction.and_then(|id| self.transactions.get(&id)) {
            None => true,
            Some(last) => last.timestamp < tx.timestamp,
        };
        if replace {
            self.last_transaction = Some(tx.id);
        }
    }

    pub fn get(&self, id: TxId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    /// Number of transactions, root included.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Transactions ordered by id.
    pub fn transactions(&self) -> Vec<&Transaction> {
        let mut all: Vec<&Transaction> = self.transactions.values().collect();
        all.sort_by_key(|t| t.id);
        all
    }

    /// Compute the aggregate metrics.
    pub fn metrics(&self) -> GraphMetrics {
        let count = self.transactions.len() as f64;

        let total_depth: u64 = self
            .transactions
            .values()
            .map(|t| u64::from(t.metrics.depth))
            .sum();
        let total_refs: u64 = self
            .transactions
            .values()
            .map(|t| u64::from(t.metrics.in_reference))
            .sum();

        let non_root = self.transactions.len().saturating_sub(1);
        let depths: BTreeSet<u32> = self
            .transactions
            .values()
            .filter(|t| !t.is_root())
            .map(|t| t.metrics.depth)
            .collect();
        let avg_txs_per_depth = if depths.is_empty() {
            0.0
        } else {
            non_root as f64 / depths.len() as f64
        };

        GraphMetrics {
            last_transaction: self.last_transaction,
            most_referenced: self.most_referenced,
            avg_depth: total_depth as f64 / count,
            avg_txs_per_depth,
            avg_in_references: total_refs as f64 / count,
        }
    }
}

impl TryFrom<Vec<(TxId, TxId, u64)>> for Graph {
    type Error = GraphError;

    fn try_from(rows: Vec<(TxId, TxId, u64)>) -> Result<Self, Self::Error> {
        Self::from_rows(&rows)
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tx in self.transactions() {
            writeln!(f, "{}", tx)?;
        }
        Ok(())
    }
}
