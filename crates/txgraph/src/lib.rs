//! txgraph - transaction DAG metrics
//!
//! Loads a database of transactions, each approving two earlier ones, and
//! computes depth and reference statistics over the resulting DAG.

pub mod domain;
pub mod graph;
pub mod loader;

pub use domain::{GraphMetrics, Transaction, TransactionMetrics, TxId, ROOT_ID};
pub use graph::{Graph, GraphError};
pub use loader::{load_database, parse_database, LoadError};
