//! Loads database files from disk and checks the reported metrics.

use std::io::Write;
use std::path::PathBuf;

use txgraph::{load_database, GraphError, LoadError};

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/database.txt")
}

#[test]
fn sample_database_metrics() {
    let graph = load_database(&sample_path()).expect("load sample");
    assert_eq!(graph.transaction_count(), 6);

    let metrics = graph.metrics();
    let report = metrics.to_string();
    assert!(report.contains("> AVG DAG DEPTH: 1.33"), "{}", report);
    assert!(report.contains("> AVG TXS PER DEPTH: 2.50"), "{}", report);
    assert!(report.contains("> AVG REF: 1.667"), "{}", report);
    assert_eq!(metrics.last_transaction, Some(6));
    assert_eq!(metrics.most_referenced, Some(1));
}

#[test]
fn metrics_serialize_to_json() {
    let metrics = load_database(&sample_path()).expect("load").metrics();
    let value = serde_json::to_value(&metrics).expect("serialize");
    assert_eq!(value["last_transaction"], 6);
    assert_eq!(value["avg_txs_per_depth"], 2.5);
}

#[test]
fn rejects_file_with_forward_reference() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "2").unwrap();
    writeln!(file, "1 3 0").unwrap();
    writeln!(file, "1 1 0").unwrap();

    let err = load_database(file.path()).unwrap_err();
    match err {
        LoadError::Graph { line, source } => {
            assert_eq!(line, 2);
            assert_eq!(source, GraphError::UnknownParent { id: 2, parent: 3 });
        }
        other => panic!("unexpected error: {}", other),
    }
}
