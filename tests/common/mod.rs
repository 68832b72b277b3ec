use std::time::Duration;

use tempfile::TempDir;

use qcledger::catalog::ProcessCatalog;
use qcledger::model::{CheckObservation, MergeBatch, Verdict};
use qcledger::store::{RetryPolicy, SqliteQcStore, StoreConfig};

/// A two-check catalog most tests derive completion against.
#[allow(dead_code)]
pub fn small_catalog() -> ProcessCatalog {
    ProcessCatalog::from_iter([("Cell sorting", vec!["Jig setup", "Visual inspection"])])
}

/// In-memory store with the small catalog.
#[allow(dead_code)]
pub async fn memory_store() -> SqliteQcStore {
    SqliteQcStore::connect_in_memory(small_catalog())
        .await
        .expect("connect in-memory store")
}

/// File-backed store in a fresh temp directory, for tests that need real
/// inter-connection locking. The TempDir must outlive the store.
#[allow(dead_code)]
pub async fn file_store(catalog: ProcessCatalog) -> (SqliteQcStore, TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("qc.db").display());
    let config = StoreConfig::new(Some(url.clone())).with_catalog(catalog);
    let store = SqliteQcStore::connect_with(config)
        .await
        .expect("connect file store");
    (store, dir, url)
}

/// File-backed store tuned to fail fast under held locks.
#[allow(dead_code)]
pub async fn impatient_file_store(catalog: ProcessCatalog) -> (SqliteQcStore, TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("qc.db").display());
    let config = StoreConfig::new(Some(url.clone()))
        .with_catalog(catalog)
        .with_retry(RetryPolicy::fast())
        .with_busy_timeout(Duration::from_millis(100));
    let store = SqliteQcStore::connect_with(config)
        .await
        .expect("connect file store");
    (store, dir, url)
}

/// Batch filling only the Module X slot for the given checks.
#[allow(dead_code)]
pub fn module_x_batch(pack_id: &str, checks: &[&str]) -> MergeBatch {
    MergeBatch::new(pack_id, "Cell sorting")
        .with_technician("station x tech")
        .with_observations(
            checks
                .iter()
                .map(|c| CheckObservation::new(*c).with_module_x(Verdict::Ok)),
        )
}

/// Batch filling only the Module Y slot for the given checks.
#[allow(dead_code)]
pub fn module_y_batch(pack_id: &str, checks: &[&str]) -> MergeBatch {
    MergeBatch::new(pack_id, "Cell sorting")
        .with_qc_inspector("station y qc")
        .with_observations(
            checks
                .iter()
                .map(|c| CheckObservation::new(*c).with_module_y(Verdict::Ok)),
        )
}
