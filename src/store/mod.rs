//! Durable QC record store: merge-on-write persistence for check
//! observations, bounded retry under contention, and the read API the
//! report renderer and dashboard consume.
//!
//! # Architecture
//!
//! The store is built around a few pieces:
//!
//! - **[`QcStore`]**: the trait external collaborators program against.
//! - **[`SqliteQcStore`]**: embedded single-file backend (WAL, busy
//!   timeout), the default for line stations.
//! - **[`PostgresQcStore`]**: client/server backend for multi-host
//!   deployments (feature `postgres`).
//! - **[`with_retry`] / [`RetryPolicy`]**: the retry governor every
//!   mutation routes through.
//! - **[`StoreError`]**: the error taxonomy; only contention signals are
//!   ever absorbed by the governor.
//!
//! Mutations (`merge_checks`, `mark_process_complete`) execute inside one
//! write-exclusive transaction per call and are wrapped by the governor.
//! Reads bypass the governor and never block on writers beyond the
//! backend's snapshot behavior.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use qcledger::model::{CheckObservation, MergeBatch, Verdict};
//! use qcledger::store::{QcStore, SqliteQcStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteQcStore::connect("sqlite://battery_mes.db").await?;
//!
//! // Station X submits its half of a check; Module Y's slot is untouched.
//! let batch = MergeBatch::new("PACK-0042", "Cell sorting")
//!     .with_technician("A. Rivera")
//!     .with_observation(
//!         CheckObservation::new("Jig setup on the flat surface").with_module_x(Verdict::Ok),
//!     );
//! store.merge_checks(&batch).await?;
//!
//! let status = store.process_status("PACK-0042", "Cell sorting").await?;
//! assert!(!status.completed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod retry;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
#[cfg(feature = "postgres")]
pub use postgres::PostgresQcStore;
pub use retry::{RetryPolicy, with_retry};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteQcStore;

use async_trait::async_trait;

use crate::model::{CheckRow, MergeBatch, NotOkFinding, PackProcesses};
use crate::status::ProcessStatus;

/// The store contract: governed mutations plus the ungoverned read API.
///
/// The merge engine behind [`merge_checks`](QcStore::merge_checks) is the
/// sole writer of check rows; writers that bypass it break the
/// never-reduce-information merge rule.
#[async_trait]
pub trait QcStore: Send + Sync {
    /// Merges a batch of observations for one (pack, process) pair.
    ///
    /// Creates the pack row on first write. Either the whole batch merges or
    /// none of it does. Runs under the retry governor; exhausting the budget
    /// surfaces [`StoreError::WriteContention`] with the store unchanged.
    async fn merge_checks(&self, batch: &MergeBatch) -> Result<()>;

    /// Operator-triggered bulk completion: stamps an end date on every
    /// existing check row for the (pack, process) pair.
    ///
    /// This overrides the per-row derivation and is intended only once
    /// [`ProcessStatus::both_modules_complete`] holds; calling it earlier
    /// finalizes rows the derivation would not have.
    async fn mark_process_complete(&self, pack_id: &str, process_name: &str) -> Result<()>;

    /// Derives the completion state for one process on one pack, fresh from
    /// current row state and the injected catalog.
    async fn process_status(&self, pack_id: &str, process_name: &str) -> Result<ProcessStatus>;

    /// Merged rows for a pack, optionally narrowed to one process, in
    /// creation order (grouped by process when listing the whole pack).
    async fn get_checks(
        &self,
        pack_id: &str,
        process_name: Option<&str>,
    ) -> Result<Vec<CheckRow>>;

    /// All pack identifiers, sorted.
    async fn list_packs(&self) -> Result<Vec<String>>;

    /// Whether a pack row exists for the identifier.
    async fn pack_exists(&self, pack_id: &str) -> Result<bool>;

    /// Every NOT OK module verdict for the pack within the named processes,
    /// in row order.
    async fn not_ok_checks(
        &self,
        pack_id: &str,
        process_names: &[String],
    ) -> Result<Vec<NotOkFinding>>;

    /// Per pack, the processes that have any stored data; for line
    /// dashboards.
    async fn dashboard(&self) -> Result<Vec<PackProcesses>>;
}

/// Input validation shared by both backends, applied before any store
/// access.
pub(crate) fn validate_pair(pack_id: &str, process_name: &str) -> Result<()> {
    if pack_id.trim().is_empty() {
        return Err(StoreError::validation("pack id must not be empty"));
    }
    if process_name.trim().is_empty() {
        return Err(StoreError::validation("process name must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_batch(batch: &MergeBatch) -> Result<()> {
    validate_pair(&batch.pack_id, &batch.process_name)?;
    if let Some(observation) = batch
        .observations
        .iter()
        .find(|o| o.check_name.trim().is_empty())
    {
        return Err(StoreError::validation(format!(
            "observation with empty check name (module_x={:?}, module_y={:?})",
            observation.module_x, observation.module_y
        )));
    }
    Ok(())
}
