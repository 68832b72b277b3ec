//! # qcledger: Concurrent QC Record Store
//!
//! qcledger is the data core of a battery-pack assembly line: two
//! independent inspection stations ("Module X" and "Module Y") submit
//! partial quality-control results for the same checks, and the store
//! merges those submissions without ever losing either side's data, even
//! under contention on a single shared database.
//!
//! ## Core Concepts
//!
//! - **Pack**: one physical battery pack, created implicitly by its first
//!   check write.
//! - **Check Observation**: the atomic merge unit, keyed by
//!   (pack, process, check); at most one row per triple, ever.
//! - **Merge-write**: a submission only ever *adds* information; an empty
//!   field never erases what another station already recorded.
//! - **Catalog**: immutable configuration listing each process's expected
//!   checks; it is the denominator for completion, independent of which
//!   rows happen to exist.
//! - **Retry governor**: every mutation runs under bounded exponential
//!   backoff against lock/serialization contention.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use qcledger::model::{CheckObservation, MergeBatch, Verdict};
//! use qcledger::store::{QcStore, SqliteQcStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteQcStore::connect("sqlite://battery_mes.db").await?;
//!
//! // Station X records its half of two checks.
//! store
//!     .merge_checks(
//!         &MergeBatch::new("PACK-0042", "Cell sorting")
//!             .with_technician("A. Rivera")
//!             .with_observations([
//!                 CheckObservation::new("Jig setup on the flat surface")
//!                     .with_module_x(Verdict::Ok),
//!                 CheckObservation::new("Visual & spacing inspection")
//!                     .with_module_x(Verdict::NotOk),
//!             ]),
//!     )
//!     .await?;
//!
//! // Station Y later fills in its half; nothing from station X is lost.
//! store
//!     .merge_checks(
//!         &MergeBatch::new("PACK-0042", "Cell sorting").with_observation(
//!             CheckObservation::new("Jig setup on the flat surface")
//!                 .with_module_y(Verdict::Ok),
//!         ),
//!     )
//!     .await?;
//!
//! let status = store.process_status("PACK-0042", "Cell sorting").await?;
//! println!(
//!     "{}/{} checks complete",
//!     status.completed_checks, status.total_checks
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Each merge call executes inside one write-exclusive transaction (SQLite
//! `BEGIN IMMEDIATE`; Postgres pack-row `FOR UPDATE`), so the
//! read-merge-write sequence can never race another writer into duplicate
//! rows or lost fields. Contention surfaces as backoff, and after the retry
//! budget as [`store::StoreError::WriteContention`] with the store
//! unchanged.
//!
//! ## Module Guide
//!
//! - [`model`] - Verdicts, observations, batches, and stored rows
//! - [`catalog`] - Expected-check catalog per production process
//! - [`status`] - Completion derivation (`ProcessStatus`)
//! - [`store`] - The `QcStore` trait, backends, retry governor, errors
//! - [`telemetry`] - Tracing subscriber setup for hosts

pub mod catalog;
mod merge;
pub mod model;
pub mod status;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod store;
pub mod telemetry;
