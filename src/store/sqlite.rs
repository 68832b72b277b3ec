/*!
SQLite QC store

Embedded single-file backend of the [`QcStore`] trait. This is the backend a
line station runs against: one database file shared by every operator
terminal, WAL journaling for concurrent readers with one writer, and a busy
timeout long enough that the retry governor's backoff has something to work
with.

## Behavior

- Connections are opened with `journal_mode=WAL`, `synchronous=NORMAL`, a
  30s busy timeout, foreign keys enforced, `wal_autocheckpoint=1000` and a
  10 MB page cache.
- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling
  the feature assumes external migration orchestration.
- Every mutation runs inside a single `BEGIN IMMEDIATE` transaction: the
  write lock is taken up front so the read-merge-write sequence cannot race
  a concurrent writer between its lookup and its update. The transaction
  guard rolls back on drop, covering errors and cancelled callers alike.

## Design Goals

- Keep this module focused on database I/O; the merge-field resolution and
  completion derivation live in the `merge` and `status` modules.
- Whole-transaction commits keep the file self-consistent at every point
  between transactions, which is what lets the backup utility copy it as an
  opaque blob.
*/

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Connection, Row, SqliteConnection};
use tracing::{debug, info, instrument};

use super::config::StoreConfig;
use super::error::{Result, StoreError};
use super::retry::{RetryPolicy, with_retry};
use super::{QcStore, validate_batch, validate_pair};
use crate::catalog::ProcessCatalog;
use crate::merge::{fresh_row, merge_into};
use crate::model::{CheckRow, MergeBatch, NotOkFinding, PackProcesses, Station, Verdict};
use crate::status::{ProcessStatus, derive_process_status};

/// SQLite-backed QC store.
///
/// See the [module docs](self) for journal/durability configuration. Cheap
/// to clone is not a goal here; share it behind an `Arc` like any other
/// pooled handle.
pub struct SqliteQcStore {
    pool: SqlitePool,
    catalog: ProcessCatalog,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SqliteQcStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteQcStore").finish()
    }
}

impl SqliteQcStore {
    /// Connect (or create) the database at `database_url` with the standard
    /// line catalog and default retry policy.
    /// Example URL: `"sqlite://battery_mes.db"`.
    #[must_use = "store must be used to persist observations"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(StoreConfig::new(Some(database_url.to_string()))).await
    }

    /// Connect with explicit configuration (catalog, busy timeout, retry).
    pub async fn connect_with(config: StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| StoreError::Connection {
                message: format!("invalid sqlite url: {e}"),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true)
            .pragma("wal_autocheckpoint", "1000")
            .pragma("cache_size", "-10000");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.busy_timeout)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection {
                message: format!("connect error: {e}"),
            })?;

        #[cfg(feature = "sqlite-migrations")]
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(url = %config.database_url, "sqlite qc store ready");
        Ok(Self {
            pool,
            catalog: config.catalog,
            retry: config.retry,
        })
    }

    /// In-memory store for tests and throwaway sessions.
    ///
    /// Pins the pool to one connection: each new in-memory connection would
    /// otherwise be a fresh, empty database.
    pub async fn connect_in_memory(catalog: ProcessCatalog) -> Result<Self> {
        let mut config = StoreConfig::new(Some("sqlite::memory:".to_string()));
        config.max_connections = 1;
        config.catalog = catalog;
        Self::connect_with(config).await
    }

    /// The catalog this store derives completion against.
    #[must_use]
    pub fn catalog(&self) -> &ProcessCatalog {
        &self.catalog
    }

    /// One governed merge attempt: a fresh `BEGIN IMMEDIATE` transaction
    /// that re-reads current row state, so re-execution after backoff is
    /// always self-consistent.
    async fn merge_once(&self, batch: &MergeBatch) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        // Write-exclusive from the start; a plain BEGIN would only take the
        // write lock at the first UPDATE, after the lookup already ran. The
        // guard rolls back on drop, so an error or a cancelled caller can
        // never return a connection to the pool with the transaction open.
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;

        Self::merge_in_tx(&mut tx, batch).await?;

        tx.commit().await?;
        info!(
            pack_id = %batch.pack_id,
            process = %batch.process_name,
            checks = batch.observations.len(),
            "merged qc checks"
        );
        Ok(())
    }

    async fn merge_in_tx(conn: &mut SqliteConnection, batch: &MergeBatch) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO battery_packs (pack_id, created_at, updated_at)
            VALUES (?1, ?2, ?2)
            ON CONFLICT(pack_id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(&batch.pack_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        for observation in &batch.observations {
            let existing: Option<SqliteRow> = sqlx::query(
                r#"
                SELECT pack_id, process_name, check_name, module_x, module_y,
                       technician_name, qc_name, remarks,
                       start_date, end_date, created_at, updated_at
                FROM qc_checks
                WHERE pack_id = ?1 AND process_name = ?2 AND check_name = ?3
                LIMIT 1
                "#,
            )
            .bind(&batch.pack_id)
            .bind(&batch.process_name)
            .bind(&observation.check_name)
            .fetch_optional(&mut *conn)
            .await?;

            if let Some(row) = existing {
                let existing = decode_check_row(&row)?;
                let merged = merge_into(&existing, observation, batch, now);
                sqlx::query(
                    r#"
                    UPDATE qc_checks
                    SET module_x = ?1, module_y = ?2,
                        technician_name = ?3, qc_name = ?4, remarks = ?5,
                        end_date = ?6, updated_at = ?7
                    WHERE pack_id = ?8 AND process_name = ?9 AND check_name = ?10
                    "#,
                )
                .bind(Verdict::encode(merged.module_x))
                .bind(Verdict::encode(merged.module_y))
                .bind(&merged.technician_name)
                .bind(&merged.qc_name)
                .bind(&merged.remarks)
                .bind(merged.end_date)
                .bind(now)
                .bind(&batch.pack_id)
                .bind(&batch.process_name)
                .bind(&observation.check_name)
                .execute(&mut *conn)
                .await?;
                debug!(check = %observation.check_name, complete = merged.end_date.is_some(), "updated check");
            } else {
                let fields = fresh_row(observation, batch, now);
                sqlx::query(
                    r#"
                    INSERT INTO qc_checks
                        (pack_id, process_name, check_name, module_x, module_y,
                         technician_name, qc_name, remarks,
                         start_date, end_date, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                    "#,
                )
                .bind(&batch.pack_id)
                .bind(&batch.process_name)
                .bind(&observation.check_name)
                .bind(Verdict::encode(fields.module_x))
                .bind(Verdict::encode(fields.module_y))
                .bind(&fields.technician_name)
                .bind(&fields.qc_name)
                .bind(&fields.remarks)
                .bind(now)
                .bind(fields.end_date)
                .bind(now)
                .execute(&mut *conn)
                .await?;
                debug!(check = %observation.check_name, complete = fields.end_date.is_some(), "inserted check");
            }
        }

        Ok(())
    }

    async fn mark_complete_once(&self, pack_id: &str, process_name: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;

        let now = Utc::now();
        let done = sqlx::query(
            r#"
            UPDATE qc_checks SET end_date = ?1, updated_at = ?1
            WHERE pack_id = ?2 AND process_name = ?3
            "#,
        )
        .bind(now)
        .bind(pack_id)
        .bind(process_name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(pack_id, process = process_name, rows = done.rows_affected(), "process marked complete");
        Ok(())
    }
}

#[async_trait::async_trait]
impl QcStore for SqliteQcStore {
    #[instrument(skip(self, batch), fields(pack_id = %batch.pack_id, process = %batch.process_name), err)]
    async fn merge_checks(&self, batch: &MergeBatch) -> Result<()> {
        validate_batch(batch)?;
        with_retry(&self.retry, "merge_checks", || self.merge_once(batch)).await
    }

    #[instrument(skip(self), err)]
    async fn mark_process_complete(&self, pack_id: &str, process_name: &str) -> Result<()> {
        validate_pair(pack_id, process_name)?;
        with_retry(&self.retry, "mark_process_complete", || {
            self.mark_complete_once(pack_id, process_name)
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn process_status(&self, pack_id: &str, process_name: &str) -> Result<ProcessStatus> {
        validate_pair(pack_id, process_name)?;
        let rows = self.get_checks(pack_id, Some(process_name)).await?;
        Ok(derive_process_status(
            &rows,
            self.catalog.expected_checks(process_name),
        ))
    }

    #[instrument(skip(self), err)]
    async fn get_checks(
        &self,
        pack_id: &str,
        process_name: Option<&str>,
    ) -> Result<Vec<CheckRow>> {
        let rows = match process_name {
            Some(process) => {
                sqlx::query(
                    r#"
                    SELECT pack_id, process_name, check_name, module_x, module_y,
                           technician_name, qc_name, remarks,
                           start_date, end_date, created_at, updated_at
                    FROM qc_checks
                    WHERE pack_id = ?1 AND process_name = ?2
                    ORDER BY created_at ASC, id ASC
                    "#,
                )
                .bind(pack_id)
                .bind(process)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT pack_id, process_name, check_name, module_x, module_y,
                           technician_name, qc_name, remarks,
                           start_date, end_date, created_at, updated_at
                    FROM qc_checks
                    WHERE pack_id = ?1
                    ORDER BY process_name ASC, created_at ASC, id ASC
                    "#,
                )
                .bind(pack_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(decode_check_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_packs(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT pack_id FROM battery_packs ORDER BY pack_id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| r.get::<String, _>("pack_id"))
            .collect())
    }

    #[instrument(skip(self), err)]
    async fn pack_exists(&self, pack_id: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM battery_packs WHERE pack_id = ?1")
                .bind(pack_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    #[instrument(skip(self, process_names), err)]
    async fn not_ok_checks(
        &self,
        pack_id: &str,
        process_names: &[String],
    ) -> Result<Vec<NotOkFinding>> {
        if process_names.is_empty() {
            return Ok(vec![]);
        }

        // Table and column names are fixed; only the placeholder count is
        // dynamic, as in the paginated query builders elsewhere.
        let placeholders = (2..=process_names.len() + 1)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT process_name, check_name, module_x, module_y
            FROM qc_checks
            WHERE pack_id = ?1 AND process_name IN ({placeholders})
            ORDER BY process_name ASC, created_at ASC, id ASC
            "#
        );

        let mut query = sqlx::query(&sql).bind(pack_id);
        for process in process_names {
            query = query.bind(process);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut findings = Vec::new();
        for row in rows {
            let process_name: String = row.get("process_name");
            let check_name: String = row.get("check_name");
            let module_x = Verdict::decode(row.get::<String, _>("module_x").as_str())?;
            let module_y = Verdict::decode(row.get::<String, _>("module_y").as_str())?;
            if module_x == Some(Verdict::NotOk) {
                findings.push(NotOkFinding {
                    process_name: process_name.clone(),
                    check_name: check_name.clone(),
                    station: Station::ModuleX,
                });
            }
            if module_y == Some(Verdict::NotOk) {
                findings.push(NotOkFinding {
                    process_name,
                    check_name,
                    station: Station::ModuleY,
                });
            }
        }
        Ok(findings)
    }

    #[instrument(skip(self), err)]
    async fn dashboard(&self) -> Result<Vec<PackProcesses>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pack_id, process_name
            FROM qc_checks
            ORDER BY pack_id ASC, process_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut result: Vec<PackProcesses> = Vec::new();
        for row in rows {
            let pack_id: String = row.get("pack_id");
            let process_name: String = row.get("process_name");
            match result.last_mut() {
                Some(entry) if entry.pack_id == pack_id => entry.processes.push(process_name),
                _ => result.push(PackProcesses {
                    pack_id,
                    processes: vec![process_name],
                }),
            }
        }
        Ok(result)
    }
}

/// Decode one `qc_checks` row. Foreign verdict text surfaces as an
/// integrity error: nothing but the merge engine writes these columns.
fn decode_check_row(row: &SqliteRow) -> Result<CheckRow> {
    Ok(CheckRow {
        pack_id: row.try_get("pack_id")?,
        process_name: row.try_get("process_name")?,
        check_name: row.try_get("check_name")?,
        module_x: Verdict::decode(row.try_get::<String, _>("module_x")?.as_str())?,
        module_y: Verdict::decode(row.try_get::<String, _>("module_y")?.as_str())?,
        technician_name: row.try_get("technician_name")?,
        qc_name: row.try_get("qc_name")?,
        remarks: row.try_get("remarks")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
