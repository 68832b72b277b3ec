/*!
PostgreSQL QC store

Client/server backend of the [`QcStore`] trait, for deployments where
several hosts share one database. No local journal tuning applies; instead,
merge transactions explicitly request READ COMMITTED and serialize per pack
by locking the pack row with `SELECT … FOR UPDATE` immediately after the
pack upsert, the Postgres equivalent of taking SQLite's write lock up
front.

When the `postgres-migrations` feature is enabled, embedded migrations
(`sqlx::migrate!("./migrations/postgres")`) run on connect; disabling the
feature assumes external migration orchestration.

Serialization failures (SQLSTATE 40001) and deadlocks (40P01) are the
contention signals the retry governor absorbs for this backend.
*/

use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};
use tracing::{debug, info, instrument};

use super::config::StoreConfig;
use super::error::{Result, StoreError};
use super::retry::{RetryPolicy, with_retry};
use super::{QcStore, validate_batch, validate_pair};
use crate::catalog::ProcessCatalog;
use crate::merge::{fresh_row, merge_into};
use crate::model::{CheckRow, MergeBatch, NotOkFinding, PackProcesses, Station, Verdict};
use crate::status::{ProcessStatus, derive_process_status};

/// PostgreSQL-backed QC store.
pub struct PostgresQcStore {
    pool: PgPool,
    catalog: ProcessCatalog,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PostgresQcStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresQcStore").finish()
    }
}

impl PostgresQcStore {
    /// Connect to the database at `database_url` with the standard line
    /// catalog and default retry policy.
    /// Example URL: `"postgres://mes@db/battery_mes"`.
    #[must_use = "store must be used to persist observations"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(StoreConfig::new(Some(database_url.to_string()))).await
    }

    /// Connect with explicit configuration (catalog, acquire timeout, retry).
    pub async fn connect_with(config: StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.busy_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Connection {
                message: format!("connect error: {e}"),
            })?;

        #[cfg(feature = "postgres-migrations")]
        sqlx::migrate!("./migrations/postgres").run(&pool).await?;

        info!(url = %config.database_url, "postgres qc store ready");
        Ok(Self {
            pool,
            catalog: config.catalog,
            retry: config.retry,
        })
    }

    /// The catalog this store derives completion against.
    #[must_use]
    pub fn catalog(&self) -> &ProcessCatalog {
        &self.catalog
    }

    async fn merge_once(&self, batch: &MergeBatch) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        Self::merge_in_tx(&mut tx, batch).await?;

        tx.commit().await.map_err(StoreError::from)?;
        info!(
            pack_id = %batch.pack_id,
            process = %batch.process_name,
            checks = batch.observations.len(),
            "merged qc checks"
        );
        Ok(())
    }

    async fn merge_in_tx(conn: &mut PgConnection, batch: &MergeBatch) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO battery_packs (pack_id, created_at, updated_at)
            VALUES ($1, $2, $2)
            ON CONFLICT (pack_id) DO UPDATE SET updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&batch.pack_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        // Serialize concurrent merges targeting the same pack: the row lock
        // plays the role SQLite's immediate write lock plays.
        sqlx::query("SELECT pack_id FROM battery_packs WHERE pack_id = $1 FOR UPDATE")
            .bind(&batch.pack_id)
            .fetch_one(&mut *conn)
            .await?;

        for observation in &batch.observations {
            let existing: Option<PgRow> = sqlx::query(
                r#"
                SELECT pack_id, process_name, check_name, module_x, module_y,
                       technician_name, qc_name, remarks,
                       start_date, end_date, created_at, updated_at
                FROM qc_checks
                WHERE pack_id = $1 AND process_name = $2 AND check_name = $3
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
                    SET module_x = $1, module_y = $2,
                        technician_name = $3, qc_name = $4, remarks = $5,
                        end_date = $6, updated_at = $7
                    WHERE pack_id = $8 AND process_name = $9 AND check_name = $10
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
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
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
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let now = Utc::now();
        let done = sqlx::query(
            r#"
            UPDATE qc_checks SET end_date = $1, updated_at = $1
            WHERE pack_id = $2 AND process_name = $3
            "#,
        )
        .bind(now)
        .bind(pack_id)
        .bind(process_name)
        .execute(&mut *tx)
        .await?;
        tx.commit().await.map_err(StoreError::from)?;
        info!(pack_id, process = process_name, rows = done.rows_affected(), "process marked complete");
        Ok(())
    }
}

#[async_trait::async_trait]
impl QcStore for PostgresQcStore {
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
                    WHERE pack_id = $1 AND process_name = $2
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
                    WHERE pack_id = $1
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
            sqlx::query_scalar("SELECT COUNT(*) FROM battery_packs WHERE pack_id = $1")
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

        let placeholders = (2..=process_names.len() + 1)
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT process_name, check_name, module_x, module_y
            FROM qc_checks
            WHERE pack_id = $1 AND process_name IN ({placeholders})
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

/// Decode one `qc_checks` row; foreign verdict text is an integrity error.
fn decode_check_row(row: &PgRow) -> Result<CheckRow> {
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
