//! Upsert and delete operations.
//!
//! Each call runs the same pipeline, strictly in order:
//!
//! 1. read the live column list of the target table,
//! 2. intersect it with the record type's fields and resolve the key columns,
//! 3. generate the staging type DDL and the load-and-merge batch,
//! 4. drop any leftover type of the same name, create the staging type,
//! 5. run the batch with the staged rows bound as one parameter,
//! 6. drop the staging type, whatever happened in 4 and 5.
//!
//! Every database phase is bounded by [`SyncOptions::command_timeout`].

use crate::config::SyncOptions;
use crate::error::{Result, SyncError};
use crate::executor::SyncTarget;
use crate::identifier::{qualify, validate_identifier};
use crate::record::{property_keys, property_names, Record};
use crate::schema::{effective_fields, uncovered_required_columns, unmapped_names, TableField};
use crate::sql::{delete_sql, load_batch_sql, merge_sql, resolve_keys, KeySet};
use crate::staging::{StagingBuffer, StagingType, STAGING_VARIABLE};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Rows inserted, updated or deleted by the MERGE.
    pub rows_affected: u64,

    /// Name of the staging type used, `None` when nothing was staged.
    pub staging_type: Option<String>,
}

impl SyncOutcome {
    fn empty() -> Self {
        Self {
            rows_affected: 0,
            staging_type: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation<'a> {
    Upsert(KeySet<'a>),
    Delete,
}

impl Operation<'_> {
    fn verb(&self) -> &'static str {
        match self {
            Operation::Upsert(_) => "Upserted",
            Operation::Delete => "Deleted",
        }
    }
}

/// Statements prepared for one call, before anything is staged.
struct Plan {
    staging: StagingType,
    create_sql: String,
    batch_sql: String,
    staged_fields: Vec<TableField>,
}

/// Runs upsert and delete operations against a [`SyncTarget`].
///
/// Matching rows by a key that is not unique in the target table makes the
/// MERGE update or delete every matching row, or fail if several staged rows
/// match the same target row. Keeping keys unique is up to the caller.
pub struct Syncer<T: SyncTarget> {
    target: T,
    options: SyncOptions,
}

impl<T: SyncTarget> Syncer<T> {
    pub fn new(target: T) -> Self {
        Self::with_options(target, SyncOptions::default())
    }

    pub fn with_options(target: T, options: SyncOptions) -> Self {
        Self { target, options }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Insert or update `records` in `schema.table`, matching on the table's
    /// primary key.
    pub async fn upsert<R: Record>(
        &self,
        records: &[R],
        schema: &str,
        table: &str,
    ) -> Result<SyncOutcome> {
        self.run(records, schema, table, Operation::Upsert(KeySet::PrimaryKey))
            .await
    }

    /// Insert or update `records`, matching on the columns `K` declares.
    ///
    /// `K` is only used for its field names; no `K` value is ever built.
    pub async fn upsert_with_key<R: Record, K: Record>(
        &self,
        records: &[R],
        schema: &str,
        table: &str,
    ) -> Result<SyncOutcome> {
        let key_names = property_names::<K>();
        self.upsert_on(records, schema, table, &key_names).await
    }

    /// Insert or update `records`, matching on the named columns.
    pub async fn upsert_on<R: Record>(
        &self,
        records: &[R],
        schema: &str,
        table: &str,
        key_columns: &[&str],
    ) -> Result<SyncOutcome> {
        self.run(
            records,
            schema,
            table,
            Operation::Upsert(KeySet::Columns(key_columns)),
        )
        .await
    }

    /// Delete the rows of `schema.table` matching `keys`, using every field of
    /// the key type as the match predicate.
    pub async fn delete<K: Record>(
        &self,
        keys: &[K],
        schema: &str,
        table: &str,
    ) -> Result<SyncOutcome> {
        self.run(keys, schema, table, Operation::Delete).await
    }

    /// Generate the statements `upsert` would run for `R`, without staging or
    /// executing anything. Returns the staging DDL and the batch.
    pub async fn preview_upsert<R: Record>(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<(String, String)> {
        let names = property_names::<R>();
        self.preview_upsert_columns(schema, table, &names).await
    }

    /// Like [`Syncer::preview_upsert`], for a record type carrying exactly
    /// the named columns.
    pub async fn preview_upsert_columns(
        &self,
        schema: &str,
        table: &str,
        columns: &[&str],
    ) -> Result<(String, String)> {
        let plan = self
            .plan(columns, schema, table, Operation::Upsert(KeySet::PrimaryKey))
            .await?;
        Ok((plan.create_sql, plan.batch_sql))
    }

    async fn run<R: Record>(
        &self,
        records: &[R],
        schema: &str,
        table: &str,
        op: Operation<'_>,
    ) -> Result<SyncOutcome> {
        let started = Instant::now();
        let keys = property_keys::<R>(None);
        let names: Vec<&str> = keys.iter().map(|k| k.name()).collect();
        let plan = self.plan(&names, schema, table, op).await?;

        if records.is_empty() {
            debug!("{}.{}: no records, nothing staged", schema, table);
            return Ok(SyncOutcome::empty());
        }

        let buffer = StagingBuffer::materialize(records, &keys, &plan.staged_fields)?;
        let payload = buffer.to_json()?;
        debug!(
            "{}.{}: staged {} rows x {} columns ({} bytes)",
            schema,
            table,
            buffer.len(),
            buffer.columns().len(),
            payload.len()
        );

        let target_name = format!("{}.{}", schema, table);
        let result = self.stage_and_execute(&plan, &target_name, &payload).await;
        let cleanup = self
            .timed("drop staging type", self.target.drop_staging_type(&plan.staging))
            .await;

        match (result, cleanup) {
            (Ok(rows_affected), Ok(())) => {
                info!(
                    "{} {} rows in {} ({} records, {:?})",
                    op.verb(),
                    rows_affected,
                    target_name,
                    records.len(),
                    started.elapsed()
                );
                Ok(SyncOutcome {
                    rows_affected,
                    staging_type: Some(plan.staging.name().to_string()),
                })
            }
            (Ok(_), Err(cleanup)) => {
                warn!("Failed to drop staging type {}: {}", plan.staging, cleanup);
                Err(SyncError::Cleanup {
                    type_name: plan.staging.to_string(),
                    source: Box::new(cleanup),
                })
            }
            (Err(primary), Ok(())) => Err(primary),
            (Err(primary), Err(cleanup)) => {
                warn!(
                    "Failed to drop staging type {} after error: {}",
                    plan.staging, cleanup
                );
                Err(SyncError::CleanupAfterFailure {
                    primary: Box::new(primary),
                    cleanup: Box::new(cleanup),
                })
            }
        }
    }

    /// Resolve metadata and generate statements. Touches the database only to
    /// read the column list.
    async fn plan(
        &self,
        names: &[&str],
        schema: &str,
        table: &str,
        op: Operation<'_>,
    ) -> Result<Plan> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        let target_name = format!("{}.{}", schema, table);

        let table_fields = self
            .timed("read table schema", self.target.table_fields(schema, table))
            .await?;

        let effective = effective_fields(&table_fields, names);
        for name in unmapped_names(&table_fields, names) {
            debug!("{}: field {} has no matching column, skipped", target_name, name);
        }

        let (staged_fields, key_fields) = match op {
            Operation::Upsert(key_set) => {
                let key_fields = resolve_keys(&target_name, &table_fields, &effective, key_set)?;
                if self.options.validate_required_columns {
                    let uncovered = uncovered_required_columns(&table_fields, &effective);
                    if !uncovered.is_empty() {
                        return Err(SyncError::MissingRequiredColumns {
                            table: target_name,
                            columns: uncovered,
                        });
                    }
                }
                (effective, key_fields)
            }
            Operation::Delete => {
                let key_fields = resolve_keys(
                    &target_name,
                    &table_fields,
                    &effective,
                    KeySet::Columns(names),
                )?;
                (key_fields.clone(), key_fields)
            }
        };

        let staging = StagingType::for_table(schema, table)?;
        let qualified = qualify(schema, table)?;
        let statement = match op {
            Operation::Upsert(_) => {
                merge_sql(&qualified, STAGING_VARIABLE, &staged_fields, &key_fields)?
            }
            Operation::Delete => delete_sql(&qualified, STAGING_VARIABLE, &key_fields)?,
        };

        Ok(Plan {
            create_sql: staging.create_sql(&staged_fields)?,
            batch_sql: load_batch_sql(&staging, &staged_fields, &statement)?,
            staging,
            staged_fields,
        })
    }

    async fn stage_and_execute(&self, plan: &Plan, table: &str, payload: &str) -> Result<u64> {
        self.timed(
            "drop existing staging type",
            self.target.drop_staging_type(&plan.staging),
        )
        .await?;
        self.timed(
            "create staging type",
            self.target.create_staging_type(&plan.staging, &plan.create_sql),
        )
        .await?;
        self.timed("execute", self.target.execute(table, &plan.batch_sql, payload))
            .await
    }

    async fn timed<V>(&self, phase: &str, fut: impl Future<Output = Result<V>>) -> Result<V> {
        match tokio::time::timeout(self.options.command_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                phase: phase.to_string(),
                seconds: self.options.command_timeout_secs,
            }),
        }
    }
}
