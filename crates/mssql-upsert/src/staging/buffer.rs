//! Columnar staging buffer built from a record collection.

use crate::error::{Result, SyncError};
use crate::record::PropertyKey;
use crate::schema::TableField;
use crate::value::{SqlNullType, SqlValue};
use serde_json::Value as JsonValue;

/// One staged column: the table column name and the kind of its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingColumn {
    pub name: String,
    pub kind: SqlNullType,
}

/// Rows staged for transfer, one value per column in column order.
///
/// Absent values are stored as `SqlValue::Null(kind)` with the column's kind,
/// so a column's type is known even when every value in it is NULL.
#[derive(Debug, Clone, Default)]
pub struct StagingBuffer {
    columns: Vec<StagingColumn>,
    rows: Vec<Vec<SqlValue>>,
}

impl StagingBuffer {
    /// Stage `records` against the effective field set.
    ///
    /// Columns follow the order of `fields` (ordinal order), not the order the
    /// record type declares its fields in. Every field must have a matching
    /// key; the effective field set is derived from the keys, so a miss means
    /// the two were resolved against different record types.
    pub fn materialize<T>(
        records: &[T],
        keys: &[PropertyKey<T>],
        fields: &[TableField],
    ) -> Result<Self> {
        let mut ordered = Vec::with_capacity(fields.len());
        let mut missing = Vec::new();
        for field in fields {
            match keys.iter().find(|k| k.name() == field.column_name) {
                Some(key) => ordered.push(key),
                None => missing.push(field.column_name.clone()),
            }
        }

        if !missing.is_empty() {
            let table = fields
                .first()
                .map(|f| format!("{}.{}", f.schema_name, f.table_name))
                .unwrap_or_default();
            return Err(SyncError::MissingKeyField { table, missing });
        }

        let columns = ordered
            .iter()
            .map(|key| StagingColumn {
                name: key.name().to_string(),
                kind: key.kind(),
            })
            .collect();

        let rows = records
            .iter()
            .map(|record| ordered.iter().map(|key| key.value(record)).collect())
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[StagingColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize as a JSON array of positional row arrays.
    ///
    /// This is the wire form of the structured parameter. Columns carry no
    /// names at this level, only positions.
    pub fn to_json(&self) -> Result<String> {
        let rows: Vec<JsonValue> = self
            .rows
            .iter()
            .map(|row| JsonValue::Array(row.iter().map(SqlValue::to_json).collect()))
            .collect();
        Ok(serde_json::to_string(&rows)?)
    }
}
