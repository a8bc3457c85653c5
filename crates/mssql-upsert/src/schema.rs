//! Live table metadata from the SQL Server catalog.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use tiberius::{Client, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::Compat;
use tracing::debug;

/// Column metadata for one live table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableField {
    /// Table name.
    pub table_name: String,

    /// Schema name.
    pub schema_name: String,

    /// Column name.
    pub column_name: String,

    /// Base system type name (e.g., "int", "nvarchar", "decimal").
    pub data_type: String,

    /// Stored length in bytes (-1 for max).
    pub max_length: i32,

    /// Ordinal column id (1-based). Defines staging, DDL and INSERT order.
    pub column_id: i32,

    /// Numeric precision.
    pub precision: i32,

    /// Numeric scale (fractional seconds precision for temporal types).
    pub scale: i32,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is an identity column.
    pub is_identity: bool,

    /// Whether a default constraint is attached.
    pub has_default: bool,

    /// Whether the column is computed.
    pub is_computed: bool,
}

impl TableField {
    /// True for a `rowversion` column, whose value the server sets on every write.
    pub fn is_rowversion(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("timestamp")
            || self.data_type.eq_ignore_ascii_case("rowversion")
    }

    /// True when an INSERT must supply a value for this column.
    pub fn is_required(&self) -> bool {
        !self.is_nullable
            && !self.is_identity
            && !self.has_default
            && !self.is_computed
            && !self.is_rowversion()
    }
}

/// Catalog query for the columns of one table, ordered by column id.
///
/// `ut` is the column's declared type and `bt` its base system type. Alias
/// types (including `sysname`) report their base type. CLR types such as
/// `geography` have no base row and report their own name, which the size
/// resolver rejects.
pub const TABLE_FIELDS_SQL: &str = r#"
    SELECT
        t.name AS table_name,
        s.name AS schema_name,
        c.name AS column_name,
        COALESCE(bt.name, ut.name) AS data_type,
        CAST(c.max_length AS INT) AS max_length,
        c.column_id,
        CAST(c.precision AS INT) AS precision,
        CAST(c.scale AS INT) AS scale,
        CAST(CASE WHEN pk.column_id IS NULL THEN 0 ELSE 1 END AS BIT) AS is_primary_key,
        c.is_nullable,
        c.is_identity,
        CAST(CASE WHEN c.default_object_id = 0 THEN 0 ELSE 1 END AS BIT) AS has_default,
        c.is_computed
    FROM sys.tables t
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    JOIN sys.columns c ON t.object_id = c.object_id
    JOIN sys.types ut ON c.user_type_id = ut.user_type_id
    LEFT JOIN sys.types bt ON bt.user_type_id = c.system_type_id
        AND bt.is_user_defined = 0
        AND ut.is_assembly_type = 0
    LEFT JOIN (
        SELECT ic.object_id, ic.column_id
        FROM sys.indexes i
        JOIN sys.index_columns ic
            ON i.object_id = ic.object_id
            AND i.index_id = ic.index_id
        WHERE i.is_primary_key = 1
    ) pk ON pk.object_id = c.object_id AND pk.column_id = c.column_id
    WHERE s.name = @P1
      AND t.name = @P2
    ORDER BY c.column_id
"#;

/// Load every column of `schema.table`.
///
/// Returns [`SyncError::TableNotFound`] when the catalog has no columns for
/// the table, which covers both a missing table and one the login cannot see.
pub async fn load_table_fields(
    client: &mut Client<Compat<TcpStream>>,
    schema: &str,
    table: &str,
) -> Result<Vec<TableField>> {
    let mut query = Query::new(TABLE_FIELDS_SQL);
    query.bind(schema);
    query.bind(table);

    let stream = query.query(client).await?;
    let rows = stream.into_first_result().await?;

    let mut fields = Vec::with_capacity(rows.len());
    for row in &rows {
        fields.push(field_from_row(row)?);
    }

    if fields.is_empty() {
        return Err(SyncError::TableNotFound {
            schema: schema.to_string(),
            table: table.to_string(),
        });
    }

    // The query orders by column_id already; keep the invariant explicit.
    fields.sort_by_key(|f| f.column_id);

    debug!("Loaded {} columns for {}.{}", fields.len(), schema, table);
    Ok(fields)
}

fn field_from_row(row: &Row) -> Result<TableField> {
    let text = |idx: usize| -> Result<String> {
        Ok(row.try_get::<&str, _>(idx)?.unwrap_or_default().to_string())
    };

    Ok(TableField {
        table_name: text(0)?,
        schema_name: text(1)?,
        column_name: text(2)?,
        data_type: text(3)?,
        max_length: row.try_get::<i32, _>(4)?.unwrap_or(0),
        column_id: row.try_get::<i32, _>(5)?.unwrap_or(0),
        precision: row.try_get::<i32, _>(6)?.unwrap_or(0),
        scale: row.try_get::<i32, _>(7)?.unwrap_or(0),
        is_primary_key: row.try_get::<bool, _>(8)?.unwrap_or(false),
        is_nullable: row.try_get::<bool, _>(9)?.unwrap_or(true),
        is_identity: row.try_get::<bool, _>(10)?.unwrap_or(false),
        has_default: row.try_get::<bool, _>(11)?.unwrap_or(false),
        is_computed: row.try_get::<bool, _>(12)?.unwrap_or(false),
    })
}

/// Intersect live columns with the record's logical names.
///
/// The result keeps only writable columns whose name the record declares,
/// ordered by column id. Record names without a column are not an error.
pub fn effective_fields(fields: &[TableField], names: &[&str]) -> Vec<TableField> {
    let mut effective: Vec<TableField> = fields
        .iter()
        .filter(|f| !f.is_computed && names.contains(&f.column_name.as_str()))
        .cloned()
        .collect();
    effective.sort_by_key(|f| f.column_id);
    effective
}

/// Record names with no matching writable column.
pub fn unmapped_names<'a>(fields: &[TableField], names: &[&'a str]) -> Vec<&'a str> {
    names
        .iter()
        .filter(|name| !fields.iter().any(|f| !f.is_computed && f.column_name == **name))
        .copied()
        .collect()
}

/// Required columns (see [`TableField::is_required`]) missing from `effective`.
pub fn uncovered_required_columns(fields: &[TableField], effective: &[TableField]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| f.is_required())
        .filter(|f| !effective.iter().any(|e| e.column_name == f.column_name))
        .map(|f| f.column_name.clone())
        .collect()
}
