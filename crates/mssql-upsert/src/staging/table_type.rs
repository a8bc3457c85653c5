//! Ephemeral user-defined table types used as the staging vehicle.

use crate::error::Result;
use crate::identifier::{qualify, quote, sanitize_name, validate_identifier, MAX_IDENTIFIER_LENGTH};
use crate::schema::TableField;
use crate::typesize::data_type_size;
use std::fmt;
use uuid::Uuid;

/// Batch-local table variable the staged rows are loaded into.
pub const STAGING_VARIABLE: &str = "@staged";

/// Length of the random suffix (uuid v4, simple form).
const SUFFIX_LEN: usize = 32;

/// A uniquely named table type in the target schema, alive for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingType {
    schema: String,
    name: String,
}

impl StagingType {
    /// Generate a fresh name for staging rows bound for `schema.table`.
    ///
    /// The name is `<table>_<32 hex>`, with the table part sanitized and
    /// truncated so the whole name stays within the identifier limit.
    pub fn for_table(schema: &str, table: &str) -> Result<Self> {
        validate_identifier(schema)?;
        validate_identifier(table)?;

        let prefix_len = MAX_IDENTIFIER_LENGTH - SUFFIX_LEN - 1;
        let prefix: String = sanitize_name(table).chars().take(prefix_len).collect();
        let name = format!("{}_{}", prefix, Uuid::new_v4().simple());

        Ok(Self {
            schema: schema.to_string(),
            name,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `[schema].[name]`
    pub fn qualified(&self) -> Result<String> {
        qualify(&self.schema, &self.name)
    }

    /// Drop the type if it exists. Binds schema as `@P1` and name as `@P2`.
    pub fn drop_if_exists_sql(&self) -> Result<String> {
        Ok(format!(
            "IF EXISTS (SELECT 1 FROM sys.types t \
             JOIN sys.schemas s ON t.schema_id = s.schema_id \
             WHERE t.is_table_type = 1 AND s.name = @P1 AND t.name = @P2) \
             DROP TYPE {};",
            self.qualified()?
        ))
    }

    /// `CREATE TYPE` redeclaring `fields` in ordinal order.
    ///
    /// `NOT NULL` is emitted exactly for non-nullable columns. Identity and
    /// default properties are not carried over; the type only shapes the rows.
    pub fn create_sql(&self, fields: &[TableField]) -> Result<String> {
        let mut ordered: Vec<&TableField> = fields.iter().collect();
        ordered.sort_by_key(|f| f.column_id);

        let mut columns = Vec::with_capacity(ordered.len());
        for field in ordered {
            let not_null = if field.is_nullable { "" } else { " NOT NULL" };
            columns.push(format!(
                "{} {}{}{}",
                quote(&field.column_name)?,
                field.data_type,
                data_type_size(field)?,
                not_null
            ));
        }

        Ok(format!(
            "CREATE TYPE {} AS TABLE ({});",
            self.qualified()?,
            columns.join(", ")
        ))
    }
}

impl fmt::Display for StagingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::schema::fixtures::{customer_table, field};

    #[test]
    fn test_name_is_table_plus_hex_suffix() {
        let staging = StagingType::for_table("Sales", "Customer").unwrap();
        let (prefix, suffix) = staging.name().rsplit_once('_').unwrap();
        assert_eq!(prefix, "Customer");
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(staging.schema(), "Sales");
    }

    #[test]
    fn test_names_are_unique_per_call() {
        let a = StagingType::for_table("Sales", "Customer").unwrap();
        let b = StagingType::for_table("Sales", "Customer").unwrap();
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn test_name_is_sanitized_and_bounded() {
        let staging = StagingType::for_table("dbo", "Order Details").unwrap();
        assert!(staging.name().starts_with("Order_Details_"));

        let long = "x".repeat(MAX_IDENTIFIER_LENGTH);
        let staging = StagingType::for_table("dbo", &long).unwrap();
        assert_eq!(staging.name().len(), MAX_IDENTIFIER_LENGTH);
    }

    #[test]
    fn test_invalid_identifiers_rejected() {
        assert!(StagingType::for_table("", "Customer").is_err());
        assert!(StagingType::for_table("Sales", "Cust\0").is_err());
    }

    #[test]
    fn test_drop_if_exists_sql() {
        let staging = StagingType::for_table("Sales", "Customer").unwrap();
        let sql = staging.drop_if_exists_sql().unwrap();
        assert!(sql.starts_with("IF EXISTS (SELECT 1 FROM sys.types t"));
        assert!(sql.contains("t.is_table_type = 1 AND s.name = @P1 AND t.name = @P2"));
        assert!(sql.ends_with(&format!("DROP TYPE [Sales].[{}];", staging.name())));
    }

    #[test]
    fn test_create_sql_ordinal_order_and_nullability() {
        let staging = StagingType::for_table("Sales", "Customer").unwrap();
        let mut fields = customer_table();
        fields.reverse();

        let sql = staging.create_sql(&fields).unwrap();
        let expected = format!(
            "CREATE TYPE [Sales].[{}] AS TABLE ([CustomerID] int NOT NULL, \
             [FirstName] nvarchar(50) NOT NULL, [LastName] nvarchar(50) NOT NULL, \
             [City] nvarchar(50), [State] nvarchar(50));",
            staging.name()
        );
        assert_eq!(sql, expected);
    }

    #[test]
    fn test_create_sql_unsupported_type() {
        let staging = StagingType::for_table("Sales", "Customer").unwrap();
        let fields = vec![field("Location", "geography", 1)];
        let err = staging.create_sql(&fields).unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedType { .. }));
    }
}
