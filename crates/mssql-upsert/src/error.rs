//! Error types for the upsert library.

use thiserror::Error;

/// Main error type for sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identifier rejected before being interpolated into SQL
    #[error("Invalid identifier: {0}")]
    Identifier(String),

    /// Database connection or query error outside statement execution
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// The catalog returned no columns for the table
    #[error("Table {schema}.{table} not found or has no accessible columns")]
    TableNotFound { schema: String, table: String },

    /// Table has no primary key (required for key-less upsert)
    #[error("Table {0} has no primary key - upsert requires a primary key or an explicit key type")]
    NoPrimaryKey(String),

    /// Non-nullable columns the record type cannot supply
    #[error("Table {table} has required columns not covered by the record type: {}", .columns.join(", "))]
    MissingRequiredColumns { table: String, columns: Vec<String> },

    /// Column type with no staging DDL rule
    #[error("Column {column} has unsupported data type '{data_type}'")]
    UnsupportedType { column: String, data_type: String },

    /// Requested key fields that did not resolve to table columns
    #[error("Missing key fields for {table}: {}", .missing.join(", "))]
    MissingKeyField { table: String, missing: Vec<String> },

    /// The database rejected the generated statement
    #[error("Execution failed for table {table}: {source}")]
    Execution {
        table: String,
        #[source]
        source: tiberius::error::Error,
    },

    /// A phase exceeded the configured command timeout
    #[error("{phase} timed out after {seconds}s")]
    Timeout { phase: String, seconds: u64 },

    /// Dropping the staging type failed after the operation itself succeeded
    #[error("Failed to drop staging type {type_name}: {source}")]
    Cleanup {
        type_name: String,
        #[source]
        source: Box<SyncError>,
    },

    /// The operation failed and dropping the staging type failed as well
    #[error("{primary}\n  Cleanup also failed: {cleanup}")]
    CleanupAfterFailure {
        primary: Box<SyncError>,
        cleanup: Box<SyncError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`SyncError`] so callers can branch on the
/// failure without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SchemaResolution,
    UnsupportedType,
    MissingKeyField,
    Execution,
    Cleanup,
    Other,
}

impl SyncError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Execution error
    pub fn execution(table: impl Into<String>, source: tiberius::error::Error) -> Self {
        SyncError::Execution {
            table: table.into(),
            source,
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::TableNotFound { .. }
            | SyncError::NoPrimaryKey(_)
            | SyncError::MissingRequiredColumns { .. } => ErrorKind::SchemaResolution,
            SyncError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            SyncError::MissingKeyField { .. } => ErrorKind::MissingKeyField,
            SyncError::Execution { .. } | SyncError::Timeout { .. } => ErrorKind::Execution,
            SyncError::Cleanup { .. } | SyncError::CleanupAfterFailure { .. } => ErrorKind::Cleanup,
            _ => ErrorKind::Other,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) | SyncError::Identifier(_) => 1,
            SyncError::Io(_) => 7,
            _ => match self.kind() {
                ErrorKind::SchemaResolution => 2,
                ErrorKind::UnsupportedType => 3,
                ErrorKind::MissingKeyField => 4,
                ErrorKind::Execution => 5,
                ErrorKind::Cleanup => 6,
                ErrorKind::Other => 8,
            },
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let not_found = SyncError::TableNotFound {
            schema: "Sales".into(),
            table: "Customer".into(),
        };
        assert_eq!(not_found.kind(), ErrorKind::SchemaResolution);

        let missing = SyncError::MissingKeyField {
            table: "Sales.Customer".into(),
            missing: vec!["Nickname".into()],
        };
        assert_eq!(missing.kind(), ErrorKind::MissingKeyField);
        assert!(missing.to_string().contains("Nickname"));

        let unsupported = SyncError::UnsupportedType {
            column: "Shape".into(),
            data_type: "geometry".into(),
        };
        assert_eq!(unsupported.kind(), ErrorKind::UnsupportedType);
        assert_eq!(SyncError::Config("x".into()).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_cleanup_after_failure_reports_both() {
        let err = SyncError::CleanupAfterFailure {
            primary: Box::new(SyncError::NoPrimaryKey("Sales.Customer".into())),
            cleanup: Box::new(SyncError::Timeout {
                phase: "drop staging type".into(),
                seconds: 30,
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("no primary key"));
        assert!(msg.contains("drop staging type timed out"));
        assert_eq!(err.kind(), ErrorKind::Cleanup);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let err = SyncError::Cleanup {
            type_name: "Customer_abc".into(),
            source: Box::new(SyncError::Timeout {
                phase: "drop staging type".into(),
                seconds: 5,
            }),
        };
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Failed to drop staging type Customer_abc"));
        assert!(detailed.contains("Caused by:\n  1: drop staging type timed out after 5s"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SyncError::Config("bad".into()).exit_code(), 1);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(SyncError::Io(io).exit_code(), 7);
        assert_eq!(SyncError::NoPrimaryKey("t".into()).exit_code(), 2);
    }
}
