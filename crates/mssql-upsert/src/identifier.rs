//! Identifier validation and quoting for generated SQL.
//!
//! Schema, table, column and type names cannot be bound as parameters in DDL
//! or in the target of a MERGE, so they are interpolated. Every identifier
//! goes through [`validate_identifier`] and is then bracket-quoted with `]`
//! escaped. Catalog lookups bind the same names as `@P` parameters instead.
//!
//! Generated names derived from a table name (the staging type) are first
//! restricted to `[A-Za-z0-9_]` by [`sanitize_name`].

use crate::error::{Result, SyncError};

/// SQL Server identifier limit (sysname is nvarchar(128)).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers longer than [`MAX_IDENTIFIER_LENGTH`] characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::Identifier("identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(SyncError::Identifier(format!(
            "SECURITY: identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    let chars = name.chars().count();
    if chars > MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::Identifier(format!(
            "identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, chars, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote("users")?, "[users]");
/// assert_eq!(quote("table]name")?, "[table]]name]");
/// ```
pub fn quote(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify a name with its schema: `[schema].[name]`.
pub fn qualify(schema: &str, name: &str) -> Result<String> {
    Ok(format!("{}.{}", quote(schema)?, quote(name)?))
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("Customer").is_ok());
        assert!(validate_identifier("Order Details").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let err = validate_identifier("Cust\0omer").unwrap_err();
        assert!(err.to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_length_boundary() {
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_quote_escapes_bracket() {
        assert_eq!(quote("Customer").unwrap(), "[Customer]");
        assert_eq!(quote("odd]name").unwrap(), "[odd]]name]");
    }

    #[test]
    fn test_quote_sql_injection_safely_quoted() {
        let quoted = quote("x]; DROP TABLE Customer; --").unwrap();
        assert_eq!(quoted, "[x]]; DROP TABLE Customer; --]");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("Sales", "Customer").unwrap(), "[Sales].[Customer]");
        assert!(qualify("", "Customer").is_err());
        assert!(qualify("Sales", "").is_err());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Customer"), "Customer");
        assert_eq!(sanitize_name("Order Details"), "Order_Details");
        assert_eq!(sanitize_name("a]b;c"), "a_b_c");
    }
}
