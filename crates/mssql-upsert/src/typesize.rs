//! Size clauses for redeclaring a column in the staging table type.

use crate::error::{Result, SyncError};
use crate::schema::TableField;

/// Return the size/precision clause that follows the type name when the
/// column is redeclared, e.g. `(25)` for `nvarchar(25)`.
///
/// Unknown types are an error rather than a guess: a wrong clause changes the
/// shape of the staging type the payload is loaded into.
pub fn data_type_size(field: &TableField) -> Result<String> {
    size_clause(
        &field.column_name,
        &field.data_type,
        field.max_length,
        field.precision,
        field.scale,
    )
}

/// Resolve the clause from the raw catalog values.
pub fn size_clause(
    column: &str,
    data_type: &str,
    max_length: i32,
    precision: i32,
    scale: i32,
) -> Result<String> {
    let lower = data_type.to_lowercase();
    let clause = match lower.as_str() {
        // Stored length is in bytes, two per character
        "nchar" | "nvarchar" => length_clause(max_length, |len| len / 2),

        "char" | "varchar" | "binary" | "varbinary" => length_clause(max_length, |len| len),

        // Fractional seconds precision
        "time" | "datetimeoffset" => format!("({})", scale),

        "bigint" | "bit" | "date" | "datetime" | "datetime2" | "float" | "int" | "money"
        | "ntext" | "real" | "smalldatetime" | "smallint" | "smallmoney" | "text" | "tinyint"
        | "uniqueidentifier" | "xml" => String::new(),

        "decimal" | "numeric" => format!("({},{})", precision, scale),

        _ => {
            return Err(SyncError::UnsupportedType {
                column: column.to_string(),
                data_type: data_type.to_string(),
            })
        }
    };
    Ok(clause)
}

fn length_clause(max_length: i32, chars: impl Fn(i32) -> i32) -> String {
    if max_length == -1 {
        "(MAX)".to_string()
    } else {
        format!("({})", chars(max_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(data_type: &str, max_length: i32, precision: i32, scale: i32) -> Result<String> {
        size_clause("col", data_type, max_length, precision, scale)
    }

    #[test]
    fn test_unicode_string_types() {
        assert_eq!(size("nvarchar", 50, 0, 0).unwrap(), "(25)");
        assert_eq!(size("nvarchar", -1, 0, 0).unwrap(), "(MAX)");
        assert_eq!(size("nchar", 20, 0, 0).unwrap(), "(10)");
    }

    #[test]
    fn test_non_unicode_and_binary_types() {
        assert_eq!(size("varchar", 50, 0, 0).unwrap(), "(50)");
        assert_eq!(size("char", 2, 0, 0).unwrap(), "(2)");
        assert_eq!(size("varchar", -1, 0, 0).unwrap(), "(MAX)");
        assert_eq!(size("varbinary", 16, 0, 0).unwrap(), "(16)");
        assert_eq!(size("varbinary", -1, 0, 0).unwrap(), "(MAX)");
    }

    #[test]
    fn test_decimal_types() {
        assert_eq!(size("decimal", 9, 10, 2).unwrap(), "(10,2)");
        assert_eq!(size("numeric", 9, 18, 0).unwrap(), "(18,0)");
    }

    #[test]
    fn test_fixed_size_types_are_empty() {
        for t in [
            "int", "bigint", "bit", "date", "datetime", "datetime2", "float", "money", "ntext",
            "real", "smalldatetime", "smallint", "smallmoney", "text", "tinyint",
            "uniqueidentifier", "xml",
        ] {
            assert_eq!(size(t, 8, 0, 0).unwrap(), "", "type {}", t);
        }
    }

    #[test]
    fn test_time_types_use_scale() {
        assert_eq!(size("time", 5, 16, 7).unwrap(), "(7)");
        assert_eq!(size("datetimeoffset", 10, 34, 3).unwrap(), "(3)");
    }

    #[test]
    fn test_type_name_is_case_insensitive() {
        assert_eq!(size("NVARCHAR", 50, 0, 0).unwrap(), "(25)");
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let err = size_clause("Shape", "geometry", -1, 0, 0).unwrap_err();
        match err {
            SyncError::UnsupportedType { column, data_type } => {
                assert_eq!(column, "Shape");
                assert_eq!(data_type, "geometry");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(size("sql_variant", 8016, 0, 0).is_err());
    }

    #[test]
    fn test_data_type_size_reads_field() {
        let mut field = crate::schema::fixtures::field("FirstName", "nvarchar", 2);
        field.max_length = 50;
        assert_eq!(data_type_size(&field).unwrap(), "(25)");
    }
}
