//! Statement generation: key resolution, MERGE upsert/delete, and the batch
//! that loads the staged rows before running the statement.
//!
//! Generation is pure string assembly over already-resolved column metadata.
//! Identifiers are validated and bracket-quoted; row data never appears in the
//! generated text, it is bound as the single `@P1` parameter.

use crate::error::{Result, SyncError};
use crate::identifier::quote;
use crate::schema::TableField;
use crate::staging::{StagingType, STAGING_VARIABLE};
use crate::typesize::data_type_size;

/// Which columns match staged rows to target rows.
#[derive(Debug, Clone, Copy)]
pub enum KeySet<'a> {
    /// The live table's primary key.
    PrimaryKey,
    /// Columns named by a caller-supplied key projection.
    Columns(&'a [&'a str]),
}

/// Resolve the key columns, ordered by column id.
///
/// `table_fields` is the full live column list and `effective` the effective
/// field set. Every key column must be part of the effective set, otherwise
/// the staged rows could not carry its value.
pub fn resolve_keys(
    table: &str,
    table_fields: &[TableField],
    effective: &[TableField],
    keys: KeySet<'_>,
) -> Result<Vec<TableField>> {
    let mut resolved: Vec<TableField> = match keys {
        KeySet::PrimaryKey => {
            let pk: Vec<&TableField> = table_fields.iter().filter(|f| f.is_primary_key).collect();
            if pk.is_empty() {
                return Err(SyncError::NoPrimaryKey(table.to_string()));
            }

            let missing: Vec<String> = pk
                .iter()
                .filter(|f| !effective.iter().any(|e| e.column_name == f.column_name))
                .map(|f| f.column_name.clone())
                .collect();
            if !missing.is_empty() {
                return Err(SyncError::MissingKeyField {
                    table: table.to_string(),
                    missing,
                });
            }

            pk.into_iter().cloned().collect()
        }
        KeySet::Columns(names) => {
            // A column named twice is one key column
            let mut wanted: Vec<&str> = Vec::with_capacity(names.len());
            for name in names {
                if !wanted.contains(name) {
                    wanted.push(*name);
                }
            }

            let found: Vec<TableField> = effective
                .iter()
                .filter(|f| wanted.contains(&f.column_name.as_str()))
                .cloned()
                .collect();

            if found.len() != wanted.len() || wanted.is_empty() {
                let missing: Vec<String> = wanted
                    .iter()
                    .filter(|n| !found.iter().any(|f| f.column_name == **n))
                    .map(|n| n.to_string())
                    .collect();
                return Err(SyncError::MissingKeyField {
                    table: table.to_string(),
                    missing,
                });
            }

            found
        }
    };

    resolved.sort_by_key(|f| f.column_id);
    Ok(resolved)
}

fn key_predicate(keys: &[TableField]) -> Result<String> {
    let conditions = keys
        .iter()
        .map(|k| {
            let col = quote(&k.column_name)?;
            Ok(format!("T.{col} = S.{col}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(conditions.join(" AND "))
}

/// MERGE that updates matched rows and inserts unmatched ones.
///
/// The update list leaves out key, primary-key and identity columns; the
/// insert list leaves out identity columns only. Both follow column order.
pub fn merge_sql(
    target: &str,
    source: &str,
    fields: &[TableField],
    keys: &[TableField],
) -> Result<String> {
    let mut ordered: Vec<&TableField> = fields.iter().collect();
    ordered.sort_by_key(|f| f.column_id);

    let is_key = |f: &TableField| keys.iter().any(|k| k.column_name == f.column_name);

    let mut updates = Vec::new();
    let mut insert_cols = Vec::new();
    let mut insert_vals = Vec::new();
    for field in ordered {
        let col = quote(&field.column_name)?;
        if field.is_identity {
            continue;
        }
        if !field.is_primary_key && !is_key(field) {
            updates.push(format!("T.{col} = S.{col}"));
        }
        insert_vals.push(format!("S.{col}"));
        insert_cols.push(col);
    }

    let mut sql = format!(
        "MERGE INTO {} AS T\nUSING {} AS S\nON {}\n",
        target,
        source,
        key_predicate(keys)?
    );
    if !updates.is_empty() {
        sql.push_str(&format!("WHEN MATCHED THEN UPDATE SET {}\n", updates.join(", ")));
    }
    if insert_cols.is_empty() {
        sql.push_str("WHEN NOT MATCHED THEN INSERT DEFAULT VALUES;");
    } else {
        sql.push_str(&format!(
            "WHEN NOT MATCHED THEN INSERT ({}) VALUES ({});",
            insert_cols.join(", "),
            insert_vals.join(", ")
        ));
    }
    Ok(sql)
}

/// MERGE that deletes every target row matching a staged key row.
pub fn delete_sql(target: &str, source: &str, keys: &[TableField]) -> Result<String> {
    let mut ordered = keys.to_vec();
    ordered.sort_by_key(|f| f.column_id);
    Ok(format!(
        "MERGE {} AS T\nUSING {} AS S\nON {}\nWHEN MATCHED THEN DELETE;",
        target,
        source,
        key_predicate(&ordered)?
    ))
}

/// Type a column is read as out of the JSON payload, and the expression that
/// converts it to the staging column type.
fn payload_column(field: &TableField) -> Result<(String, String)> {
    let col = quote(&field.column_name)?;
    let (json_type, expr) = match field.data_type.to_lowercase().as_str() {
        // Bytes travel as 0x-prefixed hex text
        "binary" | "varbinary" => (
            "varchar(max)".to_string(),
            format!("CONVERT(varbinary(max), {col}, 1)"),
        ),
        "text" => ("varchar(max)".to_string(), col.clone()),
        "ntext" | "xml" => ("nvarchar(max)".to_string(), col.clone()),
        // Full fractional precision in the payload; narrowed on insert
        "datetime" | "smalldatetime" => ("datetime2(7)".to_string(), col.clone()),
        _ => (
            format!("{}{}", field.data_type, data_type_size(field)?),
            col.clone(),
        ),
    };
    Ok((format!("{col} {json_type}"), expr))
}

/// Batch that unpacks the `@P1` JSON payload into a table variable of the
/// staging type and then runs `statement` against it.
///
/// Columns are addressed by position (`'$[i]'`) in ordinal order, matching
/// the row arrays produced by `StagingBuffer::to_json`.
pub fn load_batch_sql(
    staging: &StagingType,
    fields: &[TableField],
    statement: &str,
) -> Result<String> {
    let mut ordered: Vec<&TableField> = fields.iter().collect();
    ordered.sort_by_key(|f| f.column_id);

    let mut columns = Vec::with_capacity(ordered.len());
    let mut selects = Vec::with_capacity(ordered.len());
    let mut with_defs = Vec::with_capacity(ordered.len());
    for (i, field) in ordered.iter().enumerate() {
        let (def, expr) = payload_column(field)?;
        columns.push(quote(&field.column_name)?);
        selects.push(expr);
        with_defs.push(format!("{def} '$[{i}]'"));
    }

    Ok(format!(
        "SET XACT_ABORT ON;\n\
         DECLARE {var} {ty};\n\
         INSERT INTO {var} ({cols})\n\
         SELECT {selects} FROM OPENJSON(@P1) WITH ({with_defs});\n\
         {statement}",
        var = STAGING_VARIABLE,
        ty = staging.qualified()?,
        cols = columns.join(", "),
        selects = selects.join(", "),
        with_defs = with_defs.join(", "),
        statement = statement,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::{customer_table, field};

    const TARGET: &str = "[Sales].[Customer]";

    fn names(fields: &[TableField]) -> Vec<&str> {
        fields.iter().map(|f| f.column_name.as_str()).collect()
    }

    #[test]
    fn test_resolve_primary_key() {
        let table = customer_table();
        let keys = resolve_keys("Sales.Customer", &table, &table, KeySet::PrimaryKey).unwrap();
        assert_eq!(names(&keys), vec!["CustomerID"]);
    }

    #[test]
    fn test_resolve_primary_key_without_pk() {
        let mut table = customer_table();
        table[0].is_primary_key = false;
        let err = resolve_keys("Sales.Customer", &table, &table, KeySet::PrimaryKey).unwrap_err();
        assert!(matches!(err, SyncError::NoPrimaryKey(_)));
    }

    #[test]
    fn test_resolve_primary_key_not_in_record() {
        let table = customer_table();
        let effective: Vec<TableField> = table[1..].to_vec();
        let err =
            resolve_keys("Sales.Customer", &table, &effective, KeySet::PrimaryKey).unwrap_err();
        match err {
            SyncError::MissingKeyField { missing, .. } => assert_eq!(missing, vec!["CustomerID"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_explicit_keys_in_column_order() {
        let table = customer_table();
        let keys = resolve_keys(
            "Sales.Customer",
            &table,
            &table,
            KeySet::Columns(&["LastName", "FirstName"]),
        )
        .unwrap();
        assert_eq!(names(&keys), vec!["FirstName", "LastName"]);
    }

    #[test]
    fn test_resolve_explicit_key_count_mismatch() {
        let table = customer_table();
        let err = resolve_keys(
            "Sales.Customer",
            &table,
            &table,
            KeySet::Columns(&["FirstName", "Nickname"]),
        )
        .unwrap_err();
        match err {
            SyncError::MissingKeyField { table, missing } => {
                assert_eq!(table, "Sales.Customer");
                assert_eq!(missing, vec!["Nickname"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_explicit_keys_named_twice() {
        let table = customer_table();
        let keys = resolve_keys(
            "Sales.Customer",
            &table,
            &table,
            KeySet::Columns(&["FirstName", "FirstName"]),
        )
        .unwrap();
        assert_eq!(names(&keys), vec!["FirstName"]);
    }

    #[test]
    fn test_merge_sql_primary_key() {
        let table = customer_table();
        let keys = vec![table[0].clone()];
        let sql = merge_sql(TARGET, "@staged", &table, &keys).unwrap();
        assert_eq!(
            sql,
            "MERGE INTO [Sales].[Customer] AS T\n\
             USING @staged AS S\n\
             ON T.[CustomerID] = S.[CustomerID]\n\
             WHEN MATCHED THEN UPDATE SET T.[FirstName] = S.[FirstName], \
             T.[LastName] = S.[LastName], T.[City] = S.[City], T.[State] = S.[State]\n\
             WHEN NOT MATCHED THEN INSERT ([CustomerID], [FirstName], [LastName], [City], [State]) \
             VALUES (S.[CustomerID], S.[FirstName], S.[LastName], S.[City], S.[State]);"
        );
    }

    #[test]
    fn test_merge_sql_insert_list_in_ordinal_order() {
        let mut table = customer_table();
        table.reverse();
        let keys = vec![table[4].clone()];
        let sql = merge_sql(TARGET, "@staged", &table, &keys).unwrap();
        assert!(sql.contains("INSERT ([CustomerID], [FirstName], [LastName], [City], [State])"));
    }

    #[test]
    fn test_merge_sql_excludes_identity() {
        let mut table = customer_table();
        table[0].is_identity = true;
        let keys = resolve_keys(
            "Sales.Customer",
            &table,
            &table,
            KeySet::Columns(&["FirstName", "LastName"]),
        )
        .unwrap();
        let sql = merge_sql(TARGET, "@staged", &table, &keys).unwrap();
        assert!(sql.contains("ON T.[FirstName] = S.[FirstName] AND T.[LastName] = S.[LastName]"));
        assert!(sql.contains("UPDATE SET T.[City] = S.[City], T.[State] = S.[State]\n"));
        assert!(sql.contains("INSERT ([FirstName], [LastName], [City], [State])"));
        assert!(!sql.contains("S.[CustomerID]"));
    }

    #[test]
    fn test_merge_sql_key_upsert_keeps_primary_key_out_of_update() {
        let table = customer_table();
        let keys = resolve_keys(
            "Sales.Customer",
            &table,
            &table,
            KeySet::Columns(&["FirstName", "LastName"]),
        )
        .unwrap();
        let sql = merge_sql(TARGET, "@staged", &table, &keys).unwrap();
        assert!(!sql.contains("T.[CustomerID] = S.[CustomerID]"));
        assert!(sql.contains("INSERT ([CustomerID], [FirstName]"));
    }

    #[test]
    fn test_merge_sql_key_only_omits_matched_branch() {
        let table = customer_table();
        let fields = vec![table[0].clone()];
        let sql = merge_sql(TARGET, "@staged", &fields, &fields).unwrap();
        assert!(!sql.contains("WHEN MATCHED"));
        assert!(sql.ends_with("WHEN NOT MATCHED THEN INSERT ([CustomerID]) VALUES (S.[CustomerID]);"));
    }

    #[test]
    fn test_merge_sql_identity_only_inserts_defaults() {
        let mut id = field("Id", "int", 1);
        id.is_identity = true;
        id.is_primary_key = true;
        let fields = vec![id];
        let sql = merge_sql("[dbo].[Seq]", "@staged", &fields, &fields).unwrap();
        assert!(sql.ends_with("WHEN NOT MATCHED THEN INSERT DEFAULT VALUES;"));
    }

    #[test]
    fn test_delete_sql() {
        let table = customer_table();
        let keys = vec![table[2].clone(), table[1].clone()];
        let sql = delete_sql(TARGET, "@staged", &keys).unwrap();
        assert_eq!(
            sql,
            "MERGE [Sales].[Customer] AS T\n\
             USING @staged AS S\n\
             ON T.[FirstName] = S.[FirstName] AND T.[LastName] = S.[LastName]\n\
             WHEN MATCHED THEN DELETE;"
        );
    }

    #[test]
    fn test_load_batch_sql() {
        let staging = StagingType::for_table("Sales", "Customer").unwrap();
        let table = customer_table();
        let sql = load_batch_sql(&staging, &table[..2], "SELECT 1;").unwrap();
        let expected = format!(
            "SET XACT_ABORT ON;\n\
             DECLARE @staged [Sales].[{}];\n\
             INSERT INTO @staged ([CustomerID], [FirstName])\n\
             SELECT [CustomerID], [FirstName] FROM OPENJSON(@P1) \
             WITH ([CustomerID] int '$[0]', [FirstName] nvarchar(50) '$[1]');\n\
             SELECT 1;",
            staging.name()
        );
        assert_eq!(sql, expected);
    }

    #[test]
    fn test_load_batch_sql_payload_conversions() {
        let staging = StagingType::for_table("dbo", "Doc").unwrap();
        let mut blob = field("Blob", "varbinary", 1);
        blob.max_length = -1;
        let fields = vec![
            blob,
            field("Notes", "ntext", 2),
            field("Body", "xml", 3),
            field("Created", "datetime", 4),
        ];
        let sql = load_batch_sql(&staging, &fields, "").unwrap();
        assert!(sql.contains("SELECT CONVERT(varbinary(max), [Blob], 1), [Notes], [Body], [Created]"));
        assert!(sql.contains("[Blob] varchar(max) '$[0]'"));
        assert!(sql.contains("[Notes] nvarchar(max) '$[1]'"));
        assert!(sql.contains("[Body] nvarchar(max) '$[2]'"));
        assert!(sql.contains("[Created] datetime2(7) '$[3]'"));
    }
}
