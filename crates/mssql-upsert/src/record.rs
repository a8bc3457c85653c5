//! Declared field-to-column mapping for record types.
//!
//! A record type lists its fields once, in a fixed order, through
//! [`Record::fields`]. Each [`Field`] pairs a name with an accessor and may
//! override the column it maps to:
//!
//! ```
//! use mssql_upsert::{Field, Record};
//!
//! struct Customer {
//!     id: i32,
//!     first_name: String,
//!     city: Option<String>,
//! }
//!
//! impl Record for Customer {
//!     fn fields() -> Vec<Field<Self>> {
//!         vec![
//!             Field::new("id", |c: &Customer| c.id).column("CustomerID"),
//!             Field::new("FirstName", |c: &Customer| c.first_name.clone()),
//!             Field::new("City", |c: &Customer| c.city.clone()),
//!         ]
//!     }
//! }
//! ```

use crate::value::{IntoSqlValue, SqlNullType, SqlValue};
use std::fmt;
use std::sync::Arc;

type Accessor<T> = Arc<dyn Fn(&T) -> SqlValue + Send + Sync>;

/// A record type whose fields can be synchronized into a table.
pub trait Record: Send + Sync {
    /// Field descriptors in declaration order.
    fn fields() -> Vec<Field<Self>>
    where
        Self: Sized;
}

/// One declared field of a record type.
pub struct Field<T> {
    name: &'static str,
    column: Option<&'static str>,
    kind: SqlNullType,
    get: Accessor<T>,
}

impl<T: 'static> Field<T> {
    /// Declare a field named `name` read through `get`.
    pub fn new<V, F>(name: &'static str, get: F) -> Self
    where
        V: IntoSqlValue + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        Self {
            name,
            column: None,
            kind: V::KIND,
            get: Arc::new(move |record: &T| get(record).into_sql_value()),
        }
    }
}

impl<T> Field<T> {
    /// Map this field to a column whose name differs from the field name.
    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Column name if overridden, else the field name.
    pub fn logical_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Resolved (logical name, accessor) pair for one field.
pub struct PropertyKey<T> {
    name: &'static str,
    kind: SqlNullType,
    get: Accessor<T>,
}

impl<T> PropertyKey<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Value kind with nullability stripped.
    pub fn kind(&self) -> SqlNullType {
        self.kind
    }

    /// Read the field from a record. Absent values come back as a typed NULL.
    pub fn value(&self, record: &T) -> SqlValue {
        (self.get)(record)
    }
}

impl<T> Clone for PropertyKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            kind: self.kind,
            get: Arc::clone(&self.get),
        }
    }
}

impl<T> fmt::Debug for PropertyKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyKey")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Resolve the property keys of `T`, in declaration order.
///
/// When `include` is given only keys whose logical name appears in it are
/// kept; membership is by name, order still follows the declaration.
pub fn property_keys<T: Record>(include: Option<&[&str]>) -> Vec<PropertyKey<T>> {
    T::fields()
        .into_iter()
        .map(|field| PropertyKey {
            name: field.logical_name(),
            kind: field.kind,
            get: field.get,
        })
        .filter(|key| include.map_or(true, |names| names.contains(&key.name)))
        .collect()
}

/// Logical names of `T` in declaration order.
pub fn property_names<T: Record>() -> Vec<&'static str> {
    T::fields().iter().map(Field::logical_name).collect()
}
