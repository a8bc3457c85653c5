//! Typed values produced by record accessors and carried in the staging buffer.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

/// Value kind with nullability stripped. Doubles as the type hint of a NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

impl SqlValue {
    /// The base kind of this value.
    pub fn kind(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::String(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Encode for the staging payload.
    ///
    /// The payload is parsed by `OPENJSON ... WITH`, which converts from the
    /// JSON text representation into the declared column type. Decimals are
    /// sent as strings so no precision is lost through a JSON number, bytes
    /// as `0x` hex for `CONVERT(varbinary, ..., 1)`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null(_) => JsonValue::Null,
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::I16(i) => JsonValue::from(*i),
            SqlValue::I32(i) => JsonValue::from(*i),
            SqlValue::I64(i) => JsonValue::from(*i),
            SqlValue::F32(f) => {
                if f.is_finite() {
                    JsonValue::from(*f as f64)
                } else {
                    // MSSQL doesn't support NaN/Infinity
                    warn!("Converting F32 NaN/Infinity to NULL for MSSQL compatibility");
                    JsonValue::Null
                }
            }
            SqlValue::F64(f) => {
                if f.is_finite() {
                    JsonValue::from(*f)
                } else {
                    warn!("Converting F64 NaN/Infinity to NULL for MSSQL compatibility");
                    JsonValue::Null
                }
            }
            SqlValue::String(s) => JsonValue::String(s.clone()),
            SqlValue::Bytes(b) => JsonValue::String(hex_literal(b)),
            SqlValue::Uuid(u) => JsonValue::String(u.hyphenated().to_string()),
            SqlValue::Decimal(d) => JsonValue::String(d.to_string()),
            SqlValue::DateTime(dt) => {
                JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            SqlValue::DateTimeOffset(dto) => {
                JsonValue::String(dto.format("%Y-%m-%dT%H:%M:%S%.f%:z").to_string())
            }
            SqlValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            SqlValue::Time(t) => JsonValue::String(t.format("%H:%M:%S%.f").to_string()),
        }
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out
}

/// Conversion from a record field's Rust type into a [`SqlValue`].
///
/// `KIND` is known statically so a column's type is defined even when every
/// value in it is NULL or the collection is empty.
pub trait IntoSqlValue {
    const KIND: SqlNullType;

    fn into_sql_value(self) -> SqlValue;
}

macro_rules! impl_into_sql_value {
    ($($ty:ty => $kind:ident, $variant:ident;)*) => {
        $(
            impl IntoSqlValue for $ty {
                const KIND: SqlNullType = SqlNullType::$kind;

                fn into_sql_value(self) -> SqlValue {
                    SqlValue::$variant(self.into())
                }
            }
        )*
    };
}

impl_into_sql_value! {
    bool => Bool, Bool;
    u8 => I16, I16;
    i16 => I16, I16;
    i32 => I32, I32;
    i64 => I64, I64;
    f32 => F32, F32;
    f64 => F64, F64;
    String => String, String;
    Vec<u8> => Bytes, Bytes;
    Uuid => Uuid, Uuid;
    Decimal => Decimal, Decimal;
    NaiveDateTime => DateTime, DateTime;
    DateTime<FixedOffset> => DateTimeOffset, DateTimeOffset;
    NaiveDate => Date, Date;
    NaiveTime => Time, Time;
}

impl IntoSqlValue for &str {
    const KIND: SqlNullType = SqlNullType::String;

    fn into_sql_value(self) -> SqlValue {
        SqlValue::String(self.to_string())
    }
}

impl IntoSqlValue for DateTime<Utc> {
    const KIND: SqlNullType = SqlNullType::DateTimeOffset;

    fn into_sql_value(self) -> SqlValue {
        SqlValue::DateTimeOffset(self.fixed_offset())
    }
}

impl<V: IntoSqlValue> IntoSqlValue for Option<V> {
    const KIND: SqlNullType = V::KIND;

    fn into_sql_value(self) -> SqlValue {
        match self {
            Some(v) => v.into_sql_value(),
            None => SqlValue::Null(V::KIND),
        }
    }
}
