//! # mssql-upsert
//!
//! Set-based upsert and delete of typed record collections into SQL Server.
//!
//! A call reads the live table schema, maps the record type's declared fields
//! onto its columns, stages the whole collection as one structured parameter
//! typed by an ephemeral table type, and runs a single MERGE:
//!
//! - **Upsert by primary key** with [`Syncer::upsert`]
//! - **Upsert by any column set** with [`Syncer::upsert_with_key`]
//! - **Delete by key projection** with [`Syncer::delete`]
//!
//! The staging type is dropped on every exit path.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_upsert::{Config, Field, MssqlTarget, Record, Syncer};
//!
//! struct Customer {
//!     id: i32,
//!     first_name: String,
//!     last_name: String,
//! }
//!
//! impl Record for Customer {
//!     fn fields() -> Vec<Field<Self>> {
//!         vec![
//!             Field::new("CustomerID", |c: &Customer| c.id),
//!             Field::new("FirstName", |c: &Customer| c.first_name.clone()),
//!             Field::new("LastName", |c: &Customer| c.last_name.clone()),
//!         ]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> mssql_upsert::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let target = MssqlTarget::new(&config.connection).await?;
//!     let syncer = Syncer::with_options(target, config.sync);
//!
//!     let customers = vec![Customer {
//!         id: 1,
//!         first_name: "Joseph".into(),
//!         last_name: "Smith".into(),
//!     }];
//!     let outcome = syncer.upsert(&customers, "Sales", "Customer").await?;
//!     println!("{} rows affected", outcome.rows_affected);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod identifier;
pub mod record;
pub mod schema;
pub mod sql;
pub mod staging;
pub mod sync;
pub mod typesize;
pub mod value;

// Re-exports for convenient access
pub use config::{Config, ConnectionConfig, SyncOptions};
pub use error::{ErrorKind, Result, SyncError};
pub use executor::{MssqlTarget, SyncTarget};
pub use record::{Field, PropertyKey, Record};
pub use schema::TableField;
pub use staging::{StagingBuffer, StagingType};
pub use sync::{SyncOutcome, Syncer};
pub use value::{IntoSqlValue, SqlNullType, SqlValue};
