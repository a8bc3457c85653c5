//! The transfer vehicle: a staged row set and the table type that shapes it.

mod buffer;
mod table_type;

pub use buffer::{StagingBuffer, StagingColumn};
pub use table_type::{StagingType, STAGING_VARIABLE};
