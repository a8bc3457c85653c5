//! Configuration validation.

use super::Config;
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let conn = &config.connection;

    match &conn.connection_string {
        Some(cs) if cs.trim().is_empty() => {
            return Err(SyncError::Config(
                "connection.connection_string cannot be empty".into(),
            ));
        }
        Some(_) => {}
        None => {
            if conn.host.is_empty() {
                return Err(SyncError::Config("connection.host is required".into()));
            }
            if conn.database.is_empty() {
                return Err(SyncError::Config("connection.database is required".into()));
            }
            if conn.user.is_empty() {
                return Err(SyncError::Config("connection.user is required".into()));
            }
        }
    }

    if conn.max_connections == 0 {
        return Err(SyncError::Config(
            "connection.max_connections must be at least 1".into(),
        ));
    }

    if config.sync.command_timeout_secs == 0 {
        return Err(SyncError::Config(
            "sync.command_timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}
