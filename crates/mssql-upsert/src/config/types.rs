//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database connection (SQL Server).
    pub connection: ConnectionConfig,

    /// Per-call sync behavior.
    #[serde(default)]
    pub sync: SyncOptions,
}

/// SQL Server connection configuration.
///
/// Either `connection_string` (ADO.NET form) or the discrete
/// host/database/user fields must be given. When both are present the
/// connection string wins.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// ADO.NET style connection string, e.g.
    /// `Server=tcp:localhost,1433;Database=Sales;User Id=sa;Password=...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Encrypt connection (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "[REDACTED]"),
            )
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Options applied to every upsert/delete call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Timeout for each database phase in seconds (default: 30).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Fail before touching the database when the record type cannot supply
    /// a value for a non-nullable column (default: true).
    #[serde(default = "default_true")]
    pub validate_required_columns: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
            validate_required_columns: true,
        }
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}
