//! Database access for the sync pipeline.
//!
//! [`SyncTarget`] is the seam between the pipeline and the server: catalog
//! reads, staging type DDL and the load-and-merge batch. [`MssqlTarget`]
//! implements it over a bb8 pool of tiberius clients.

use crate::config::ConnectionConfig;
use crate::error::{Result, SyncError};
use crate::schema::{load_table_fields, TableField};
use crate::staging::StagingType;
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// Operations the sync pipeline needs from the database.
///
/// Every call is independent: implementations may use a different connection
/// for each one, so nothing may rely on session state between calls.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Live column metadata for `schema.table`, ordered by column id.
    async fn table_fields(&self, schema: &str, table: &str) -> Result<Vec<TableField>>;

    /// Drop the staging type if it exists. Must succeed when it does not.
    async fn drop_staging_type(&self, staging: &StagingType) -> Result<()>;

    /// Run the `CREATE TYPE` statement for `staging`.
    async fn create_staging_type(&self, staging: &StagingType, ddl: &str) -> Result<()>;

    /// Run `batch` with `payload` bound as `@P1` and return the rows affected
    /// by its final statement.
    async fn execute(&self, table: &str, batch: &str, payload: &str) -> Result<u64>;
}

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: ConnectionConfig,
}

impl TiberiusConnectionManager {
    fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> tiberius::Result<Config> {
        if let Some(ado) = &self.config.connection_string {
            return Config::from_ado_string(ado);
        }

        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        match self.config.encrypt.to_lowercase().as_str() {
            "disable" => {
                config.encryption(EncryptionLevel::NotSupported);
            }
            "false" | "no" | "0" => {
                config.encryption(EncryptionLevel::Off);
            }
            _ => {
                config.encryption(EncryptionLevel::Required);
            }
        }

        if self.config.trust_server_cert {
            config.trust_cert();
        }

        Ok(config)
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config()?;
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// SQL Server target backed by a connection pool.
pub struct MssqlTarget {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlTarget {
    /// Create the pool and test one connection.
    pub async fn new(config: &ConnectionConfig) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .build(manager)
            .await
            .map_err(|e| SyncError::pool(e, "creating MSSQL pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| SyncError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!("Connected to MSSQL: {}", config.describe());

        Ok(Self { pool })
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting MSSQL connection"))
    }

    /// Round-trip to the server and return its version string.
    pub async fn health_check(&self) -> Result<String> {
        let mut conn = self.get_conn().await?;
        let row = conn
            .simple_query("SELECT @@VERSION")
            .await?
            .into_row()
            .await?;

        let version = row
            .as_ref()
            .and_then(|r| r.get::<&str, _>(0))
            .map(|v| v.lines().next().unwrap_or(v).trim().to_string())
            .unwrap_or_default();
        Ok(version)
    }
}

#[async_trait]
impl SyncTarget for MssqlTarget {
    async fn table_fields(&self, schema: &str, table: &str) -> Result<Vec<TableField>> {
        let mut conn = self.get_conn().await?;
        load_table_fields(&mut conn, schema, table).await
    }

    async fn drop_staging_type(&self, staging: &StagingType) -> Result<()> {
        let sql = staging.drop_if_exists_sql()?;
        let mut conn = self.get_conn().await?;

        let mut query = Query::new(sql);
        query.bind(staging.schema());
        query.bind(staging.name());
        query
            .execute(&mut *conn)
            .await
            .map_err(|e| SyncError::execution(staging.to_string(), e))?;

        debug!("Dropped staging type {} (if present)", staging);
        Ok(())
    }

    async fn create_staging_type(&self, staging: &StagingType, ddl: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        conn.execute(ddl, &[])
            .await
            .map_err(|e| SyncError::execution(staging.to_string(), e))?;

        debug!("Created staging type {}", staging);
        Ok(())
    }

    async fn execute(&self, table: &str, batch: &str, payload: &str) -> Result<u64> {
        let mut conn = self.get_conn().await?;

        let mut query = Query::new(batch);
        query.bind(payload);
        let result = query
            .execute(&mut *conn)
            .await
            .map_err(|e| SyncError::execution(table, e))?;

        // One count per statement; the load INSERT precedes the MERGE
        Ok(result.rows_affected().last().copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ConnectionConfig {
        ConnectionConfig {
            connection_string: None,
            host: "db.internal".to_string(),
            port: 14330,
            database: "Sales".to_string(),
            user: "sa".to_string(),
            password: "secret".to_string(),
            encrypt: "false".to_string(),
            trust_server_cert: true,
            max_connections: 2,
        }
    }

    #[test]
    fn test_build_config_discrete_fields() {
        let manager = TiberiusConnectionManager::new(connection());
        let config = manager.build_config().unwrap();
        assert_eq!(config.get_addr(), "db.internal:14330");
    }

    #[test]
    fn test_build_config_prefers_connection_string() {
        let mut conn = connection();
        conn.connection_string =
            Some("Server=tcp:other.host,1500;Database=Sales;User Id=sa;Password=x".to_string());
        let manager = TiberiusConnectionManager::new(conn);
        let config = manager.build_config().unwrap();
        assert_eq!(config.get_addr(), "other.host:1500");
    }
}
