use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{ConnectOptions, Connection, Executor};
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::errors::ConfigError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    MigrationError(String),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Failed to create database: {0}")]
    DatabaseCreationFailed(String),

    #[error("Database configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type DbResult<T> = Result<T, DatabaseError>;

/// Represents an established database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Database health status
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DBHealthStatus {
    Healthy,
    Unhealthy,
}

/// Complete database health check result
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseHealth {
    pub status: DBHealthStatus,
    pub response_time_ms: u64,
    pub message: Option<String>,
}

impl Database {
    /// Prepares the database for the service: creates it if it is missing and
    /// applies the embedded migrations. Safe to run repeatedly.
    ///
    /// The coordinator runs this once before any worker starts so workers never
    /// race each other on `CREATE DATABASE`.
    pub async fn initialize(config: &DatabaseConfig) -> DbResult<()> {
        info!("Initializing database schema");

        Self::ensure_database_exists(config).await?;

        if config.use_migrations {
            let db = Self::connect(config).await?;
            let result = Self::run_migrations(db.get_pool()).await;
            db.shutdown().await;
            result?;
        }

        Ok(())
    }

    /// Create a new database connection pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to database");
        debug!(
            "Database configuration: max_conn={}, min_conn={}, timeout={}s",
            config.max_connections, config.min_connections, config.connect_timeout_seconds
        );

        // Create the connection pool
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                DatabaseError::ConnectionError(e)
            })?;

        info!("Successfully connected to database");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> DatabaseHealth {
        // Measure query execution time
        let start = std::time::Instant::now();

        // Try a simple query to verify the connection is working
        let result = sqlx::query("SELECT 1").fetch_one(self.get_pool()).await;

        let elapsed = start.elapsed();

        match result {
            Ok(_) => DatabaseHealth {
                status: DBHealthStatus::Healthy,
                response_time_ms: elapsed.as_millis() as u64,
                message: None,
            },
            Err(e) => DatabaseHealth {
                status: DBHealthStatus::Unhealthy,
                response_time_ms: elapsed.as_millis() as u64,
                message: Some(format!("Database query failed: {}", e)),
            },
        }
    }

    /// Ensure the target database exists, create it if allowed to
    async fn ensure_database_exists(config: &DatabaseConfig) -> DbResult<()> {
        let db_name = config.database_name()?;

        debug!("Checking if database '{}' exists", db_name);

        // Talk to the maintenance database, the target may not exist yet
        let admin_options: PgConnectOptions = config.connect_options()?.database("postgres");
        let mut conn = tokio::time::timeout(config.connect_timeout(), admin_options.connect())
            .await
            .map_err(|_| DatabaseError::ConnectionError(sqlx::Error::PoolTimedOut))??;

        let db_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(&db_name)
                .fetch_one(&mut conn)
                .await?;

        if db_exists {
            debug!("Database '{}' exists", db_name);
        } else if !config.create_database_if_missing {
            conn.close().await?;
            return Err(DatabaseError::DatabaseNotFound(format!(
                "Database '{}' does not exist",
                db_name
            )));
        } else {
            info!("Database '{}' does not exist, creating it", db_name);

            let statement = format!("CREATE DATABASE {}", quote_identifier(&db_name));
            if let Err(err) = conn.execute(statement.as_str()).await {
                // Another process may have won the race; that is fine
                if !is_duplicate_database(&err) {
                    return Err(DatabaseError::DatabaseCreationFailed(format!(
                        "Failed to create database '{}': {}",
                        db_name, err
                    )));
                }
                debug!("Database '{}' was created concurrently", db_name);
            } else {
                info!("Successfully created database '{}'", db_name);
            }
        }

        conn.close().await?;
        Ok(())
    }

    /// Run database migrations
    async fn run_migrations(pool: &PgPool) -> DbResult<()> {
        info!("Running database migrations");

        match sqlx::migrate!("./migrations").run(pool).await {
            Ok(_) => {
                info!("Database migrations completed successfully");
                Ok(())
            }
            Err(e) => {
                warn!("Database migration error: {}", e);
                Err(DatabaseError::MigrationError(e.to_string()))
            }
        }
    }

    /// Gracefully close the database connection pool
    pub async fn shutdown(&self) {
        info!("Shutting down database connection pool...");

        // Get current connection count for reporting
        let used_connections = self.pool.size();
        let idle_connections = self.pool.num_idle();

        // Close the connection pool
        self.pool.close().await;

        info!(
            "Database connection pool closed. Stats: {} active, {} idle connections released",
            used_connections, idle_connections
        );
    }
}

/// Quotes a PostgreSQL identifier so it can be spliced into DDL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE DATABASE` raced with another process (SQLSTATE 42P04).
fn is_duplicate_database(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == "42P04")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("quicklink"), "\"quicklink\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn non_database_errors_are_not_duplicates() {
        assert!(!is_duplicate_database(&sqlx::Error::PoolTimedOut));
    }
}
