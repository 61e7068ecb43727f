//! # Database Connection Pool Module
//!
//! Provides the SQLite connection pool and the store-wide lock that
//! serializes every statement issued against one collection.
//!
//! ## Features
//!
//! - **WAL Mode**: Enabled for file-backed stores
//! - **Foreign Keys**: Enforced, so removing a directory cascades to its songs
//! - **Automatic Migrations**: Run on initialization
//! - **Store Lock**: [`CollectionDatabase::acquire`] holds a mutex for as long
//!   as the returned connection lives
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::db::{CollectionDatabase, DatabaseConfig};
//!
//! let db = CollectionDatabase::open(DatabaseConfig::new("collection.db")).await?;
//!
//! let mut conn = db.acquire().await?;
//! let songs = core_library::repositories::song::find_in_directory(&mut conn, 1).await?;
//! ```
//!
//! ## Testing
//!
//! ```rust,ignore
//! let db = CollectionDatabase::open_in_memory().await?;
//! ```

use crate::{LibraryError, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Database configuration for SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:<path>` or `sqlite::memory:`
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Maximum lifetime of a connection
    pub max_lifetime: Option<Duration>,

    /// Maximum idle time for a connection before being closed
    pub idle_timeout: Option<Duration>,

    /// Number of prepared statements cached per connection
    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    /// Create a new database configuration with the given file path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        let database_url = format!("sqlite:{}", path.display());

        Self {
            database_url,
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            idle_timeout: Some(Duration::from_secs(600)),  // 10 minutes
            statement_cache_capacity: 100,
        }
    }

    /// Create a configuration for an in-memory database (useful for testing)
    ///
    /// Every connection to `sqlite::memory:` opens its own private database,
    /// so the pool holds exactly one connection and never retires it. A
    /// replacement connection would start empty and unmigrated.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: None,
            idle_timeout: None,
            statement_cache_capacity: 100,
        }
    }

    /// Derive the pool configuration from the runtime configuration.
    pub fn from_core_config(config: &core_runtime::config::CoreConfig) -> Self {
        match &config.database_path {
            Some(path) => Self::new(path).max_connections(config.max_connections),
            None => Self::in_memory(),
        }
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured SQLite connection pool
///
/// This function:
/// 1. Configures SQLite connection options (WAL mode, foreign keys, etc.)
/// 2. Creates a connection pool with the specified configuration
/// 3. Runs database migrations
/// 4. Performs a health check
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(LibraryError::Database)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        .statement_cache_capacity(config.statement_cache_capacity);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            LibraryError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    info!(connections = pool.size(), "Database connection pool ready");
    Ok(pool)
}

/// Create a migrated in-memory pool for tests.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    debug!("Running database migrations");

    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        LibraryError::Migration(e.to_string())
    })?;

    Ok(())
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        LibraryError::Database(e)
    })?;
    Ok(())
}

// ============================================================================
// Store-wide lock
// ============================================================================

/// Handle to one collection's store.
///
/// Every statement goes through [`acquire`](Self::acquire), which takes the
/// store lock before checking a connection out of the pool. Clones share the
/// pool and the lock.
#[derive(Debug, Clone)]
pub struct CollectionDatabase {
    pool: Pool<Sqlite>,
    lock: Arc<Mutex<()>>,
}

impl CollectionDatabase {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        Ok(Self::new(create_pool(config).await?))
    }

    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(create_test_pool().await?))
    }

    /// Take the store lock and check out a connection.
    ///
    /// The lock is released when the returned connection is dropped.
    pub async fn acquire(&self) -> Result<LockedConnection> {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let conn = self.pool.acquire().await?;
        Ok(LockedConnection {
            conn,
            _guard: guard,
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// A pooled connection held under the store lock.
///
/// Dereferences to [`SqliteConnection`], so it can be passed wherever a
/// `&mut SqliteConnection` executor is expected or used to begin a
/// transaction.
pub struct LockedConnection {
    // Field order matters: the connection goes back to the pool before the
    // lock is released.
    conn: PoolConnection<Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl Deref for LockedConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for LockedConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await;
        assert!(pool.is_ok(), "Should create test pool successfully");
    }

    #[tokio::test]
    async fn test_schema_present() {
        let pool = create_test_pool().await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert!(tables.contains(&"songs".to_string()));
        assert!(tables.contains(&"directories".to_string()));
        assert!(tables.contains(&"duplicated_songs".to_string()));
    }

    #[tokio::test]
    async fn test_database_config_builder() {
        let config = DatabaseConfig::new("collection.db")
            .min_connections(2)
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(60))
            .statement_cache_capacity(200);

        assert_eq!(config.database_url, "sqlite:collection.db");
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
        assert_eq!(config.statement_cache_capacity, 200);
    }

    #[tokio::test]
    async fn test_config_from_core_config() {
        let core = core_runtime::config::CoreConfig::builder()
            .database_path("/tmp/c.db")
            .max_connections(3)
            .build()
            .unwrap();
        let config = DatabaseConfig::from_core_config(&core);
        assert_eq!(config.database_url, "sqlite:/tmp/c.db");
        assert_eq!(config.max_connections, 3);

        let memory = core_runtime::config::CoreConfig::builder().build().unwrap();
        assert_eq!(
            DatabaseConfig::from_core_config(&memory).database_url,
            "sqlite::memory:"
        );
    }

    #[tokio::test]
    async fn test_in_memory_pool_never_retires_its_connection() {
        let config = DatabaseConfig::in_memory();
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.max_lifetime, None);
        assert_eq!(config.idle_timeout, None);

        let file = DatabaseConfig::new("collection.db").max_lifetime(None);
        assert_eq!(file.max_lifetime, None);
        assert_eq!(
            DatabaseConfig::new("collection.db").max_lifetime,
            Some(Duration::from_secs(1800))
        );

        let pool = create_test_pool().await.unwrap();
        assert_eq!(pool.options().get_max_lifetime(), None);
        assert_eq!(pool.options().get_idle_timeout(), None);
    }

    #[tokio::test]
    async fn test_acquire_serializes_callers() {
        let db = CollectionDatabase::open_in_memory().await.unwrap();

        let first = db.acquire().await.unwrap();
        let db_clone = db.clone();
        let waiter = tokio::spawn(async move {
            let mut conn = db_clone.acquire().await.unwrap();
            sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(&mut *conn)
                .await
                .unwrap()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        assert_eq!(waiter.await.unwrap(), 1);
    }
}
