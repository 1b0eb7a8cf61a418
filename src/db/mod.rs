pub mod preferences;

use crate::config::Config;
use crate::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const FILE_POOL_CONNECTIONS: u32 = 4;

/// Where the preferences store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    /// Exists for as long as the pool's single connection stays open.
    Memory,
}

impl DbLocation {
    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match self {
            Self::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            Self::Memory => SqliteConnectOptions::new().in_memory(true),
        };
        options.foreign_keys(true).busy_timeout(BUSY_TIMEOUT)
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        match self {
            Self::File(_) => SqlitePoolOptions::new().max_connections(FILE_POOL_CONNECTIONS),
            // each in-memory connection is its own empty database; never
            // retire the one that holds the data
            Self::Memory => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
        }
    }
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Opens the store and brings its schema up to date.
pub async fn open_pool(location: &DbLocation) -> Result<SqlitePool, AppError> {
    let pool = location
        .pool_options()
        .connect_with(location.connect_options())
        .await?;
    run_migrations(&pool).await?;
    debug!(?location, "preferences store ready");
    Ok(pool)
}

pub async fn initialize_pool(config: &Config) -> Result<SqlitePool, AppError> {
    std::fs::create_dir_all(&config.data_dir)?;
    open_pool(&DbLocation::File(config.db_path())).await
}

pub async fn initialize_memory_pool() -> Result<SqlitePool, AppError> {
    open_pool(&DbLocation::Memory).await
}
