use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::time::Duration;
use tracing::{error, info, warn};

use super::SqlDialect;

/// Connection pool sizing
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub connect_retries: u32,
}

impl PoolSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 20,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            connect_retries: 3,
        }
    }
}

/// Open the pool, retrying with exponential backoff.
pub async fn connect_pool(settings: &PoolSettings) -> Result<(AnyPool, SqlDialect), sqlx::Error> {
    sqlx::any::install_default_drivers();

    let dialect = SqlDialect::from_url(&settings.url).ok_or_else(|| {
        sqlx::Error::Configuration(format!("unsupported database url: {}", settings.url).into())
    })?;

    let mut retries = settings.connect_retries;
    let mut delay = Duration::from_secs(1);
    let pool = loop {
        match AnyPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(Some(settings.idle_timeout))
            .max_lifetime(Some(settings.max_lifetime))
            .connect(&settings.url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) if retries > 0 => {
                retries -= 1;
                warn!(
                    "Database connection failed, retrying in {:?} ({} retries left): {}",
                    delay, retries, e
                );
                tokio::time::sleep(delay).await;
                delay *= 2; // Exponential backoff
            }
            Err(e) => {
                error!("Failed to connect to database after retries: {}", e);
                return Err(e);
            }
        }
    };

    info!(
        "Database pool configured ({}): max={}, min={}, acquire_timeout={:?}",
        dialect, settings.max_connections, settings.min_connections, settings.acquire_timeout
    );

    Ok((pool, dialect))
}

/// Single-connection in-memory SQLite pool.
///
/// The connection must never be recycled, or the database disappears with it.
pub async fn connect_in_memory() -> Result<AnyPool, sqlx::Error> {
    sqlx::any::install_default_drivers();

    AnyPoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
}
