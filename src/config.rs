use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::application::gc::GcConfig;
use crate::domain::value_objects::{ExternalMode, ProviderKind};
use crate::infrastructure::persistence::{PoolSettings, SqlDialect};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    /// Physical medium of the internal store
    pub provider: ProviderKind,
    /// Root directory of the filesystem provider
    pub root: PathBuf,
    pub durable_writes: bool,
    /// External filestore attached at startup
    pub external_dir: Option<PathBuf>,
    pub external_mode: ExternalMode,
    // Database connection pool settings
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub db_idle_timeout_secs: u64,
    pub db_max_lifetime_secs: u64,
    pub gc: GcConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://binstore.db?mode=rwc".to_string(),
            provider: ProviderKind::Filesystem,
            root: PathBuf::from("/var/lib/binstore"),
            durable_writes: true,
            external_dir: None,
            external_mode: ExternalMode::Passthrough,
            db_max_connections: 20,
            db_min_connections: 5,
            db_acquire_timeout_secs: 30,
            db_idle_timeout_secs: 600,  // 10 minutes
            db_max_lifetime_secs: 1800, // 30 minutes
            gc: GcConfig::default(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Defaults overridden by `BINSTORE_*` variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load a TOML file, then apply environment overrides
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) =
            std::env::var("BINSTORE_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"))
        {
            self.database_url = url;
        }
        if let Some(provider) = env_parse("BINSTORE_PROVIDER") {
            self.provider = provider;
        }
        if let Ok(root) = std::env::var("BINSTORE_ROOT") {
            self.root = PathBuf::from(root);
        }
        if let Some(durable) = env_parse("BINSTORE_DURABLE_WRITES") {
            self.durable_writes = durable;
        }
        if let Ok(dir) = std::env::var("BINSTORE_EXTERNAL_DIR") {
            self.external_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        if let Some(mode) = env_parse("BINSTORE_EXTERNAL_MODE") {
            self.external_mode = mode;
        }

        if let Some(v) = env_parse("BINSTORE_DB_MAX_CONNECTIONS") {
            self.db_max_connections = v;
        }
        if let Some(v) = env_parse("BINSTORE_DB_MIN_CONNECTIONS") {
            self.db_min_connections = v;
        }
        if let Some(v) = env_parse("BINSTORE_DB_ACQUIRE_TIMEOUT_SECS") {
            self.db_acquire_timeout_secs = v;
        }
        if let Some(v) = env_parse("BINSTORE_DB_IDLE_TIMEOUT_SECS") {
            self.db_idle_timeout_secs = v;
        }
        if let Some(v) = env_parse("BINSTORE_DB_MAX_LIFETIME_SECS") {
            self.db_max_lifetime_secs = v;
        }

        if let Some(secs) = env_parse("BINSTORE_GC_INTERVAL_SECS") {
            self.gc.interval = Duration::from_secs(secs);
        }
        if let Some(size) = env_parse("BINSTORE_GC_BATCH_SIZE") {
            self.gc.batch_size = size;
        }
        if let Some(secs) = env_parse("BINSTORE_GC_MIN_AGE_SECS") {
            self.gc.min_candidate_age = Duration::from_secs(secs);
        }
        if let Some(multiplier) = env_parse("BINSTORE_GC_PRUNE_MULTIPLIER") {
            self.gc.prune_multiplier = multiplier;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if SqlDialect::from_url(&self.database_url).is_none() {
            return Err(
                "BINSTORE_DATABASE_URL must start with postgres://, postgresql:// or sqlite:"
                    .to_string(),
            );
        }

        if self.provider == ProviderKind::Filesystem && self.root.as_os_str().is_empty() {
            return Err("BINSTORE_ROOT cannot be empty".to_string());
        }

        if self.external_dir.as_deref() == Some(self.root.as_path()) {
            return Err("BINSTORE_EXTERNAL_DIR must differ from BINSTORE_ROOT".to_string());
        }

        if self.db_min_connections > self.db_max_connections {
            return Err(
                "BINSTORE_DB_MIN_CONNECTIONS cannot exceed BINSTORE_DB_MAX_CONNECTIONS"
                    .to_string(),
            );
        }

        if self.gc.interval < Duration::from_secs(1) {
            return Err("BINSTORE_GC_INTERVAL_SECS must be at least 1 second".to_string());
        }

        if self.gc.batch_size < 1 || self.gc.batch_size > 10_000 {
            return Err("BINSTORE_GC_BATCH_SIZE must be between 1 and 10000".to_string());
        }

        Ok(())
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            url: self.database_url.clone(),
            max_connections: self.db_max_connections,
            min_connections: self.db_min_connections,
            acquire_timeout: Duration::from_secs(self.db_acquire_timeout_secs),
            idle_timeout: Duration::from_secs(self.db_idle_timeout_secs),
            max_lifetime: Duration::from_secs(self.db_max_lifetime_secs),
            ..PoolSettings::new(self.database_url.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_database() {
        let config = Config {
            database_url: "mysql://localhost/db".to_string(),
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().contains("DATABASE_URL"));
    }

    #[test]
    fn test_validate_rejects_external_equal_to_root() {
        let config = Config {
            external_dir: Some(PathBuf::from("/var/lib/binstore")),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_pool_inversion() {
        let config = Config {
            db_min_connections: 50,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_file_with_nested_gc() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("binstore.toml");
        std::fs::write(
            &path,
            r#"
database_url = "postgres://localhost/binstore"
provider = "blob"
external_dir = "/mnt/legacy"
external_mode = "adopt"

[gc]
interval = 60
batch_size = 50
"#,
        )
        .unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.provider, ProviderKind::Blob);
        assert_eq!(config.external_mode, ExternalMode::Adopt);
        assert_eq!(config.external_dir, Some(PathBuf::from("/mnt/legacy")));
        assert_eq!(config.gc.batch_size, 50);
        assert_eq!(config.gc.interval, Duration::from_secs(60));
        assert_eq!(config.db_max_connections, 20);
    }

    #[test]
    fn test_pool_settings_follow_config() {
        let config = Config {
            db_max_connections: 7,
            ..Config::default()
        };
        let settings = config.pool_settings();
        assert_eq!(settings.max_connections, 7);
        assert_eq!(settings.url, config.database_url);
        assert_eq!(settings.connect_retries, 3);
    }
}
