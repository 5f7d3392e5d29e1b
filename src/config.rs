use std::{env, fmt, net::IpAddr, str::FromStr, time::Duration};

use dotenvy::dotenv;
use log::{debug, info, warn};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

pub use crate::errors::ConfigError;

// Server-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// actix handler threads inside one worker process
    pub threads: usize,
}

// Application-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub environment: Environment,
    pub log_level: String,
    /// Public prefix used to build `short_url` in responses
    pub base_url: String,
    pub store_backend: StoreBackend,
}

// Environment enum for different deployment environments
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

// Implement FromStr trait for Environment enum to enable parsing from string
impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(format!(
                "Invalid environment: {}. Must be one of: development, testing, production",
                s
            )),
        }
    }
}

/// Where URL records live.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    /// Process-local store, only meaningful in single-process mode
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            _ => Err(format!(
                "Invalid store backend: {}. Must be one of: postgres, memory",
                s
            )),
        }
    }
}

// Result type for configuration functions
type ConfigResult<T> = Result<T, ConfigError>;

// Database Config
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection string; when set it wins over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub use_migrations: bool,
    pub connect_timeout_seconds: u64,
    pub create_database_if_missing: bool,
}

impl DatabaseConfig {
    /// Connection options for the service database.
    pub fn connect_options(&self) -> ConfigResult<PgConnectOptions> {
        match &self.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| ConfigError::ParseError(format!("Could not parse DATABASE_URL: {}", e))),
            None => Ok(PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.name)),
        }
    }

    /// Name of the database the service expects to find (or create).
    pub fn database_name(&self) -> ConfigResult<String> {
        let options = self.connect_options()?;
        Ok(options
            .get_database()
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone()))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("use_migrations", &self.use_migrations)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("create_database_if_missing", &self.create_database_if_missing)
            .finish()
    }
}

// Accelerator cache
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
}

// Short code allocation
#[derive(Debug, Deserialize, Clone)]
pub struct ShortenerConfig {
    pub code_length: usize,
    pub max_attempts: usize,
    pub store_timeout_ms: u64,
}

impl ShortenerConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

// Multi-process supervision
#[derive(Debug, Deserialize, Clone)]
pub struct ClusterConfig {
    pub enabled: bool,
    pub workers: usize,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub stable_after_seconds: u64,
    pub max_restarts: usize,
    pub restart_window_seconds: u64,
}

// Config struct that matches our environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub db: DatabaseConfig,
    pub cache: CacheConfig,
    pub shortener: ShortenerConfig,
    pub cluster: ClusterConfig,
}

impl Config {
    // Load configuration from environment variables
    pub fn load() -> ConfigResult<Self> {
        // Load .env file if it exists
        match dotenv() {
            Ok(_) => debug!(".env file loaded successfully"),
            Err(e) => warn!("Could not load .env file: {}", e),
        }

        // Create the server config
        let server = ServerConfig {
            host: get_env_or_default("SERVER_HOST", "127.0.0.1")?,
            port: get_env_or_default("SERVER_PORT", "8000")?,
            threads: get_env_or_default("SERVER_THREADS", "1")?,
        };

        // Get version from Cargo.toml or environment
        let version = option_env!("CARGO_PKG_VERSION")
            .unwrap_or("0.1.0")
            .to_string();

        let environment: Environment = get_env_or_default("APP_ENVIRONMENT", "development")?;
        let default_base_url = format!("http://{}:{}", server.host, server.port);

        // Create the app config
        let app = AppConfig {
            name: get_env_or_default("APP_NAME", "quicklink")?,
            version: env::var("APP_VERSION").unwrap_or(version),
            environment,
            log_level: get_env_or_default("RUST_LOG", "info")?,
            base_url: get_env_or_default("APP_BASE_URL", &default_base_url)?,
            store_backend: get_env_or_default("STORE_BACKEND", "postgres")?,
        };

        // Database config
        let db = DatabaseConfig {
            url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            host: get_env_or_default("DATABASE_HOST", "localhost")?,
            port: get_env_or_default("DATABASE_PORT", "5432")?,
            user: get_env_or_default("DATABASE_USER", "postgres")?,
            password: get_env_or_default("DATABASE_PASSWORD", "postgres")?,
            name: get_env_or_default("DATABASE_NAME", "quicklink")?,
            max_connections: get_env_or_default("DATABASE_MAX_CONNECTIONS", "50")?,
            min_connections: get_env_or_default("DATABASE_MIN_CONNECTIONS", "1")?,
            connect_timeout_seconds: get_env_or_default("DATABASE_CONNECT_TIMEOUT_SECONDS", "5")?,
            use_migrations: get_env_or_default("DATABASE_USE_MIGRATIONS", "true")?,
            create_database_if_missing: get_env_or_default(
                "DATABASE_CREATE_DATABASE_IF_MISSING",
                "true",
            )?,
        };

        let cache = CacheConfig {
            capacity: get_env_or_default("CACHE_CAPACITY", "10000")?,
        };

        let shortener = ShortenerConfig {
            code_length: get_env_or_default("SHORTENER_CODE_LENGTH", "7")?,
            max_attempts: get_env_or_default("SHORTENER_MAX_ATTEMPTS", "10")?,
            store_timeout_ms: get_env_or_default("SHORTENER_STORE_TIMEOUT_MS", "5000")?,
        };

        // Scaled mode is the production default, development runs one process
        let cluster_default = (environment == Environment::Production).to_string();
        let cluster = ClusterConfig {
            enabled: get_env_or_default("CLUSTER_ENABLED", &cluster_default)?,
            workers: get_env_or_default("CLUSTER_WORKERS", &num_cpus::get().to_string())?,
            backoff_initial_ms: get_env_or_default("CLUSTER_BACKOFF_INITIAL_MS", "100")?,
            backoff_max_ms: get_env_or_default("CLUSTER_BACKOFF_MAX_MS", "30000")?,
            stable_after_seconds: get_env_or_default("CLUSTER_STABLE_AFTER_SECONDS", "30")?,
            max_restarts: get_env_or_default("CLUSTER_MAX_RESTARTS", "10")?,
            restart_window_seconds: get_env_or_default("CLUSTER_RESTART_WINDOW_SECONDS", "60")?,
        };

        let mut config = Config {
            server,
            app,
            db,
            cache,
            shortener,
            cluster,
        };
        config.validate()?;

        info!("Configuration loaded successfully");
        debug!("Loaded config: {:?}", config);

        Ok(config)
    }

    /// Rejects values the service cannot run with and resolves combinations
    /// that cannot work together.
    pub fn validate(&mut self) -> ConfigResult<()> {
        if !(1..=32).contains(&self.shortener.code_length) {
            return Err(ConfigError::Invalid(format!(
                "SHORTENER_CODE_LENGTH must be between 1 and 32, got {}",
                self.shortener.code_length
            )));
        }
        if self.shortener.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "SHORTENER_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.server.threads == 0 {
            return Err(ConfigError::Invalid(
                "SERVER_THREADS must be at least 1".to_string(),
            ));
        }
        if self.cluster.workers == 0 {
            return Err(ConfigError::Invalid(
                "CLUSTER_WORKERS must be at least 1".to_string(),
            ));
        }
        if self.db.min_connections > self.db.max_connections {
            return Err(ConfigError::Invalid(format!(
                "DATABASE_MIN_CONNECTIONS ({}) exceeds DATABASE_MAX_CONNECTIONS ({})",
                self.db.min_connections, self.db.max_connections
            )));
        }
        if self.cluster.enabled && self.app.store_backend == StoreBackend::Memory {
            warn!("The memory store cannot be shared between processes, running a single process");
            self.cluster.enabled = false;
        }
        Ok(())
    }
}

/// Helper function to get an env variable with a default value
fn get_env_or_default<T: std::str::FromStr>(key: &str, default: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(format!("Could not parse {}: {}", key, e))),
        Err(env::VarError::NotPresent) => {
            debug!("{} not set, using default: {}", key, default);
            default.parse::<T>().map_err(|e| {
                ConfigError::ParseError(format!("Could not parse default for {}: {}", key, e))
            })
        }
        Err(e) => Err(ConfigError::EnvVarError(e)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A configuration with every development default, independent of the
    /// process environment.
    pub(crate) fn sample() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".parse().unwrap(),
                port: 8000,
                threads: 1,
            },
            app: AppConfig {
                name: "quicklink".into(),
                version: "0.1.0".into(),
                environment: Environment::Development,
                log_level: "info".into(),
                base_url: "http://127.0.0.1:8000".into(),
                store_backend: StoreBackend::Postgres,
            },
            db: DatabaseConfig {
                url: None,
                host: "localhost".into(),
                port: 5432,
                user: "postgres".into(),
                password: "s3cret".into(),
                name: "quicklink".into(),
                max_connections: 50,
                min_connections: 1,
                use_migrations: true,
                connect_timeout_seconds: 5,
                create_database_if_missing: true,
            },
            cache: CacheConfig { capacity: 10_000 },
            shortener: ShortenerConfig {
                code_length: 7,
                max_attempts: 10,
                store_timeout_ms: 5_000,
            },
            cluster: ClusterConfig {
                enabled: false,
                workers: 4,
                backoff_initial_ms: 100,
                backoff_max_ms: 30_000,
                stable_after_seconds: 30,
                max_restarts: 10,
                restart_window_seconds: 60,
            },
        }
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("Dev".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn store_backend_parses() {
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("PG".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn missing_key_falls_back_to_default() {
        let value: u16 = get_env_or_default("QUICKLINK_TEST_SURELY_UNSET_KEY", "4242").unwrap();
        assert_eq!(value, 4242);
    }

    #[test]
    fn unparsable_default_is_reported() {
        let err = get_env_or_default::<u16>("QUICKLINK_TEST_SURELY_UNSET_KEY", "many").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn defaults_validate() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn code_length_is_bounded() {
        let mut config = sample();
        config.shortener.code_length = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.shortener.code_length = 33;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = sample();
        config.shortener.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn pool_bounds_checked() {
        let mut config = sample();
        config.db.min_connections = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn memory_store_forces_single_process() {
        let mut config = sample();
        config.cluster.enabled = true;
        config.app.store_backend = StoreBackend::Memory;
        config.validate().unwrap();
        assert!(!config.cluster.enabled);
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", sample().db);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn database_name_from_url_override() {
        let mut config = sample();
        config.db.url = Some("postgres://u:p@db.internal:6543/links".into());
        assert_eq!(config.db.database_name().unwrap(), "links");
    }
}
