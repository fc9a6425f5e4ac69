use std::time::Duration;

/// Manager configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. Without a
/// `DATABASE_URL` the manager runs on the in-memory store.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// PostgreSQL connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Connection pool size (default: `20`).
    pub db_max_connections: u32,
    /// Upper bound on a single storage call (default: `5000` ms).
    pub storage_timeout: Duration,
    /// Parallel message handlers per channel (default: `16`).
    pub consumer_concurrency: usize,
    /// Broadcast buffer per bus channel (default: `1024`).
    pub bus_capacity: usize,
    /// Whitelist cache entries before a wholesale clear (default: `4096`).
    pub whitelist_cache_capacity: usize,
    /// How long shutdown waits for consumers to drain (default: `10` s).
    pub shutdown_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 20,
            storage_timeout: Duration::from_millis(5000),
            consumer_concurrency: 16,
            bus_capacity: 1024,
            whitelist_cache_capacity: 4096,
            shutdown_timeout_secs: 10,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `DATABASE_URL`             | unset   |
    /// | `DB_MAX_CONNECTIONS`       | `20`    |
    /// | `STORAGE_TIMEOUT_MS`       | `5000`  |
    /// | `CONSUMER_CONCURRENCY`     | `16`    |
    /// | `BUS_CAPACITY`             | `1024`  |
    /// | `WHITELIST_CACHE_CAPACITY` | `4096`  |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `10`    |
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let db_max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "20".into())
            .parse()
            .expect("DB_MAX_CONNECTIONS must be a valid u32");

        let storage_timeout_ms: u64 = std::env::var("STORAGE_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("STORAGE_TIMEOUT_MS must be a valid u64");

        let consumer_concurrency: usize = std::env::var("CONSUMER_CONCURRENCY")
            .unwrap_or_else(|_| "16".into())
            .parse()
            .expect("CONSUMER_CONCURRENCY must be a valid usize");

        let bus_capacity: usize = std::env::var("BUS_CAPACITY")
            .unwrap_or_else(|_| "1024".into())
            .parse()
            .expect("BUS_CAPACITY must be a valid usize");

        let whitelist_cache_capacity: usize = std::env::var("WHITELIST_CACHE_CAPACITY")
            .unwrap_or_else(|_| "4096".into())
            .parse()
            .expect("WHITELIST_CACHE_CAPACITY must be a valid usize");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            database_url,
            db_max_connections,
            storage_timeout: Duration::from_millis(storage_timeout_ms),
            consumer_concurrency,
            bus_capacity,
            whitelist_cache_capacity,
            shutdown_timeout_secs,
        }
    }
}
