use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Minimum length accepted for `ADMIN_TOKEN`.
const MIN_ADMIN_TOKEN_LEN: usize = 16;

/// Where snapshots of keys, sessions and frames are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    File,
    Redis,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            "redis" => Ok(StorageBackend::Redis),
            other => Err(format!("unknown backend '{}' (expected memory, file or redis)", other)),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    // Server
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,

    // TTLs (in seconds)
    pub nonce_ttl_secs: u64,
    pub session_ttl_secs: u64,

    // Rate limiting
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: usize,

    // Proxy
    pub trusted_proxy_count: usize,

    // Persistence
    pub storage_backend: StorageBackend,
    pub data_dir: PathBuf,
    pub redis_url: Option<String>,
    pub shadow_log: bool,

    // Admin
    pub admin_token: Option<String>,

    // Live feed
    pub live_channel_capacity: usize,

    // Maintenance
    pub cleanup_interval_secs: u64,

    // Alerts
    pub alert_coalesce_window_secs: u64,
    pub alert_buffer_window_secs: u64,
    pub alert_group_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_body_bytes: 65_536,
            nonce_ttl_secs: 300,
            session_ttl_secs: 900,
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 30,
            trusted_proxy_count: 0,
            storage_backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
            redis_url: None,
            shadow_log: true,
            admin_token: None,
            live_channel_capacity: 256,
            cleanup_interval_secs: 60,
            alert_coalesce_window_secs: 30,
            alert_buffer_window_secs: 10,
            alert_group_ttl_secs: 300,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |set: bool| if set { "[REDACTED]" } else { "[UNSET]" };
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("trusted_proxy_count", &self.trusted_proxy_count)
            .field("storage_backend", &self.storage_backend)
            .field("data_dir", &self.data_dir)
            .field("redis_url", &redacted(self.redis_url.is_some()))
            .field("shadow_log", &self.shadow_log)
            .field("admin_token", &redacted(self.admin_token.is_some()))
            .field("live_channel_capacity", &self.live_channel_capacity)
            .field("cleanup_interval_secs", &self.cleanup_interval_secs)
            .field("alert_coalesce_window_secs", &self.alert_coalesce_window_secs)
            .field("alert_buffer_window_secs", &self.alert_buffer_window_secs)
            .field("alert_group_ttl_secs", &self.alert_group_ttl_secs)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        let defaults = Config::default();

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;
        let max_body_bytes = parse_env_or_default("MAX_BODY_BYTES", defaults.max_body_bytes)?;

        // TTLs
        let nonce_ttl_secs = parse_env_or_default("NONCE_TTL_SECS", defaults.nonce_ttl_secs)?;
        let session_ttl_secs =
            parse_env_or_default("SESSION_TTL_SECS", defaults.session_ttl_secs)?;

        // Rate limiting
        let rate_limit_window_secs =
            parse_env_or_default("RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window_secs)?;
        let rate_limit_max_requests =
            parse_env_or_default("RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit_max_requests)?;

        // Proxy configuration
        let trusted_proxy_count =
            parse_env_or_default("TRUSTED_PROXY_COUNT", defaults.trusted_proxy_count)?;

        // Persistence
        let storage_backend = parse_env_or_default("STORAGE_BACKEND", defaults.storage_backend)?;
        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let redis_url = non_empty_var("REDIS_URL");
        if storage_backend == StorageBackend::Redis && redis_url.is_none() {
            return Err(ConfigError::MissingVar("REDIS_URL".to_string()));
        }
        let shadow_log = parse_env_or_default("SHADOW_LOG", defaults.shadow_log)?;

        // Admin
        let admin_token = non_empty_var("ADMIN_TOKEN");
        if let Some(token) = &admin_token {
            if token.len() < MIN_ADMIN_TOKEN_LEN {
                return Err(ConfigError::InvalidValue(
                    "ADMIN_TOKEN".to_string(),
                    format!("must be at least {} characters", MIN_ADMIN_TOKEN_LEN),
                ));
            }
        }

        let live_channel_capacity =
            parse_env_or_default("LIVE_CHANNEL_CAPACITY", defaults.live_channel_capacity)?;
        let cleanup_interval_secs =
            parse_env_or_default("CLEANUP_INTERVAL_SECS", defaults.cleanup_interval_secs)?;

        // Alerts
        let alert_coalesce_window_secs = parse_env_or_default(
            "ALERT_COALESCE_WINDOW_SECS",
            defaults.alert_coalesce_window_secs,
        )?;
        let alert_buffer_window_secs =
            parse_env_or_default("ALERT_BUFFER_WINDOW_SECS", defaults.alert_buffer_window_secs)?;
        let alert_group_ttl_secs =
            parse_env_or_default("ALERT_GROUP_TTL_SECS", defaults.alert_group_ttl_secs)?;

        let config = Config {
            bind_addr,
            max_body_bytes,
            nonce_ttl_secs,
            session_ttl_secs,
            rate_limit_window_secs,
            rate_limit_max_requests,
            trusted_proxy_count,
            storage_backend,
            data_dir,
            redis_url,
            shadow_log,
            admin_token,
            live_channel_capacity,
            cleanup_interval_secs,
            alert_coalesce_window_secs,
            alert_buffer_window_secs,
            alert_group_ttl_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject zero values where a zero would disable a safety bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("NONCE_TTL_SECS", self.nonce_ttl_secs),
            ("SESSION_TTL_SECS", self.session_ttl_secs),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit_window_secs),
            ("RATE_LIMIT_MAX_REQUESTS", self.rate_limit_max_requests as u64),
            ("MAX_BODY_BYTES", self.max_body_bytes as u64),
            ("LIVE_CHANNEL_CAPACITY", self.live_channel_capacity as u64),
            ("CLEANUP_INTERVAL_SECS", self.cleanup_interval_secs),
            ("ALERT_COALESCE_WINDOW_SECS", self.alert_coalesce_window_secs),
            ("ALERT_BUFFER_WINDOW_SECS", self.alert_buffer_window_secs),
            ("ALERT_GROUP_TTL_SECS", self.alert_group_ttl_secs),
        ];
        for (key, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
        }

        let durations = [
            ("NONCE_TTL_SECS", self.nonce_ttl_secs),
            ("SESSION_TTL_SECS", self.session_ttl_secs),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit_window_secs),
            ("CLEANUP_INTERVAL_SECS", self.cleanup_interval_secs),
            ("ALERT_COALESCE_WINDOW_SECS", self.alert_coalesce_window_secs),
            ("ALERT_BUFFER_WINDOW_SECS", self.alert_buffer_window_secs),
            ("ALERT_GROUP_TTL_SECS", self.alert_group_ttl_secs),
        ];
        for (key, value) in durations {
            if value > MAX_DURATION_SECS {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    format!("must be at most {} seconds", MAX_DURATION_SECS),
                ));
            }
        }
        Ok(())
    }
}

/// Upper bound for every `*_SECS` setting (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
