use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default ceiling for a single upload (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration shared by the HTTP server and the worker binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret expected in the `api_key` request header.
    pub api_key: String,
    /// Connection string for the Redis instance holding job records and the queue.
    pub redis_url: String,
    /// Directory where uploaded PDFs wait for extraction.
    pub upload_dir: PathBuf,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Name of the queue extraction jobs are pushed to.
    pub queue_name: String,
    /// Number of concurrent consumers started by the worker binary.
    pub worker_concurrency: usize,
    /// Maximum time a consumer blocks on an empty queue before re-checking for shutdown.
    pub worker_poll_interval_ms: u64,
    /// Consumers to run inside the HTTP server process (0 disables them).
    pub embedded_workers: usize,
    /// Optional expiry applied to finished job records.
    pub job_ttl_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: load_env("API_KEY")?,
            redis_url: load_env_optional("REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379/1".to_string()),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./tmp/uploads")),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            server_port: parse_optional("SERVER_PORT")?,
            queue_name: load_env_optional("QUEUE_NAME")
                .unwrap_or_else(|| "convert_pdf".to_string()),
            worker_concurrency: parse_optional("WORKER_CONCURRENCY")?.unwrap_or(2),
            worker_poll_interval_ms: parse_optional("WORKER_POLL_INTERVAL_MS")?.unwrap_or(1000),
            embedded_workers: parse_optional("EMBEDDED_WORKERS")?.unwrap_or(0),
            job_ttl_secs: parse_optional("JOB_TTL_SECS")?.filter(|ttl| *ttl > 0),
        })
    }

    /// Blocking budget for a single dequeue attempt.
    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms.max(1))
    }

    /// Expiry for finished job records, if configured.
    pub fn job_ttl(&self) -> Option<Duration> {
        self.job_ttl_secs.map(Duration::from_secs)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        redis_url = %config.redis_url,
        upload_dir = %config.upload_dir.display(),
        max_upload_bytes = config.max_upload_bytes,
        server_port = ?config.server_port,
        queue = %config.queue_name,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_optional_rejects_garbage() {
        // SAFETY: the variable name is unique to this test.
        unsafe { env::set_var("DOCPOLL_TEST_GARBAGE_PORT", "not-a-port") };
        let result = parse_optional::<u16>("DOCPOLL_TEST_GARBAGE_PORT");
        assert!(matches!(result, Err(ConfigError::InvalidValue(key)) if key == "DOCPOLL_TEST_GARBAGE_PORT"));
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        // SAFETY: the variable name is unique to this test.
        unsafe { env::set_var("DOCPOLL_TEST_BLANK", "   ") };
        assert!(load_env_optional("DOCPOLL_TEST_BLANK").is_none());
        assert!(matches!(
            load_env("DOCPOLL_TEST_BLANK"),
            Err(ConfigError::MissingVariable(_))
        ));
    }

    #[test]
    fn poll_interval_never_zero() {
        let config = Config {
            api_key: "secret".into(),
            redis_url: "redis://127.0.0.1:6379/1".into(),
            upload_dir: PathBuf::from("./tmp/uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            server_port: None,
            queue_name: "convert_pdf".into(),
            worker_concurrency: 1,
            worker_poll_interval_ms: 0,
            embedded_workers: 0,
            job_ttl_secs: None,
        };
        assert_eq!(config.worker_poll_interval(), Duration::from_millis(1));
        assert!(config.job_ttl().is_none());
    }
}
