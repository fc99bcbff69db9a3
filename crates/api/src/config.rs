use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fluxgen_comfyui::api::ApiTimeouts;
use fluxgen_pipeline::retry::RetryConfig;
use fluxgen_pipeline::service::GenerationConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local ComfyUI on the same host.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins from comma-separated `CORS_ORIGINS`; `*` allows any.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`). Raised at runtime to
    /// cover a full result resolution, see [`ServerConfig::request_timeout`].
    pub request_timeout_secs: u64,
    /// Base URL of the ComfyUI HTTP API.
    pub comfyui_url: String,
    /// Directory ComfyUI writes images into.
    pub output_dir: PathBuf,
    /// Workflow template loaded at startup.
    pub workflow_file: PathBuf,
    /// Queue depth at which new requests are refused; also caps `batch_count`.
    pub max_queue_size: usize,
    pub result_retry_attempts: u32,
    pub result_retry_unit_ms: u64,
    /// How long task records are kept (default: one hour).
    pub task_ttl_secs: u64,
    pub task_eviction_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                             |
    /// |-------------------------------|-------------------------------------|
    /// | `HOST`                        | `0.0.0.0`                           |
    /// | `PORT`                        | `5000`                              |
    /// | `CORS_ORIGINS`                | `*`                                 |
    /// | `REQUEST_TIMEOUT_SECS`        | `60`                                |
    /// | `COMFYUI_URL`                 | `http://localhost:8188`             |
    /// | `COMFYUI_OUTPUT_DIR`          | `./output`                          |
    /// | `WORKFLOW_FILE`               | `workflows/flux_text_to_image.json` |
    /// | `MAX_QUEUE_SIZE`              | `5`                                 |
    /// | `RESULT_RETRY_ATTEMPTS`       | `3`                                 |
    /// | `RESULT_RETRY_UNIT_MS`        | `1000`                              |
    /// | `TASK_TTL_SECS`               | `3600`                              |
    /// | `TASK_EVICTION_INTERVAL_SECS` | `300`                               |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let comfyui_url =
            std::env::var("COMFYUI_URL").unwrap_or_else(|_| "http://localhost:8188".into());

        let output_dir = std::env::var("COMFYUI_OUTPUT_DIR")
            .unwrap_or_else(|_| "./output".into())
            .into();

        let workflow_file = std::env::var("WORKFLOW_FILE")
            .unwrap_or_else(|_| "workflows/flux_text_to_image.json".into())
            .into();

        Self {
            host,
            port: parse_env("PORT", 5000),
            cors_origins,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 60),
            comfyui_url,
            output_dir,
            workflow_file,
            max_queue_size: parse_env("MAX_QUEUE_SIZE", 5),
            result_retry_attempts: parse_env("RESULT_RETRY_ATTEMPTS", 3),
            result_retry_unit_ms: parse_env("RESULT_RETRY_UNIT_MS", 1000),
            task_ttl_secs: parse_env("TASK_TTL_SECS", 3600),
            task_eviction_interval_secs: parse_env("TASK_EVICTION_INTERVAL_SECS", 300),
        }
    }

    /// Whether `CORS_ORIGINS` opens the API to every origin.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }

    /// Worst-case duration of one `GET /result`: the first history and
    /// queue queries, then every retry wait plus its history query.
    pub fn result_resolution_budget(&self) -> Duration {
        let timeouts = ApiTimeouts::default();
        let attempts = self.result_retry_attempts;
        let waits = (1..=u64::from(attempts)).sum::<u64>() * self.result_retry_unit_ms;
        timeouts.history * (attempts + 1) + timeouts.queue + Duration::from_millis(waits)
    }

    /// Request timeout applied by the router. Never shorter than the result
    /// resolution budget plus a few seconds of slack, so an in-flight
    /// resolution always finishes with its own answer.
    pub fn request_timeout(&self) -> Duration {
        let configured = Duration::from_secs(self.request_timeout_secs);
        configured.max(self.result_resolution_budget() + RESOLUTION_SLACK)
    }

    /// Settings for the generation service.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_queue_size: self.max_queue_size,
            output_dir: self.output_dir.clone(),
            retry: RetryConfig {
                attempts: self.result_retry_attempts,
                unit: Duration::from_millis(self.result_retry_unit_ms),
            },
            task_ttl: chrono::Duration::seconds(self.task_ttl_secs as i64),
            ..Default::default()
        }
    }
}

const RESOLUTION_SLACK: Duration = Duration::from_secs(5);

/// Read and parse `key`, falling back to `default` when unset.
///
/// Panics on an unparsable value; misconfiguration should stop startup.
fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}
