//! Configuration module
//!
//! Provides structured configuration for the honeyscope console.
//! Configuration can be loaded from:
//! 1. Default values (hardcoded)
//! 2. honeyscope.toml file (optional)
//! 3. Environment variables with HONEYSCOPE__ prefix
//!
//! Example environment variable override:
//! HONEYSCOPE__LOGGING__LEVEL=debug
//! HONEYSCOPE__BACKEND__BASE_URL=http://10.0.0.5:5000

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub sync: SyncConfig,
    pub view: ViewConfig,
    pub logging: LogConfig,
    pub export: ExportConfig,
}

/// Honeypot backend API location
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Scheme and authority; the `/api` base path is appended
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// Polling loop configuration
#[derive(Debug, Deserialize)]
pub struct SyncConfig {
    pub interval_secs: u64,
    /// Pending updates buffered between the poller and the console
    pub channel_capacity: usize,
    /// Repeated failures of one kind are logged at most once per window
    pub failure_log_window_secs: u64,
}

/// Presentation defaults
#[derive(Debug, Deserialize)]
pub struct ViewConfig {
    /// Maximum events printed per listing
    pub event_limit: usize,
    pub surface_width: f64,
    pub surface_height: f64,
}

/// Operational logging configuration (application debug logs)
#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub directory: PathBuf,
    pub filename: String,
    pub console_output: bool,
}

/// NDJSON export of the filtered view
#[derive(Debug, Deserialize)]
pub struct ExportConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub filename: String,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn failure_log_window(&self) -> Duration {
        Duration::from_secs(self.failure_log_window_secs)
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl AppConfig {
    /// Load configuration from defaults, honeyscope.toml, and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let s = config::Config::builder()
            // --- Defaults ---
            // Backend
            .set_default("backend.base_url", "http://127.0.0.1:5000")?
            .set_default("backend.request_timeout_secs", 5)?
            // Sync
            .set_default("sync.interval_secs", 10)?
            .set_default("sync.channel_capacity", 4)?
            .set_default("sync.failure_log_window_secs", 60)?
            // View
            .set_default("view.event_limit", 100)?
            .set_default("view.surface_width", 800.0)?
            .set_default("view.surface_height", 400.0)?
            // Logging
            .set_default("logging.level", "info")?
            .set_default("logging.directory", "logs")?
            .set_default("logging.filename", "honeyscope.log")?
            .set_default("logging.console_output", true)?
            // Export
            .set_default("export.enabled", false)?
            .set_default("export.directory", "logs")?
            .set_default("export.filename", "events.ndjson")?
            // --- Sources ---
            .add_source(config::File::with_name("honeyscope").required(false))
            .add_source(config::Environment::with_prefix("HONEYSCOPE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: "http://127.0.0.1:5000".to_string(),
                request_timeout_secs: 5,
            },
            sync: SyncConfig {
                interval_secs: 10,
                channel_capacity: 4,
                failure_log_window_secs: 60,
            },
            view: ViewConfig {
                event_limit: 100,
                surface_width: 800.0,
                surface_height: 400.0,
            },
            logging: LogConfig {
                level: "info".to_string(),
                directory: PathBuf::from("logs"),
                filename: "honeyscope.log".to_string(),
                console_output: true,
            },
            export: ExportConfig {
                enabled: false,
                directory: PathBuf::from("logs"),
                filename: "events.ndjson".to_string(),
            },
        }
    }
}
