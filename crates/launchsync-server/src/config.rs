//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

use launchsync_db::PoolSettings;
use launchsync_engine::{MirrorSettings, TransitionPolicy};

use crate::reconcile::ReconcileSettings;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Upstream event feed.
    #[serde(default)]
    pub feed: FeedConfig,

    /// External calendar service.
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Notification delivery.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Timer intervals.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Reconciliation tunables.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Network configuration for the operator API.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "launchsync_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    /// URL serving the normalized feed snapshot. Reconciliation stays off
    /// while unset.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarConfig {
    /// Base URL of the calendar service.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// HTTP timeout of the webhook client, in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,

    #[serde(default = "default_countdown_interval")]
    pub countdown_interval_seconds: u64,

    #[serde(default = "default_retention_interval")]
    pub retention_interval_seconds: u64,

    /// How long sent keys are kept.
    #[serde(default = "default_sent_retention_days")]
    pub sent_retention_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Maximum in-flight external calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound for a single external call, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Time-change notifications only fire for new starts within this many
    /// days.
    #[serde(default = "default_lookahead_window_days")]
    pub lookahead_window_days: u32,

    #[serde(default = "default_live_buffer_seconds")]
    pub live_buffer_seconds: u32,

    #[serde(default = "default_live_slip_threshold_seconds")]
    pub live_slip_threshold_seconds: u32,

    /// Countdown scans never look further back than this.
    #[serde(default = "default_max_countdown_lookback_minutes")]
    pub max_countdown_lookback_minutes: u32,
}

impl DatabaseConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            max_connections: self.pool_max_size.max(1),
        }
    }
}

impl ReconcileConfig {
    pub fn policy(&self) -> TransitionPolicy {
        TransitionPolicy::new(chrono::Duration::days(i64::from(self.lookahead_window_days)))
    }

    pub fn settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            concurrency: self.concurrency.max(1),
            call_timeout: self.call_timeout(),
            mirror: MirrorSettings {
                live_buffer: chrono::Duration::seconds(i64::from(self.live_buffer_seconds)),
                live_slip_threshold: chrono::Duration::seconds(i64::from(
                    self.live_slip_threshold_seconds,
                )),
            },
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn max_countdown_lookback(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.max_countdown_lookback_minutes))
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "launchsync.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_reconcile_interval() -> u64 {
    180
}

fn default_countdown_interval() -> u64 {
    60
}

fn default_retention_interval() -> u64 {
    3_600
}

fn default_sent_retention_days() -> u32 {
    14
}

fn default_concurrency() -> usize {
    8
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_lookahead_window_days() -> u32 {
    28
}

fn default_live_buffer_seconds() -> u32 {
    60
}

fn default_live_slip_threshold_seconds() -> u32 {
    3_600
}

fn default_max_countdown_lookback_minutes() -> u32 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_seconds: default_reconcile_interval(),
            countdown_interval_seconds: default_countdown_interval(),
            retention_interval_seconds: default_retention_interval(),
            sent_retention_days: default_sent_retention_days(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            call_timeout_ms: default_call_timeout_ms(),
            lookahead_window_days: default_lookahead_window_days(),
            live_buffer_seconds: default_live_buffer_seconds(),
            live_slip_threshold_seconds: default_live_slip_threshold_seconds(),
            max_countdown_lookback_minutes: default_max_countdown_lookback_minutes(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `LAUNCHSYNC_HOST` overrides `server.host`
/// - `LAUNCHSYNC_PORT` overrides `server.port`
/// - `LAUNCHSYNC_DB_PATH` overrides `database.path`
/// - `LAUNCHSYNC_LOG_LEVEL` overrides `logging.level`
/// - `LAUNCHSYNC_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `LAUNCHSYNC_FEED_URL` overrides `feed.url`
/// - `LAUNCHSYNC_CALENDAR_URL` overrides `calendar.base_url`
/// - `LAUNCHSYNC_RECONCILE_INTERVAL` overrides `schedule.reconcile_interval_seconds`
/// - `LAUNCHSYNC_COUNTDOWN_INTERVAL` overrides `schedule.countdown_interval_seconds`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(parsed) = var("LAUNCHSYNC_HOST").and_then(|v| v.parse().ok()) {
        config.server.host = parsed;
    }
    if let Some(parsed) = var("LAUNCHSYNC_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = parsed;
    }
    if let Some(db_path) = var("LAUNCHSYNC_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("LAUNCHSYNC_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("LAUNCHSYNC_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(url) = var("LAUNCHSYNC_FEED_URL").filter(|v| !v.trim().is_empty()) {
        config.feed.url = Some(url);
    }
    if let Some(url) = var("LAUNCHSYNC_CALENDAR_URL").filter(|v| !v.trim().is_empty()) {
        config.calendar.base_url = Some(url);
    }
    if let Some(parsed) = var("LAUNCHSYNC_RECONCILE_INTERVAL").and_then(|v| v.parse().ok()) {
        config.schedule.reconcile_interval_seconds = parsed;
    }
    if let Some(parsed) = var("LAUNCHSYNC_COUNTDOWN_INTERVAL").and_then(|v| v.parse().ok()) {
        config.schedule.countdown_interval_seconds = parsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.path, "launchsync.db");
        assert_eq!(config.schedule.reconcile_interval_seconds, 180);
        assert_eq!(config.schedule.countdown_interval_seconds, 60);
        assert_eq!(config.schedule.sent_retention_days, 14);
        assert_eq!(config.reconcile.concurrency, 8);
        assert_eq!(config.reconcile.policy().window(), chrono::Duration::days(28));
        assert!(config.feed.url.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [feed]
            url = "https://feed.example/snapshot"

            [reconcile]
            live_buffer_seconds = 120
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.feed.url.as_deref(), Some("https://feed.example/snapshot"));
        let settings = config.reconcile.settings();
        assert_eq!(settings.mirror.live_buffer, chrono::Duration::seconds(120));
        assert_eq!(settings.mirror.live_slip_threshold, chrono::Duration::hours(1));
        assert_eq!(settings.call_timeout, Duration::from_secs(10));
    }

    #[test]
    fn database_section_drives_pool_settings() {
        let config: Config = toml::from_str(
            r#"
            [database]
            busy_timeout_ms = 750
            pool_max_size = 0
            "#,
        )
        .expect("valid toml");
        let settings = config.database.pool_settings();
        assert_eq!(settings.busy_timeout, Duration::from_millis(750));
        assert_eq!(settings.max_connections, 1, "an empty pool is never requested");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file is not an error");
        assert_eq!(config.server.port, Config::default().server.port);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").expect("write config");
        let err = load_config(path.to_str()).expect_err("should fail to parse");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("LAUNCHSYNC_PORT", "8088"),
            ("LAUNCHSYNC_LOG_JSON", "1"),
            ("LAUNCHSYNC_FEED_URL", "https://feed.example/v2"),
            ("LAUNCHSYNC_RECONCILE_INTERVAL", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        apply_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8088);
        assert!(config.logging.json);
        assert_eq!(config.feed.url.as_deref(), Some("https://feed.example/v2"));
        assert_eq!(config.schedule.reconcile_interval_seconds, 180);
    }
}
