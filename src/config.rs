//! Configuration types for manga-mirror

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, path::PathBuf, str::FromStr};

/// Scanner behavior configuration (discovery of missing chapters)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Interval between scanner ticks in milliseconds (default: 60000)
    #[serde(default = "default_scanner_interval_ms")]
    pub interval_ms: u64,

    /// Maximum series scanned in parallel within one tick (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_scans: usize,

    /// Default check interval for new series, in minutes (default: 360)
    #[serde(default = "default_check_interval_minutes")]
    pub default_check_interval_minutes: u32,

    /// Consult the lightweight source-metadata endpoint and skip the full
    /// listing fetch when source and backend counts agree (default: true)
    #[serde(default = "default_true")]
    pub use_metadata_fast_path: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_scanner_interval_ms(),
            max_concurrent_scans: default_max_concurrent(),
            default_check_interval_minutes: default_check_interval_minutes(),
            use_metadata_fast_path: true,
        }
    }
}

/// Sync processor behavior configuration (draining the task queue)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Interval between processor ticks in milliseconds (default: 10000)
    #[serde(default = "default_processor_interval_ms")]
    pub interval_ms: u64,

    /// Maximum series processed in parallel within one tick (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_syncs: usize,

    /// Per-series chapter budget per tick (default: 3)
    #[serde(default = "default_chapters_per_series")]
    pub chapters_per_series: usize,

    /// Recorded retry ceiling surfaced to hosts; the processor itself never
    /// auto-retries (retries are operator-driven or come from rescans)
    #[serde(default = "default_max_task_retries")]
    pub max_task_retries: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_processor_interval_ms(),
            max_concurrent_syncs: default_max_concurrent(),
            chapters_per_series: default_chapters_per_series(),
            max_task_retries: default_max_task_retries(),
        }
    }
}

/// Per-source-domain processing policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainPolicy {
    /// Cap on chapters processed per tick for series whose source lives on
    /// this domain (bounds the per-series budget when smaller)
    #[serde(default = "default_chapters_per_series")]
    pub max_concurrent_chapters: usize,

    /// Optional delay between consecutive chapters, in milliseconds
    #[serde(default)]
    pub inter_chapter_delay_ms: u64,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            max_concurrent_chapters: default_chapters_per_series(),
            inter_chapter_delay_ms: 0,
        }
    }
}

/// External collaborator endpoints, keys, and deadlines
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExternalConfig {
    /// Scraper base URLs; more than one entry enables round-robin host
    /// pooling with health tracking
    #[serde(default)]
    pub scraper_base_urls: Vec<String>,

    /// Uploader base URL
    #[serde(default)]
    pub uploader_base_url: String,

    /// Catalog backend base URL
    #[serde(default)]
    pub catalog_base_url: String,

    /// Cache-purge service base URL (None disables purging)
    #[serde(default)]
    pub cache_purge_base_url: Option<String>,

    /// Event bus base URL (None disables external publication)
    #[serde(default)]
    pub event_bus_base_url: Option<String>,

    /// Notification channel base URL (None disables failure notifications)
    #[serde(default)]
    pub notification_base_url: Option<String>,

    /// Uploader API key
    #[serde(default)]
    pub uploader_api_key: Option<String>,

    /// Catalog API key
    #[serde(default)]
    pub catalog_api_key: Option<String>,

    /// Cache-purge API key
    #[serde(default)]
    pub cache_purge_api_key: Option<String>,

    /// Event bus API key
    #[serde(default)]
    pub event_bus_api_key: Option<String>,

    /// Notification channel key
    #[serde(default)]
    pub notification_api_key: Option<String>,

    /// Deadline for catalog and scraper metadata calls, ms (default: 30000)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Deadline for scraping a chapter's image list, ms (default: 60000)
    #[serde(default = "default_scrape_timeout_ms")]
    pub scrape_timeout_ms: u64,

    /// Deadline for staging and uploading, ms (default: 120000)
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,

    /// Thumbnail URL applied to chapters registered in the catalog
    #[serde(default = "default_thumbnail_url")]
    pub default_thumbnail_url: String,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            scraper_base_urls: Vec::new(),
            uploader_base_url: String::new(),
            catalog_base_url: String::new(),
            cache_purge_base_url: None,
            event_bus_base_url: None,
            notification_base_url: None,
            uploader_api_key: None,
            catalog_api_key: None,
            cache_purge_api_key: None,
            event_bus_api_key: None,
            notification_api_key: None,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            scrape_timeout_ms: default_scrape_timeout_ms(),
            upload_timeout_ms: default_upload_timeout_ms(),
            default_thumbnail_url: default_thumbnail_url(),
        }
    }
}

/// Admin API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address for the admin API (default: 0.0.0.0:3000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Shared admin secret; None disables authentication (local development)
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// Enable CORS from any origin (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Serve Swagger UI at /swagger-ui (default: false)
    #[serde(default)]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            admin_api_key: None,
            cors_enabled: true,
            swagger_ui: false,
        }
    }
}

/// Failure notification configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Notify only after this many consecutive failures (default: 3)
    #[serde(default = "default_notify_after_failures")]
    pub notify_after_failures: u32,

    /// Minimum gap between notifications per series, ms (default: 3600000)
    #[serde(default = "default_notification_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            notify_after_failures: default_notify_after_failures(),
            cooldown_ms: default_notification_cooldown_ms(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database file path (default: "./data/mirror.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for MirrorService
///
/// Fields are organized into logical sub-configs:
/// - [`scanner`](ScannerConfig) — discovery cadence and parallelism
/// - [`processor`](ProcessorConfig) — task draining cadence and budgets
/// - [`external`](ExternalConfig) — collaborator endpoints, keys, deadlines
/// - [`api`](ApiConfig) — admin API bind address and auth
/// - [`notifications`](NotificationConfig) — failure notification policy
/// - [`persistence`](PersistenceConfig) — database location
/// - `domains` — per-source-domain processing policies
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scanner settings
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Sync processor settings
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// External collaborator settings
    #[serde(default)]
    pub external: ExternalConfig,

    /// Admin API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Failure notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Database settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Per-source-domain processing policies, keyed by hostname
    #[serde(default)]
    pub domains: HashMap<String, DomainPolicy>,

    /// Log level hint for hosts wiring a tracing subscriber (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Build a configuration from environment variables.
    ///
    /// Loads a `.env` file when present, then reads the recognized variables
    /// (`PORT`, `HOST`, `SCANNER_INTERVAL_MS`, `ADMIN_API_KEY`, ...), falling
    /// back to the documented defaults. Unparseable values are configuration
    /// errors, not silent defaults.
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine; a malformed one is not silently swallowed
        // because dotenvy only errors on I/O or parse problems.
        let _ = dotenvy::dotenv();

        let host = env_or("HOST", "0.0.0.0");
        let port: u16 = env_parse("PORT", 3000)?;
        let bind_address = SocketAddr::from_str(&format!("{}:{}", host, port)).map_err(|e| {
            Error::Config {
                message: format!("invalid HOST/PORT combination: {}", e),
                key: Some("HOST".to_string()),
            }
        })?;

        let scraper_base_urls = std::env::var("SCRAPER_BASE_URL")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().trim_end_matches('/').to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            scanner: ScannerConfig {
                interval_ms: env_parse("SCANNER_INTERVAL_MS", default_scanner_interval_ms())?,
                max_concurrent_scans: env_parse("MAX_CONCURRENT_SCANS", default_max_concurrent())?,
                default_check_interval_minutes: env_parse(
                    "DEFAULT_CHECK_INTERVAL_MINUTES",
                    default_check_interval_minutes(),
                )?,
                use_metadata_fast_path: env_parse("USE_METADATA_FAST_PATH", true)?,
            },
            processor: ProcessorConfig {
                interval_ms: env_parse("PROCESSOR_INTERVAL_MS", default_processor_interval_ms())?,
                max_concurrent_syncs: env_parse("MAX_CONCURRENT_SYNCS", default_max_concurrent())?,
                chapters_per_series: env_parse(
                    "DEFAULT_CHAPTERS_PER_SERIES",
                    default_chapters_per_series(),
                )?,
                max_task_retries: env_parse("MAX_TASK_RETRIES", default_max_task_retries())?,
            },
            external: ExternalConfig {
                scraper_base_urls,
                uploader_base_url: env_or("UPLOADER_BASE_URL", ""),
                catalog_base_url: env_or("CATALOG_BASE_URL", ""),
                cache_purge_base_url: std::env::var("CACHE_PURGE_BASE_URL").ok(),
                event_bus_base_url: std::env::var("EVENT_BUS_BASE_URL").ok(),
                notification_base_url: std::env::var("NOTIFICATION_BASE_URL").ok(),
                uploader_api_key: std::env::var("UPLOADER_API_KEY").ok(),
                catalog_api_key: std::env::var("CATALOG_API_KEY").ok(),
                cache_purge_api_key: std::env::var("CACHE_PURGE_API_KEY").ok(),
                event_bus_api_key: std::env::var("EVENT_BUS_API_KEY").ok(),
                notification_api_key: std::env::var("NOTIFICATION_API_KEY").ok(),
                fetch_timeout_ms: env_parse("FETCH_TIMEOUT_MS", default_fetch_timeout_ms())?,
                scrape_timeout_ms: env_parse("SCRAPE_TIMEOUT_MS", default_scrape_timeout_ms())?,
                upload_timeout_ms: env_parse("UPLOAD_TIMEOUT_MS", default_upload_timeout_ms())?,
                default_thumbnail_url: env_or("DEFAULT_THUMBNAIL_URL", &default_thumbnail_url()),
            },
            api: ApiConfig {
                bind_address,
                admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
                cors_enabled: env_parse("CORS_ENABLED", true)?,
                swagger_ui: env_parse("SWAGGER_UI", false)?,
            },
            notifications: NotificationConfig {
                notify_after_failures: env_parse(
                    "NOTIFY_AFTER_FAILURES",
                    default_notify_after_failures(),
                )?,
                cooldown_ms: env_parse(
                    "NOTIFICATION_COOLDOWN_MS",
                    default_notification_cooldown_ms(),
                )?,
            },
            persistence: PersistenceConfig {
                database_path: PathBuf::from(env_or(
                    "DATABASE_PATH",
                    &default_database_path().display().to_string(),
                )),
            },
            domains: HashMap::new(),
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }

    /// Processing policy for a source domain, falling back to defaults
    pub fn domain_policy(&self, domain: &str) -> DomainPolicy {
        self.domains.get(domain).cloned().unwrap_or_default()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| Error::Config {
            message: format!("invalid value for {}: {:?}", key, raw),
            key: Some(key.to_string()),
        }),
        Err(_) => Ok(default),
    }
}

fn default_scanner_interval_ms() -> u64 {
    60_000
}

fn default_processor_interval_ms() -> u64 {
    10_000
}

fn default_max_concurrent() -> usize {
    5
}

fn default_check_interval_minutes() -> u32 {
    360
}

fn default_chapters_per_series() -> usize {
    3
}

fn default_max_task_retries() -> u32 {
    3
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_scrape_timeout_ms() -> u64 {
    60_000
}

fn default_upload_timeout_ms() -> u64 {
    120_000
}

fn default_notify_after_failures() -> u32 {
    3
}

fn default_notification_cooldown_ms() -> u64 {
    3_600_000
}

fn default_thumbnail_url() -> String {
    "https://static.example.com/thumbnails/default.jpg".to_string()
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/mirror.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.scanner.interval_ms, 60_000);
        assert_eq!(config.scanner.max_concurrent_scans, 5);
        assert_eq!(config.scanner.default_check_interval_minutes, 360);
        assert_eq!(config.processor.interval_ms, 10_000);
        assert_eq!(config.processor.max_concurrent_syncs, 5);
        assert_eq!(config.processor.chapters_per_series, 3);
        assert_eq!(config.processor.max_task_retries, 3);
        assert_eq!(config.external.fetch_timeout_ms, 30_000);
        assert_eq!(config.external.scrape_timeout_ms, 60_000);
        assert_eq!(config.external.upload_timeout_ms, 120_000);
        assert_eq!(config.notifications.notify_after_failures, 3);
        assert_eq!(config.notifications.cooldown_ms, 3_600_000);
        assert_eq!(config.api.bind_address.port(), 3000);
        assert!(config.api.cors_enabled);
        assert!(!config.api.swagger_ui);
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        unsafe {
            std::env::set_var("SCANNER_INTERVAL_MS", "5000");
            std::env::set_var("MAX_CONCURRENT_SYNCS", "2");
            std::env::set_var("SCRAPER_BASE_URL", "http://a.test/, http://b.test");
            std::env::set_var("ADMIN_API_KEY", "secret");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.scanner.interval_ms, 5000);
        assert_eq!(config.processor.max_concurrent_syncs, 2);
        assert_eq!(
            config.external.scraper_base_urls,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert_eq!(config.api.admin_api_key.as_deref(), Some("secret"));

        unsafe {
            std::env::remove_var("SCANNER_INTERVAL_MS");
            std::env::remove_var("MAX_CONCURRENT_SYNCS");
            std::env::remove_var("SCRAPER_BASE_URL");
            std::env::remove_var("ADMIN_API_KEY");
        }
    }

    #[test]
    #[serial]
    fn from_env_rejects_unparseable_values() {
        unsafe {
            std::env::set_var("PROCESSOR_INTERVAL_MS", "soon");
        }

        let result = Config::from_env();
        assert!(matches!(result, Err(Error::Config { .. })));

        unsafe {
            std::env::remove_var("PROCESSOR_INTERVAL_MS");
        }
    }

    #[test]
    fn domain_policy_falls_back_to_defaults() {
        let mut config = Config::default();
        config.domains.insert(
            "slow.example".to_string(),
            DomainPolicy {
                max_concurrent_chapters: 1,
                inter_chapter_delay_ms: 2000,
            },
        );

        assert_eq!(
            config.domain_policy("slow.example").max_concurrent_chapters,
            1
        );
        assert_eq!(
            config.domain_policy("other.example").max_concurrent_chapters,
            3
        );
    }
}
