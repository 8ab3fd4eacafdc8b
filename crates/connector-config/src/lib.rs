//! Typed configuration for the connector daemon (C13), loaded once at
//! startup from a TOML file and overridable by `CONNECTOR_`-prefixed
//! environment variables.

use std::path::PathBuf;

use cidr::IpCidr;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("loading configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub dashboard_port: Option<u16>,
    #[serde(default)]
    pub secure: bool,
    /// Clients whose address resolves into one of these blocks are fully
    /// trusted and bypass the authorization gate.
    #[serde(default = "ServerConfig::default_full_access_hosts")]
    pub full_access_hosts: Vec<IpCidr>,
    #[serde(default)]
    pub use_compression: bool,
    #[serde(default = "ServerConfig::default_watchdog_timeout_secs")]
    pub watchdog_timeout_secs: u64,
    #[serde(default = "ServerConfig::default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "ServerConfig::default_base_url")]
    pub base_url: String,
}

impl ServerConfig {
    fn default_port() -> u16 {
        8000
    }
    fn default_full_access_hosts() -> Vec<IpCidr> {
        vec![
            IpCidr::new("127.0.0.1".parse().unwrap(), 32).unwrap(),
            IpCidr::new("::1".parse().unwrap(), 128).unwrap(),
        ]
    }
    fn default_watchdog_timeout_secs() -> u64 {
        30
    }
    fn default_shutdown_grace_secs() -> u64 {
        10
    }
    fn default_base_url() -> String {
        "/doc/".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            dashboard_port: None,
            secure: false,
            full_access_hosts: Self::default_full_access_hosts(),
            use_compression: false,
            watchdog_timeout_secs: Self::default_watchdog_timeout_secs(),
            shutdown_grace_secs: Self::default_shutdown_grace_secs(),
            base_url: Self::default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct GsaConfig {
    #[serde(default = "GsaConfig::default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub admin_hostname: Option<String>,
    /// Port the appliance's feed endpoint (`/xmlfeed`, `/xmlgroups`)
    /// listens on; 19900 is the appliance's standard feed port.
    #[serde(default = "GsaConfig::default_feed_port")]
    pub feed_port: u16,
}

impl GsaConfig {
    fn default_hostname() -> String {
        "localhost".to_string()
    }
    fn default_feed_port() -> u16 {
        19900
    }

    /// The feed endpoint URL used for `feedtype=metadata-and-url` and
    /// `feedtype=incremental` pushes.
    pub fn feed_url(&self) -> String {
        format!("http://{}:{}/xmlfeed", self.hostname, self.feed_port)
    }

    /// The feed endpoint URL used for group-definition pushes (C9).
    pub fn groups_url(&self) -> String {
        format!("http://{}:{}/xmlgroups", self.hostname, self.feed_port)
    }
}

impl Default for GsaConfig {
    fn default() -> Self {
        Self {
            hostname: Self::default_hostname(),
            admin_hostname: None,
            feed_port: Self::default_feed_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FeedConfig {
    #[serde(default = "FeedConfig::default_name")]
    pub name: String,
    #[serde(default)]
    pub group_source: Option<String>,
    #[serde(default = "FeedConfig::default_max_urls")]
    pub max_urls: usize,
    #[serde(default = "FeedConfig::default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub mark_all_docs_as_public: bool,
    #[serde(default = "FeedConfig::default_appliance_version_major")]
    pub appliance_version_major: u8,
    #[serde(default)]
    pub appliance_version_minor: u8,
}

impl FeedConfig {
    fn default_name() -> String {
        "default-datasource".to_string()
    }
    fn default_max_urls() -> usize {
        1000
    }
    fn default_queue_capacity() -> usize {
        4096
    }
    fn default_appliance_version_major() -> u8 {
        7
    }

    /// The name under which group membership feeds are sent, defaulting
    /// to the content datasource's name when not set separately.
    pub fn effective_group_source(&self) -> &str {
        self.group_source.as_deref().unwrap_or(&self.name)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            group_source: None,
            max_urls: Self::default_max_urls(),
            queue_capacity: Self::default_queue_capacity(),
            mark_all_docs_as_public: false,
            appliance_version_major: Self::default_appliance_version_major(),
            appliance_version_minor: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AdaptorConfig {
    #[serde(default)]
    pub push_doc_ids_on_startup: bool,
    #[serde(default)]
    pub full_listing_schedule: Option<String>,
    #[serde(default = "AdaptorConfig::default_incremental_poll_period_secs")]
    pub incremental_poll_period_secs: u64,
    #[serde(default = "AdaptorConfig::default_group_push_period_secs")]
    pub group_push_period_secs: u64,
}

impl AdaptorConfig {
    fn default_incremental_poll_period_secs() -> u64 {
        300
    }

    fn default_group_push_period_secs() -> u64 {
        3600
    }
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        Self {
            push_doc_ids_on_startup: false,
            full_listing_schedule: None,
            incremental_poll_period_secs: Self::default_incremental_poll_period_secs(),
            group_push_period_secs: Self::default_group_push_period_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct TransformConfig {
    #[serde(default = "TransformConfig::default_max_document_bytes")]
    pub max_document_bytes: usize,
    #[serde(default)]
    pub required: bool,
}

impl TransformConfig {
    fn default_max_document_bytes() -> usize {
        10 * 1024 * 1024
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: Self::default_max_document_bytes(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct JournalConfig {
    #[serde(default = "JournalConfig::default_second_bucket_count")]
    pub second_bucket_count: u8,
    #[serde(default = "JournalConfig::default_minute_bucket_count")]
    pub minute_bucket_count: u8,
    #[serde(default = "JournalConfig::default_half_hour_bucket_count")]
    pub half_hour_bucket_count: u8,
}

impl JournalConfig {
    fn default_second_bucket_count() -> u8 {
        60
    }
    fn default_minute_bucket_count() -> u8 {
        60
    }
    fn default_half_hour_bucket_count() -> u8 {
        48
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            second_bucket_count: Self::default_second_bucket_count(),
            minute_bucket_count: Self::default_minute_bucket_count(),
            half_hour_bucket_count: Self::default_half_hour_bucket_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "RetryConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "RetryConfig::default_backoff_unit_secs")]
    pub backoff_unit_secs: u64,
}

impl RetryConfig {
    fn default_max_attempts() -> u32 {
        12
    }
    fn default_backoff_unit_secs() -> u64 {
        5
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            backoff_unit_secs: Self::default_backoff_unit_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
    #[serde(default = "LoggingConfig::default_filter")]
    pub filter: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_format() -> String {
        "full".to_string()
    }
    fn default_filter() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: Self::default_format(),
            filter: Self::default_filter(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gsa: GsaConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub adaptor: AdaptorConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from `path`, then apply `CONNECTOR_`-prefixed
    /// environment overrides (e.g. `CONNECTOR_SERVER__PORT=9000`).
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .add_source(config::Environment::with_prefix("CONNECTOR").separator("__"))
            .build()?;
        let config: Config = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.max_urls == 0 {
            return Err(ConfigError::Validation(
                "feed.maxUrls must be greater than 0".to_string(),
            ));
        }
        if self.feed.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "feed.queueCapacity must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.maxAttempts must be greater than 0".to_string(),
            ));
        }
        if self.journal.second_bucket_count == 0
            || self.journal.minute_bucket_count == 0
            || self.journal.half_hour_bucket_count == 0
        {
            return Err(ConfigError::Validation(
                "journal bucket counts must all be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.journal.half_hour_bucket_count, 48);
    }

    #[test]
    fn toml_round_trip_applies_defaults_to_missing_sections() {
        let toml = r#"
[gsa]
hostname = "search.example.com"

[feed]
name = "my-repo"
maxUrls = 500
"#;
        let built = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let config: Config = built.try_deserialize().unwrap();
        assert_eq!(config.gsa.hostname, "search.example.com");
        assert_eq!(config.feed.name, "my-repo");
        assert_eq!(config.feed.max_urls, 500);
        // untouched sections fall back to their defaults
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.retry.max_attempts, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_max_urls_fails_validation() {
        let mut config = Config::default();
        config.feed.max_urls = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn default_trust_list_covers_loopback() {
        let config = Config::default();
        assert_eq!(config.server.full_access_hosts.len(), 2);
        assert!(config.server.full_access_hosts[0].contains(&"127.0.0.1".parse::<std::net::IpAddr>().unwrap()));
    }

    #[test]
    fn feed_url_defaults_to_standard_feed_port() {
        let config = Config::default();
        assert_eq!(config.gsa.feed_url(), "http://localhost:19900/xmlfeed");
        assert_eq!(config.gsa.groups_url(), "http://localhost:19900/xmlgroups");
    }

    #[test]
    fn effective_group_source_falls_back_to_feed_name() {
        let mut config = Config::default();
        config.feed.name = "acme-docs".to_string();
        assert_eq!(config.feed.effective_group_source(), "acme-docs");
        config.feed.group_source = Some("acme-groups".to_string());
        assert_eq!(config.feed.effective_group_source(), "acme-groups");
    }
}
