//! Configuration types for the DDNS system
//!
//! This module defines all configuration structures used throughout the
//! workspace. The daemon deserializes them from a TOML file; library users
//! can build them directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::retry::RetryLadder;

/// Main DDNS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// Poll interval in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// IP source configuration
    pub ip_source: IpSourceConfig,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl DdnsConfig {
    /// Create a configuration with the given source and provider and
    /// defaults elsewhere
    pub fn new(ip_source: IpSourceConfig, provider: ProviderConfig) -> Self {
        Self {
            interval_secs: default_interval_secs(),
            ip_source,
            provider,
            engine: EngineConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Poll interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("interval_secs must be > 0"));
        }

        self.ip_source.validate()?;
        self.provider.validate()?;
        self.engine.validate()?;
        self.log.validate()?;

        Ok(())
    }
}

/// IP source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpSourceConfig {
    /// Public lookup services: plain-text list first, HTML page second
    Public {
        /// Extra plain-text lookup URLs, tried before the built-in ones
        #[serde(default)]
        extra_urls: Vec<String>,
        /// HTML lookup page override
        #[serde(default)]
        scrape_url: Option<String>,
    },

    /// OpenWrt router (LuCI), protocol version auto-detected
    Openwrt {
        /// Router host or base URL (e.g. "192.168.1.1")
        route: String,
        /// LuCI user
        user: String,
        /// LuCI password
        password: String,
        /// Report the IPv6 address instead of IPv4
        #[serde(default)]
        ipv6: bool,
        /// IPv4 interface name
        #[serde(default = "default_wan_interface")]
        interface: String,
        /// IPv6 interface name
        #[serde(default = "default_wan6_interface")]
        interface6: String,
        /// Session cache file
        #[serde(default = "default_session_file")]
        session_file: String,
    },

    /// TP-Link router web API
    Tplink {
        /// Router base URL (e.g. "http://192.168.0.1/")
        url: String,
        /// Admin password
        password: String,
    },
}

impl IpSourceConfig {
    /// Validate the IP source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IpSourceConfig::Public { extra_urls, .. } => {
                if let Some(url) = extra_urls.iter().find(|u| !is_http_url(u)) {
                    return Err(crate::Error::config(format!(
                        "extra IP lookup URL must use http or https: {}",
                        url
                    )));
                }
                Ok(())
            }
            IpSourceConfig::Openwrt { route, user, .. } => {
                if route.is_empty() {
                    return Err(crate::Error::config("OpenWrt route cannot be empty"));
                }
                if user.is_empty() {
                    return Err(crate::Error::config("OpenWrt user cannot be empty"));
                }
                Ok(())
            }
            IpSourceConfig::Tplink { url, .. } => {
                if !is_http_url(url) {
                    return Err(crate::Error::config(format!(
                        "TP-Link URL must use http or https: {}",
                        url
                    )));
                }
                Ok(())
            }
        }
    }

    /// Get the IP source type name
    pub fn type_name(&self) -> &str {
        match self {
            IpSourceConfig::Public { .. } => "public",
            IpSourceConfig::Openwrt { .. } => "openwrt",
            IpSourceConfig::Tplink { .. } => "tplink",
        }
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        IpSourceConfig::Public {
            extra_urls: Vec::new(),
            scrape_url: None,
        }
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Zone ID to record names
        zones: BTreeMap<String, Vec<String>>,
        /// Record type to manage ("A" or "AAAA")
        #[serde(default = "default_record_type")]
        record_type: String,
        /// Read records but skip writes
        #[serde(default)]
        dry_run: bool,
    },

    /// Hostker provider
    Hostker {
        /// Account email
        email: String,
        /// API token
        token: String,
        /// Domain to record headers
        domains: BTreeMap<String, Vec<String>>,
        /// Record cache lifetime in seconds
        #[serde(default = "default_hostker_cache_ttl_secs")]
        cache_ttl_secs: u64,
    },

    /// Operator-run HTTP endpoint that receives the new address
    CustomUpstream {
        /// URL the address is POSTed to as `{"data": "<ip>"}`
        upstream_url: String,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                zones,
                record_type,
                ..
            } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if record_type != "A" && record_type != "AAAA" {
                    return Err(crate::Error::config(format!(
                        "Cloudflare record_type must be A or AAAA, got {}",
                        record_type
                    )));
                }
                validate_record_map("Cloudflare zone", zones)
            }
            ProviderConfig::Hostker {
                email,
                token,
                domains,
                ..
            } => {
                if email.is_empty() || token.is_empty() {
                    return Err(crate::Error::config(
                        "Hostker email and token cannot be empty",
                    ));
                }
                validate_record_map("Hostker domain", domains)
            }
            ProviderConfig::CustomUpstream { upstream_url } => {
                if !is_http_url(upstream_url) {
                    return Err(crate::Error::config(format!(
                        "custom upstream_url must be an http(s) URL, got '{}'",
                        upstream_url
                    )));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Hostker { .. } => "hostker",
            ProviderConfig::CustomUpstream { .. } => "custom_upstream",
        }
    }
}

fn validate_record_map(
    what: &str,
    map: &BTreeMap<String, Vec<String>>,
) -> Result<(), crate::Error> {
    if map.is_empty() {
        return Err(crate::Error::config(format!("No {} configured", what)));
    }
    for (key, names) in map {
        if names.is_empty() {
            return Err(crate::Error::config(format!(
                "{} {} has no records",
                what, key
            )));
        }
    }
    Ok(())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backoff after a transport timeout (in seconds)
    #[serde(default = "default_timeout_backoff_secs")]
    pub timeout_backoff_secs: u64,

    /// Backoff after a refused or reset connection (in seconds)
    #[serde(default = "default_connection_backoff_secs")]
    pub connection_backoff_secs: u64,

    /// Per-request HTTP timeout (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Provider retry ladder for timeouts (in seconds, strictly decreasing)
    #[serde(default = "default_retry_ladder_secs")]
    pub retry_ladder_secs: Vec<u64>,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("request_timeout_secs must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        self.retry_ladder()?;
        Ok(())
    }

    /// Per-request HTTP timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the provider retry ladder
    pub fn retry_ladder(&self) -> Result<RetryLadder, crate::Error> {
        RetryLadder::from_secs(&self.retry_ladder_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_backoff_secs: default_timeout_backoff_secs(),
            connection_backoff_secs: default_connection_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_ladder_secs: default_retry_ladder_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LogConfig {
    /// Validate the log level
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(crate::Error::config(format!(
                "log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                self.level
            ))),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_interval_secs() -> u64 {
    600
}

fn default_wan_interface() -> String {
    "wan".to_string()
}

fn default_wan6_interface() -> String {
    "wan6".to_string()
}

fn default_session_file() -> String {
    "data/.session".to_string()
}

fn default_record_type() -> String {
    "A".to_string()
}

fn default_hostker_cache_ttl_secs() -> u64 {
    1800
}

fn default_timeout_backoff_secs() -> u64 {
    120
}

fn default_connection_backoff_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_retry_ladder_secs() -> Vec<u64> {
    RetryLadder::DEFAULT_WAITS_SECS.to_vec()
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}
