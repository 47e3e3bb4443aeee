// # IP Source Trait
//
// Defines the interface for discovering the host's current address.
//
// ## Implementations
//
// - Public lookup services: `pddns-ip-http` crate (plain text and HTML)
// - Routers: `pddns-ip-router` crate (OpenWrt, TP-Link)
//
// ## Usage
//
// ```rust,ignore
// use pddns_core::IpSource;
//
// async fn show(source: &mut dyn IpSource) -> pddns_core::Result<()> {
//     let ip = source.current().await?;
//     println!("{} says {}", source.name(), ip);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Textual IPv4/IPv6 address as reported by a source
///
/// Treated as an opaque comparable token: no parsing happens here, only
/// surrounding whitespace is removed so that `"1.2.3.4\n"` from a plain-text
/// lookup compares equal to `"1.2.3.4"` from a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpAddress(String);

impl IpAddress {
    /// Wrap a textual address, trimming surrounding whitespace
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_string())
    }

    /// Borrow the textual form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the source returned nothing usable
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IpAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for IpAddress {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Trait for IP source implementations
///
/// A source answers one question: what is the address right now. Sources
/// may keep state between calls (router sessions, detected protocol
/// versions), which is why `current` takes `&mut self`; the engine owns its
/// source exclusively.
///
/// Sources must not retry forever or sleep. A failed lookup returns an
/// error and the engine decides when to try again.
#[async_trait]
pub trait IpSource: Send {
    /// Get the current IP address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddress)`: The current address
    /// - `Err(Error)`: If unable to determine it this time
    async fn current(&mut self) -> Result<IpAddress, crate::Error>;

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// Capability-level fallback between two sources
///
/// Each call tries the primary once and, only if it fails, the secondary
/// once. The secondary's error is returned when both fail.
pub struct FallbackIpSource {
    primary: Box<dyn IpSource>,
    secondary: Box<dyn IpSource>,
}

impl FallbackIpSource {
    /// Chain `primary` ahead of `secondary`
    pub fn new(primary: Box<dyn IpSource>, secondary: Box<dyn IpSource>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl IpSource for FallbackIpSource {
    async fn current(&mut self) -> Result<IpAddress, crate::Error> {
        match self.primary.current().await {
            Ok(ip) => Ok(ip),
            Err(e) => {
                warn!(
                    "IP source {} failed ({}), falling back to {}",
                    self.primary.name(),
                    e,
                    self.secondary.name()
                );
                self.secondary.current().await
            }
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

/// Helper trait for constructing IP sources from configuration
pub trait IpSourceFactory: Send + Sync {
    /// Create an IpSource instance from configuration
    fn create(
        &self,
        config: &crate::config::IpSourceConfig,
        engine: &crate::config::EngineConfig,
    ) -> Result<Box<dyn IpSource>, crate::Error>;
}
