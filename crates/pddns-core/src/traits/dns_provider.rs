// # DNS Provider Trait
//
// Defines the interface for reading and updating DNS records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `pddns-provider-cloudflare` crate
// - Hostker: `pddns-provider-hostker` crate
//
// ## Usage
//
// ```rust,ignore
// use pddns_core::{DnsProvider, IpAddress};
//
// async fn push(provider: &mut dyn DnsProvider, ip: &IpAddress) -> pddns_core::Result<()> {
//     for record in provider.enumerate_records().await? {
//         if &record.content != ip {
//             provider.update_record(&record, ip).await?;
//         }
//     }
//     Ok(())
// }
// ```

use crate::traits::ip_source::IpAddress;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One DNS entry managed by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// The record ID (provider-specific)
    pub id: String,
    /// Zone ID (Cloudflare) or domain (Hostker)
    pub zone: String,
    /// Record name (Cloudflare) or header (Hostker)
    pub name: String,
    /// Current content, the tracked address
    pub content: IpAddress,
    /// Time-to-live for the record
    pub ttl: u32,
    /// Cloudflare proxy flag, `None` for providers without one
    pub proxied: Option<bool>,
}

/// Trait for DNS provider implementations
///
/// A provider enumerates the configured records with their current content
/// and applies content updates. It does not decide whether an update is
/// needed; the engine compares and dispatches.
///
/// # Retries
///
/// Providers wrap their transport calls in the shared
/// [`RetryLadder`](crate::retry::RetryLadder), which retries timeouts only.
/// Everything else is returned to the engine.
///
/// # Caching
///
/// Providers may cache `enumerate_records` results. [`invalidate_cache`]
/// is called by the engine after a reload request and must force the next
/// enumeration to hit the remote.
///
/// [`invalidate_cache`]: DnsProvider::invalidate_cache
#[async_trait]
pub trait DnsProvider: Send {
    /// Fetch the current state of every configured record
    async fn enumerate_records(&mut self) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Point `record` at `new_ip`
    async fn update_record(
        &mut self,
        record: &DnsRecord,
        new_ip: &IpAddress,
    ) -> Result<(), crate::Error>;

    /// Drop any cached record state
    fn invalidate_cache(&mut self) {}

    /// Release transport resources before shutdown
    async fn close(&mut self) -> Result<(), crate::Error> {
        Ok(())
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
        engine: &crate::config::EngineConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
