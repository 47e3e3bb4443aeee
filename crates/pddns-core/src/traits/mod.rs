//! Core traits for the DDNS system
//!
//! - [`IpSource`]: Discover the current address
//! - [`DnsProvider`]: Read and update DNS records via provider APIs

pub mod ip_source;
pub mod dns_provider;

pub use ip_source::{IpSource, IpAddress, FallbackIpSource, IpSourceFactory};
pub use dns_provider::{DnsProvider, DnsRecord, DnsProviderFactory};
