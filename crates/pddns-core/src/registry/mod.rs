//! Factory registry for DNS providers and IP sources
//!
//! Implementation crates register a factory under the configuration type
//! name they handle; the daemon then builds whatever the config selects
//! without knowing the concrete types.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pddns_core::registry::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! pddns_provider_cloudflare::register(&mut registry);
//! pddns_ip_http::register(&mut registry);
//!
//! let provider = registry.create_provider(&config.provider, &config.engine)?;
//! let source = registry.create_ip_source(&config.ip_source, &config.engine)?;
//! ```

use crate::config::{EngineConfig, IpSourceConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, IpSource, IpSourceFactory};
use std::collections::HashMap;

/// Registry mapping configuration type names to factories
///
/// Filled once at startup, read-only afterwards.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn DnsProviderFactory>>,
    ip_sources: HashMap<String, Box<dyn IpSourceFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name as used in `[provider] type = ...`
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(
        &mut self,
        name: impl Into<String>,
        factory: Box<dyn DnsProviderFactory>,
    ) {
        self.providers.insert(name.into(), factory);
    }

    /// Register an IP source factory
    ///
    /// # Parameters
    ///
    /// - `name`: IP source type name as used in `[ip_source] type = ...`
    /// - `factory`: Factory object for creating IP source instances
    pub fn register_ip_source(
        &mut self,
        name: impl Into<String>,
        factory: Box<dyn IpSourceFactory>,
    ) {
        self.ip_sources.insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub fn create_provider(
        &self,
        config: &ProviderConfig,
        engine: &EngineConfig,
    ) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let factory = self
            .providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config, engine)
    }

    /// Create an IP source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn IpSource>)`: Created IP source instance
    /// - `Err(Error)`: If source type is not registered or creation fails
    pub fn create_ip_source(
        &self,
        config: &IpSourceConfig,
        engine: &EngineConfig,
    ) -> Result<Box<dyn IpSource>> {
        let source_type = config.type_name();
        let factory = self
            .ip_sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown IP source type: {}", source_type)))?;

        factory.create(config, engine)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// List all registered IP source types
    pub fn list_ip_sources(&self) -> Vec<String> {
        let mut names: Vec<_> = self.ip_sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Check if an IP source type is registered
    pub fn has_ip_source(&self, name: &str) -> bool {
        self.ip_sources.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct MockProviderFactory;

    impl DnsProviderFactory for MockProviderFactory {
        fn create(
            &self,
            _config: &ProviderConfig,
            _engine: &EngineConfig,
        ) -> Result<Box<dyn DnsProvider>> {
            Err(Error::not_found("Mock provider not implemented"))
        }
    }

    fn hostker() -> ProviderConfig {
        ProviderConfig::Hostker {
            email: "me@example.com".to_string(),
            token: "t".to_string(),
            domains: BTreeMap::from([("example.com".to_string(), vec!["home".to_string()])]),
            cache_ttl_secs: 1800,
        }
    }

    #[test]
    fn registration_is_keyed_by_type_name() {
        let mut registry = ProviderRegistry::new();
        assert!(!registry.has_provider("hostker"));

        registry.register_provider("hostker", Box::new(MockProviderFactory));

        assert!(registry.has_provider("hostker"));
        assert_eq!(registry.list_providers(), vec!["hostker".to_string()]);
        // Factory was reached: its own error comes back
        assert!(matches!(
            registry.create_provider(&hostker(), &EngineConfig::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn unknown_types_are_config_errors() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.create_provider(&hostker(), &EngineConfig::default()),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            registry.create_ip_source(&IpSourceConfig::default(), &EngineConfig::default()),
            Err(Error::Config(_))
        ));
    }
}
