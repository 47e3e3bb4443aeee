// # Router IP Sources
//
// IP sources that ask the local router for its WAN address instead of an
// outside service.
//
// - [`OpenWrtSource`]: LuCI web login, ubus JSON-RPC or the legacy status
//   page, whichever the firmware answers. Session token and detected
//   protocol are cached in a session file.
// - [`TpLinkSource`]: TP-Link web API with encoded credentials.
//
// Both re-login at most once per lookup when the router rejects a cached
// session; a second rejection surfaces as an authentication error.

mod openwrt;
mod tplink;

pub use openwrt::OpenWrtSource;
pub use tplink::{TpLinkSource, encode_password};

use pddns_core::ProviderRegistry;
use pddns_core::config::{EngineConfig, IpSourceConfig};
use pddns_core::session::SessionFile;
use pddns_core::traits::{IpSource, IpSourceFactory};
use pddns_core::{Error, Result};

/// Factory for OpenWrt sources
pub struct OpenWrtFactory;

impl IpSourceFactory for OpenWrtFactory {
    fn create(
        &self,
        config: &IpSourceConfig,
        engine: &EngineConfig,
    ) -> Result<Box<dyn IpSource>> {
        match config {
            IpSourceConfig::Openwrt {
                route,
                user,
                password,
                ipv6,
                interface,
                interface6,
                session_file,
            } => {
                let source = OpenWrtSource::new(
                    route,
                    user.clone(),
                    password.clone(),
                    SessionFile::new(session_file),
                    engine.request_timeout(),
                )?
                .with_ipv6(*ipv6)
                .with_interfaces(interface.clone(), interface6.clone());

                Ok(Box::new(source))
            }
            _ => Err(Error::config("Invalid config for OpenWrt IP source")),
        }
    }
}

/// Factory for TP-Link sources
pub struct TpLinkFactory;

impl IpSourceFactory for TpLinkFactory {
    fn create(
        &self,
        config: &IpSourceConfig,
        engine: &EngineConfig,
    ) -> Result<Box<dyn IpSource>> {
        match config {
            IpSourceConfig::Tplink { url, password } => Ok(Box::new(TpLinkSource::new(
                url,
                password,
                engine.request_timeout(),
            )?)),
            _ => Err(Error::config("Invalid config for TP-Link IP source")),
        }
    }
}

/// Register the router IP sources with a registry
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_ip_source("openwrt", Box::new(OpenWrtFactory));
    registry.register_ip_source("tplink", Box::new(TpLinkFactory));
}
