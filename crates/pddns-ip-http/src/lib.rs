// # Public IP Sources
//
// This crate provides IP sources backed by public lookup services.
//
// ## Sources
//
// - [`SimpleIpSource`]: ordered list of plain-text endpoints, first
//   non-empty 2xx answer wins. Operator-supplied URLs go first.
// - [`ScrapeIpSource`]: an HTML "what is my IP" page, address taken from
//   the page markup.
//
// The `public` factory chains them: plain-text list first, the HTML page
// only as a last resort, one attempt each per cycle. Neither source retries locally; a cycle with
// no answer fails and the engine backs off.

mod scrape;

pub use scrape::{BROWSER_USER_AGENT, DEFAULT_SCRAPE_URL, ScrapeIpSource};

use pddns_core::ProviderRegistry;
use pddns_core::config::{EngineConfig, IpSourceConfig};
use pddns_core::traits::{FallbackIpSource, IpAddress, IpSource, IpSourceFactory};
use pddns_core::transport::{self, ClientOptions};
use pddns_core::{Error, Result};
use tracing::{debug, warn};

/// Built-in plain-text lookup services, in priority order
pub const DEFAULT_LOOKUP_URLS: &[&str] = &[
    "https://api-ipv4.ip.sb/ip",
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
];

/// Plain-text lookup over an ordered URL list
pub struct SimpleIpSource {
    urls: Vec<String>,
    client: reqwest::Client,
}

impl SimpleIpSource {
    /// Use exactly `urls`, in order
    pub fn from_urls(urls: Vec<String>, options: &ClientOptions) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("At least one IP lookup URL is required"));
        }
        Ok(Self {
            urls,
            client: transport::build_client(options)?,
        })
    }

    /// Built-in services with `overrides` taking priority
    pub fn with_overrides(overrides: &[String], options: &ClientOptions) -> Result<Self> {
        Self::from_urls(merge_urls(overrides, DEFAULT_LOOKUP_URLS), options)
    }

    /// The effective lookup order
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    async fn fetch(&self, url: &str) -> Result<IpAddress> {
        let operation = format!("IP lookup {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport::classify(&operation, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("{}: status {}", operation, status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport::classify(&operation, e))?;

        let ip = IpAddress::new(text);
        if ip.is_empty() {
            return Err(Error::ip_source(format!("{}: empty response", operation)));
        }
        Ok(ip)
    }
}

#[async_trait::async_trait]
impl IpSource for SimpleIpSource {
    async fn current(&mut self) -> Result<IpAddress> {
        let mut last_error = None;

        for url in &self.urls {
            match self.fetch(url).await {
                Ok(ip) => {
                    debug!("{} answered {}", url, ip);
                    return Ok(ip);
                }
                Err(e) => {
                    warn!("IP lookup via {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(Error::ip_source(format!(
            "all {} lookup services failed (last error: {})",
            self.urls.len(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// Overrides first, then defaults, first occurrence wins
fn merge_urls(overrides: &[String], defaults: &[&str]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::with_capacity(overrides.len() + defaults.len());
    let mut push = |url: &str| {
        let url = url.trim();
        if !url.is_empty() && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    };

    overrides.iter().for_each(|url| push(url));
    defaults.iter().for_each(|url| push(url));
    urls
}

/// Factory for the `public` IP source chain
pub struct PublicFactory;

impl IpSourceFactory for PublicFactory {
    fn create(
        &self,
        config: &IpSourceConfig,
        engine: &EngineConfig,
    ) -> Result<Box<dyn IpSource>> {
        match config {
            IpSourceConfig::Public {
                extra_urls,
                scrape_url,
            } => {
                let options = ClientOptions::with_timeout(engine.request_timeout());
                let simple = SimpleIpSource::with_overrides(extra_urls, &options)?;
                let scrape = ScrapeIpSource::new(
                    scrape_url.as_deref().unwrap_or(DEFAULT_SCRAPE_URL),
                    engine.request_timeout(),
                )?;

                Ok(Box::new(FallbackIpSource::new(
                    Box::new(simple),
                    Box::new(scrape),
                )))
            }
            _ => Err(Error::config("Invalid config for public IP source")),
        }
    }
}

/// Register the public IP source with a registry
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_ip_source("public", Box::new(PublicFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> ClientOptions {
        ClientOptions::with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn overrides_go_first_without_duplicates() {
        let overrides = vec![
            "https://ip.example.net/".to_string(),
            "https://api.ipify.org".to_string(),
            "  ".to_string(),
        ];
        let source = SimpleIpSource::with_overrides(&overrides, &options()).unwrap();
        assert_eq!(
            source.urls(),
            [
                "https://ip.example.net/",
                "https://api.ipify.org",
                "https://api-ipv4.ip.sb/ip",
                "https://ifconfig.me/ip",
            ]
        );
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(SimpleIpSource::from_urls(Vec::new(), &options()).is_err());
    }

    #[tokio::test]
    async fn first_successful_service_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_string("\n"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7\n"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/never"))
            .respond_with(ResponseTemplate::new(200).set_body_string("198.51.100.1"))
            .expect(0)
            .mount(&server)
            .await;

        let urls = ["/broken", "/empty", "/ip", "/never"]
            .iter()
            .map(|p| format!("{}{}", server.uri(), p))
            .collect();
        let mut source = SimpleIpSource::from_urls(urls, &options()).unwrap();

        assert_eq!(source.current().await.unwrap().as_str(), "203.0.113.7");
    }

    #[tokio::test]
    async fn all_services_failing_is_one_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let urls = vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())];
        let mut source = SimpleIpSource::from_urls(urls, &options()).unwrap();

        let err = source.current().await.unwrap_err();
        assert!(matches!(err, Error::IpSource(_)));
        assert!(err.to_string().contains("all 2 lookup services failed"));
    }

    #[test]
    fn factory_builds_public_chain() {
        let config = IpSourceConfig::Public {
            extra_urls: vec!["https://ip.example.net/".to_string()],
            scrape_url: None,
        };
        let source = PublicFactory
            .create(&config, &EngineConfig::default())
            .unwrap();
        assert_eq!(source.name(), "fallback");
    }

    #[tokio::test]
    async fn public_chain_prefers_plain_text_services() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(0)
            .mount(&server)
            .await;

        let config = IpSourceConfig::Public {
            extra_urls: vec![format!("{}/ip", server.uri())],
            scrape_url: Some(format!("{}/page", server.uri())),
        };
        let mut source = PublicFactory
            .create(&config, &EngineConfig::default())
            .unwrap();

        assert_eq!(source.current().await.unwrap().as_str(), "203.0.113.7");
    }

    #[test]
    fn factory_rejects_router_config() {
        let config = IpSourceConfig::Tplink {
            url: "http://192.168.0.1/".to_string(),
            password: "pw".to_string(),
        };
        assert!(PublicFactory.create(&config, &EngineConfig::default()).is_err());
    }
}
