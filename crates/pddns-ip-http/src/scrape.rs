//! HTML lookup page source

use pddns_core::traits::{IpAddress, IpSource};
use pddns_core::transport::{self, ClientOptions};
use pddns_core::{Error, Result};
use regex::Regex;
use std::time::Duration;
use tracing::debug;

/// Default HTML lookup page
pub const DEFAULT_SCRAPE_URL: &str = "https://ipip.net/";

/// The page serves a reduced document to unknown clients
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_9_3) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/35.0.1916.47 Safari/537.36";

/// First link text inside the element carrying the `yourInfo` class
const YOUR_INFO_PATTERN: &str =
    r#"(?s)class="[^"]*\byourInfo\b[^"]*".*?<li[^>]*>.*?<a[^>]*>\s*([^<]*?)\s*</a>"#;

/// Address scraped from an HTML lookup page
pub struct ScrapeIpSource {
    url: String,
    client: reqwest::Client,
    pattern: Regex,
}

impl ScrapeIpSource {
    /// Create a scraper for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let options = ClientOptions {
            user_agent: Some(BROWSER_USER_AGENT.to_string()),
            ..ClientOptions::with_timeout(timeout)
        };
        let pattern = Regex::new(YOUR_INFO_PATTERN)
            .map_err(|e| Error::config(format!("Invalid scrape pattern: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client: transport::build_client(&options)?,
            pattern,
        })
    }

    /// Pull the address out of a page body
    pub fn extract(&self, html: &str) -> Option<IpAddress> {
        self.pattern
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| IpAddress::new(m.as_str()))
            .filter(|ip| !ip.is_empty())
    }
}

#[async_trait::async_trait]
impl IpSource for ScrapeIpSource {
    async fn current(&mut self) -> Result<IpAddress> {
        let operation = format!("IP scrape {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| transport::classify(&operation, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("{}: status {}", operation, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport::classify(&operation, e))?;

        let ip = self.extract(&body).ok_or_else(|| {
            Error::ip_source(format!("{}: no address found in page", operation))
        })?;
        debug!("{} answered {}", self.url, ip);
        Ok(ip)
    }

    fn name(&self) -> &'static str {
        "scrape"
    }
}
