// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare DNS provider for the passive DDNS
// updater.
//
// ## Behaviour
//
// - Enumerates every configured (zone, name) pair with one list call each
// - Updates with a full-record PUT (type, name, content, proxied, ttl); the
//   API has no partial update for these fields
// - Wraps each transport call in the shared retry ladder (timeouts only)
// - Dry-run mode performs the reads, logs the PUT body and skips the write
//
// ## Security
//
// - The API token never appears in logs or `Debug` output
// - An empty token is rejected at construction
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=...&name=...`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use pddns_core::config::{EngineConfig, ProviderConfig};
use pddns_core::retry::RetryLadder;
use pddns_core::traits::{DnsProvider, DnsProviderFactory, DnsRecord, IpAddress};
use pddns_core::transport::{self, ClientOptions};
use pddns_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Standard v4 response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    name: String,
    content: String,
    ttl: u32,
    #[serde(default)]
    proxied: bool,
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests
/// - Log the intended PUT payload
/// - **NOT** modify DNS records
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API root, overridable for tests
    api_base: String,

    /// "A" or "AAAA"
    record_type: String,

    /// Zone ID to record names
    zones: BTreeMap<String, Vec<String>>,

    /// Timeout retry ladder around each call
    retry: RetryLadder,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip PUT updates
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("record_type", &self.record_type)
            .field("zones", &self.zones)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `record_type`: "A" or "AAAA"
    /// - `zones`: zone ID to the record names managed in it
    /// - `dry_run`: If true, perform GET requests but skip PUT updates
    /// - `timeout`: per-request timeout
    pub fn new(
        api_token: impl Into<String>,
        record_type: impl Into<String>,
        zones: BTreeMap<String, Vec<String>>,
        dry_run: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        Ok(Self {
            api_token,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            record_type: record_type.into(),
            zones,
            retry: RetryLadder::default(),
            client: transport::build_client(&ClientOptions::with_timeout(timeout))?,
            dry_run,
        })
    }

    /// Point the provider at another API root
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the timeout retry ladder
    pub fn with_retry_ladder(mut self, retry: RetryLadder) -> Self {
        self.retry = retry;
        self
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Look up one record by name
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=A&name=home.example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn lookup_record(&self, zone_id: &str, name: &str) -> Result<DnsRecord> {
        tracing::debug!("Looking up record {} (type: {})", name, self.record_type);

        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .query(&[("type", self.record_type.as_str()), ("name", name)]);

        let records: Vec<ApiRecord> = self.send(request, "list records").await?;

        let record = records.into_iter().next().ok_or_else(|| {
            Error::not_found(format!(
                "DNS record not found: {} (type: {})",
                name, self.record_type
            ))
        })?;

        Ok(DnsRecord {
            id: record.id,
            zone: zone_id.to_string(),
            name: record.name,
            content: IpAddress::new(record.content),
            ttl: record.ttl,
            proxied: Some(record.proxied),
        })
    }

    /// Replace a record with its full representation
    ///
    /// # API Call
    ///
    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// {"type": "A", "name": "...", "content": "1.2.3.4", "proxied": false, "ttl": 1}
    /// ```
    async fn put_record(&self, record: &DnsRecord, new_ip: &IpAddress) -> Result<()> {
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, record.zone, record.id
        );
        let payload = serde_json::json!({
            "type": self.record_type,
            "name": record.name,
            "content": new_ip.as_str(),
            "proxied": record.proxied.unwrap_or(false),
            "ttl": record.ttl,
        });

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT request to {} with payload: {}",
                url,
                payload
            );
            return Ok(());
        }

        let request = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&payload);

        let _: serde_json::Value = self.send(request, "update record").await?;
        Ok(())
    }

    /// Send a request and unwrap the v4 envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| transport::classify(&format!("cloudflare {}", operation), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = transport::error_body(response).await;
            return Err(transport::status_error(
                "cloudflare",
                operation,
                status.as_u16(),
                &body,
            ));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("Failed to parse {} response: {}", operation, e))
        })?;

        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|m| format!("{} ({})", m.message, m.code))
                .collect();
            return Err(Error::provider(
                "cloudflare",
                format!("{} rejected: {}", operation, messages.join("; ")),
            ));
        }

        envelope.result.ok_or_else(|| {
            Error::provider("cloudflare", format!("{} response has no result", operation))
        })
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn enumerate_records(&mut self) -> Result<Vec<DnsRecord>> {
        let mut records = Vec::new();
        for (zone_id, names) in &self.zones {
            for name in names {
                let record = self
                    .retry
                    .run("cloudflare list records", || self.lookup_record(zone_id, name))
                    .await?;
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn update_record(&mut self, record: &DnsRecord, new_ip: &IpAddress) -> Result<()> {
        let managed = self
            .zones
            .get(&record.zone)
            .is_some_and(|names| names.iter().any(|n| n.eq_ignore_ascii_case(&record.name)));
        if !managed {
            return Err(Error::fatal(format!(
                "cloudflare: refusing to update unmanaged record {} in zone {}",
                record.name, record.zone
            )));
        }

        tracing::info!(
            "{} Cloudflare DNS record: {} -> {} (was: {})",
            if self.dry_run { "Would update" } else { "Updating" },
            record.name,
            new_ip,
            record.content
        );

        self.retry
            .run("cloudflare update record", || self.put_record(record, new_ip))
            .await
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(
        &self,
        config: &ProviderConfig,
        engine: &EngineConfig,
    ) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zones,
                record_type,
                dry_run,
            } => {
                // The environment can force dry-run on top of the config file
                let dry_run = *dry_run
                    || std::env::var("PDDNS_MODE")
                        .unwrap_or_default()
                        .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                let provider = CloudflareProvider::new(
                    api_token.clone(),
                    record_type.clone(),
                    zones.clone(),
                    dry_run,
                    engine.request_timeout(),
                )?
                .with_retry_ladder(engine.retry_ladder()?);

                Ok(Box::new(provider))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use pddns_core::ProviderRegistry;
///
/// let mut registry = ProviderRegistry::new();
/// pddns_provider_cloudflare::register(&mut registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &mut pddns_core::ProviderRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn zones() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([
            (
                "zone-a".to_string(),
                vec!["home.example.com".to_string(), "nas.example.com".to_string()],
            ),
            ("zone-b".to_string(), vec!["example.org".to_string()]),
        ])
    }

    fn provider(server: &MockServer, dry_run: bool) -> CloudflareProvider {
        CloudflareProvider::new("secret_token_12345", "A", zones(), dry_run, Duration::from_secs(5))
            .unwrap()
            .with_api_base(server.uri())
    }

    fn listing(id: &str, name: &str, content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "result": [{
                "id": id,
                "name": name,
                "type": "A",
                "content": content,
                "ttl": 1,
                "proxied": true
            }]
        }))
    }

    fn record() -> DnsRecord {
        DnsRecord {
            id: "rec-1".to_string(),
            zone: "zone-a".to_string(),
            name: "home.example.com".to_string(),
            content: IpAddress::from("1.2.3.0"),
            ttl: 1,
            proxied: Some(true),
        }
    }

    #[test]
    fn test_empty_token_is_rejected() {
        let result = CloudflareProvider::new("", "A", zones(), false, Duration::from_secs(5));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider =
            CloudflareProvider::new("secret_token_12345", "A", zones(), false, Duration::from_secs(5))
                .unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[test]
    fn test_factory_creation() {
        let config = ProviderConfig::Cloudflare {
            api_token: "test_token".to_string(),
            zones: zones(),
            record_type: "A".to_string(),
            dry_run: false,
        };

        let provider = CloudflareFactory.create(&config, &EngineConfig::default());
        assert!(provider.is_ok());
    }

    #[test]
    fn test_factory_missing_token() {
        let config = ProviderConfig::Cloudflare {
            api_token: String::new(),
            zones: zones(),
            record_type: "A".to_string(),
            dry_run: false,
        };

        assert!(CloudflareFactory.create(&config, &EngineConfig::default()).is_err());
    }

    #[tokio::test]
    async fn enumerates_every_configured_name() {
        let server = MockServer::start().await;
        for (zone, id, name, content) in [
            ("zone-a", "rec-1", "home.example.com", "1.2.3.0"),
            ("zone-a", "rec-2", "nas.example.com", "1.2.3.0"),
            ("zone-b", "rec-3", "example.org", "1.2.3.4"),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/zones/{}/dns_records", zone)))
                .and(query_param("type", "A"))
                .and(query_param("name", name))
                .and(header("authorization", "Bearer secret_token_12345"))
                .respond_with(listing(id, name, content))
                .expect(1)
                .mount(&server)
                .await;
        }

        let mut provider = provider(&server, false);
        let records = provider.enumerate_records().await.unwrap();

        let summary: Vec<_> = records
            .iter()
            .map(|r| (r.zone.as_str(), r.id.as_str(), r.content.as_str()))
            .collect();
        assert_eq!(
            summary,
            [
                ("zone-a", "rec-1", "1.2.3.0"),
                ("zone-a", "rec-2", "1.2.3.0"),
                ("zone-b", "rec-3", "1.2.3.4"),
            ]
        );
        assert!(records.iter().all(|r| r.proxied == Some(true)));
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": []
            })))
            .mount(&server)
            .await;

        let mut provider = provider(&server, false);
        assert!(matches!(
            provider.enumerate_records().await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_sends_full_record() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/zones/zone-a/dns_records/rec-1"))
            .and(body_json(json!({
                "type": "A",
                "name": "home.example.com",
                "content": "1.2.3.4",
                "proxied": true,
                "ttl": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": {"id": "rec-1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut provider = provider(&server, false);
        provider
            .update_record(&record(), &IpAddress::from("1.2.3.4"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unmanaged_record_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut provider = provider(&server, false);
        let mut stray = record();
        stray.name = "other.example.com".to_string();

        let err = provider
            .update_record(&stray, &IpAddress::from("1.2.3.4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FatalInvariant(_)));
    }

    #[tokio::test]
    async fn dry_run_skips_the_write() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut provider = provider(&server, true);
        assert!(provider.is_dry_run());
        provider
            .update_record(&record(), &IpAddress::from("1.2.3.4"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn api_rejection_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errors": [{"code": 9005, "message": "Content for A record is invalid."}],
                "result": null
            })))
            .mount(&server)
            .await;

        let mut provider = provider(&server, false);
        let err = provider
            .update_record(&record(), &IpAddress::from("not-an-ip"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Content for A record is invalid"));
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let mut provider = provider(&server, false);
        assert!(matches!(
            provider.enumerate_records().await,
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn timeouts_walk_the_ladder() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .expect(3)
            .mount(&server)
            .await;

        let mut provider =
            CloudflareProvider::new("token", "A", zones(), false, Duration::from_millis(200))
                .unwrap()
                .with_api_base(server.uri())
                .with_retry_ladder(
                    RetryLadder::new(vec![Duration::from_millis(20), Duration::ZERO]).unwrap(),
                );

        let err = provider
            .update_record(&record(), &IpAddress::from("1.2.3.4"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
