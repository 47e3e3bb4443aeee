// # Hostker DNS Provider
//
// Form-encoded RPC client for the Hostker DNS API.
//
// ## Behaviour
//
// - `dnsGetRecords` is called once per configured domain; records are kept
//   when their header is one of the configured headers
// - `dnsEditRecord` replaces the record data, keeping its TTL
// - The enumerated set is cached for `cache_ttl`. A reload drops the cache;
//   a successful edit patches the cached entry in place
// - Transport calls go through the shared retry ladder (timeouts only)
//
// Every call carries the account email and token as form fields. The token
// never appears in logs or `Debug` output.

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
use tokio::time::Instant;
use tracing::{debug, info};

/// Hostker API root
pub const HOSTKER_API_BASE: &str = "https://i.hostker.com/api/";

/// Default lifetime of the cached record set
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(1800);

/// Hostker sends ids as numbers on some endpoints and strings on others
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordId {
    Number(i64),
    Text(String),
}

impl RecordId {
    fn into_string(self) -> String {
        match self {
            RecordId::Number(n) => n.to_string(),
            RecordId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HostkerRecord {
    id: RecordId,
    header: String,
    data: String,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct RecordList {
    #[serde(default)]
    records: Vec<HostkerRecord>,
}

#[derive(Debug, Deserialize)]
struct Ack {}

#[derive(Debug, Deserialize)]
struct Status {
    success: i64,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

struct CachedRecords {
    fetched_at: Instant,
    records: Vec<DnsRecord>,
}

/// Hostker DNS provider
pub struct HostkerProvider {
    email: String,
    /// ⚠️ NEVER log this value
    token: String,
    api_base: String,
    /// Domain to the record headers managed in it
    domains: BTreeMap<String, Vec<String>>,
    cache_ttl: Duration,
    cache: Option<CachedRecords>,
    retry: RetryLadder,
    client: reqwest::Client,
}

impl std::fmt::Debug for HostkerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostkerProvider")
            .field("email", &self.email)
            .field("token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("domains", &self.domains)
            .field("cache_ttl", &self.cache_ttl)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl HostkerProvider {
    /// Create a provider for the account identified by `email` and `token`
    pub fn new(
        email: impl Into<String>,
        token: impl Into<String>,
        domains: BTreeMap<String, Vec<String>>,
        timeout: Duration,
    ) -> Result<Self> {
        let email = email.into();
        let token = token.into();
        if email.is_empty() || token.is_empty() {
            return Err(Error::config("Hostker email and token cannot be empty"));
        }

        Ok(Self {
            email,
            token,
            api_base: HOSTKER_API_BASE.to_string(),
            domains,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: None,
            retry: RetryLadder::default(),
            client: transport::build_client(&ClientOptions::with_timeout(timeout))?,
        })
    }

    /// Point the provider at another API root
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let mut base = api_base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.api_base = base;
        self
    }

    /// How long an enumerated record set is served from memory
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Replace the timeout retry ladder
    pub fn with_retry_ladder(mut self, retry: RetryLadder) -> Self {
        self.retry = retry;
        self
    }

    /// Whether the next enumeration will be answered from memory
    pub fn is_cache_fresh(&self) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|c| c.fetched_at.elapsed() < self.cache_ttl)
    }

    async fn fetch_domain(&self, domain: &str, headers: &[String]) -> Result<Vec<DnsRecord>> {
        let list: RecordList = self
            .call("dnsGetRecords", &[("domain", domain.to_string())])
            .await?;

        if let Some(missing) = headers
            .iter()
            .find(|h| !list.records.iter().any(|r| &r.header == *h))
        {
            return Err(Error::not_found(format!(
                "hostker: no record {} in {}",
                missing, domain
            )));
        }

        Ok(list
            .records
            .into_iter()
            .filter(|r| headers.contains(&r.header))
            .map(|r| DnsRecord {
                id: r.id.into_string(),
                zone: domain.to_string(),
                name: r.header,
                content: IpAddress::new(r.data),
                ttl: r.ttl,
                proxied: None,
            })
            .collect())
    }

    async fn edit(&self, record: &DnsRecord, new_ip: &IpAddress) -> Result<()> {
        let _: Ack = self
            .call(
                "dnsEditRecord",
                &[
                    ("id", record.id.clone()),
                    ("data", new_ip.to_string()),
                    ("ttl", record.ttl.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    /// POST one RPC and check the `success` flag
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.api_base, operation);
        let mut form: Vec<(&str, &str)> = vec![
            ("email", self.email.as_str()),
            ("token", self.token.as_str()),
        ];
        form.extend(params.iter().map(|(k, v)| (*k, v.as_str())));

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| transport::classify(&format!("hostker {}", operation), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = transport::error_body(response).await;
            return Err(transport::status_error("hostker", operation, status.as_u16(), &body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport::classify(&format!("hostker {}", operation), e))?;

        let parse_error = |e: serde_json::Error| {
            Error::provider("hostker", format!("Failed to parse {} response: {}", operation, e))
        };
        let status: Status = serde_json::from_slice(&body).map_err(parse_error)?;
        if status.success != 1 {
            return Err(Error::provider(
                "hostker",
                format!(
                    "{} rejected: {}",
                    operation,
                    status.error_message.unwrap_or_else(|| "no error message".to_string())
                ),
            ));
        }

        serde_json::from_slice(&body).map_err(parse_error)
    }
}

#[async_trait]
impl DnsProvider for HostkerProvider {
    async fn enumerate_records(&mut self) -> Result<Vec<DnsRecord>> {
        if let Some(cache) = &self.cache
            && cache.fetched_at.elapsed() < self.cache_ttl
        {
            debug!("Serving {} Hostker record(s) from cache", cache.records.len());
            return Ok(cache.records.clone());
        }

        let mut records = Vec::new();
        for (domain, headers) in &self.domains {
            let found = self
                .retry
                .run("hostker dnsGetRecords", || self.fetch_domain(domain, headers))
                .await?;
            records.extend(found);
        }

        self.cache = Some(CachedRecords {
            fetched_at: Instant::now(),
            records: records.clone(),
        });
        Ok(records)
    }

    async fn update_record(&mut self, record: &DnsRecord, new_ip: &IpAddress) -> Result<()> {
        let managed = self
            .domains
            .get(&record.zone)
            .is_some_and(|headers| headers.contains(&record.name));
        if !managed {
            return Err(Error::fatal(format!(
                "hostker: refusing to edit unmanaged record {} in {}",
                record.name, record.zone
            )));
        }

        info!(
            "Updating Hostker record {}.{} -> {} (was: {})",
            record.name, record.zone, new_ip, record.content
        );

        self.retry
            .run("hostker dnsEditRecord", || self.edit(record, new_ip))
            .await?;

        if let Some(cache) = self.cache.as_mut() {
            cache
                .records
                .iter_mut()
                .filter(|r| r.id == record.id && r.zone == record.zone)
                .for_each(|r| r.content = new_ip.clone());
        }
        Ok(())
    }

    fn invalidate_cache(&mut self) {
        if self.cache.take().is_some() {
            debug!("Hostker record cache dropped");
        }
    }

    fn provider_name(&self) -> &'static str {
        "hostker"
    }
}

/// Factory for creating Hostker providers
pub struct HostkerFactory;

impl DnsProviderFactory for HostkerFactory {
    fn create(
        &self,
        config: &ProviderConfig,
        engine: &EngineConfig,
    ) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Hostker {
                email,
                token,
                domains,
                cache_ttl_secs,
            } => {
                let provider = HostkerProvider::new(
                    email.clone(),
                    token.clone(),
                    domains.clone(),
                    engine.request_timeout(),
                )?
                .with_cache_ttl(Duration::from_secs(*cache_ttl_secs))
                .with_retry_ladder(engine.retry_ladder()?);

                Ok(Box::new(provider))
            }
            _ => Err(Error::config("Invalid config for Hostker provider")),
        }
    }
}

/// Register the Hostker provider with a registry
pub fn register(registry: &mut pddns_core::ProviderRegistry) {
    registry.register_provider("hostker", Box::new(HostkerFactory));
}
