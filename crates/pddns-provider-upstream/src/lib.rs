// # Custom Upstream Provider
//
// Pushes the current address to an operator-run HTTP endpoint instead of a
// DNS API. The endpoint receives `{"data": "<ip>"}` as a JSON POST and
// answers `{"status": <code>}`; only status 200 counts as accepted.
//
// The endpoint cannot be queried, so the provider reports a single
// synthetic record whose content is the last address it pushed. Before the
// first push, and after a reload, that content is empty and the next pass
// pushes unconditionally.

use async_trait::async_trait;
use pddns_core::config::{EngineConfig, ProviderConfig};
use pddns_core::retry::RetryLadder;
use pddns_core::traits::{DnsProvider, DnsProviderFactory, DnsRecord, IpAddress};
use pddns_core::transport::{self, ClientOptions};
use pddns_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Id and name of the synthetic record
pub const UPSTREAM_RECORD: &str = "upstream";

#[derive(Debug, Serialize)]
struct Push<'a> {
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct Reply {
    status: i32,
}

/// Provider that POSTs each new address to a fixed URL
#[derive(Debug)]
pub struct CustomUpstreamProvider {
    upstream_url: String,
    last_pushed: Option<IpAddress>,
    retry: RetryLadder,
    client: reqwest::Client,
}

impl CustomUpstreamProvider {
    pub fn new(upstream_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let upstream_url = upstream_url.into();
        if upstream_url.is_empty() {
            return Err(Error::config("Upstream URL cannot be empty"));
        }

        Ok(Self {
            upstream_url,
            last_pushed: None,
            retry: RetryLadder::default(),
            client: transport::build_client(&ClientOptions::with_timeout(timeout))?,
        })
    }

    /// Replace the timeout retry ladder
    pub fn with_retry_ladder(mut self, retry: RetryLadder) -> Self {
        self.retry = retry;
        self
    }

    /// Address accepted by the endpoint on the last successful push
    pub fn last_pushed(&self) -> Option<&IpAddress> {
        self.last_pushed.as_ref()
    }

    fn synthetic_record(&self) -> DnsRecord {
        DnsRecord {
            id: UPSTREAM_RECORD.to_string(),
            zone: self.upstream_url.clone(),
            name: UPSTREAM_RECORD.to_string(),
            content: self.last_pushed.clone().unwrap_or_else(|| IpAddress::new("")),
            ttl: 0,
            proxied: None,
        }
    }

    async fn push(&self, ip: &IpAddress) -> Result<()> {
        let response = self
            .client
            .post(&self.upstream_url)
            .json(&Push { data: ip.as_str() })
            .send()
            .await
            .map_err(|e| transport::classify("upstream push", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = transport::error_body(response).await;
            return Err(transport::status_error("upstream", "push", status.as_u16(), &body));
        }

        let reply: Reply = response
            .json()
            .await
            .map_err(|e| Error::provider("upstream", format!("Failed to parse reply: {}", e)))?;
        if reply.status != 200 {
            return Err(Error::provider(
                "upstream",
                format!("endpoint answered status {}", reply.status),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for CustomUpstreamProvider {
    async fn enumerate_records(&mut self) -> Result<Vec<DnsRecord>> {
        Ok(vec![self.synthetic_record()])
    }

    async fn update_record(&mut self, record: &DnsRecord, new_ip: &IpAddress) -> Result<()> {
        if record.id != UPSTREAM_RECORD || record.zone != self.upstream_url {
            return Err(Error::fatal(format!(
                "upstream: refusing to push for foreign record {} in {}",
                record.name, record.zone
            )));
        }

        info!("Pushing {} to {}", new_ip, self.upstream_url);
        self.retry.run("upstream push", || self.push(new_ip)).await?;
        self.last_pushed = Some(new_ip.clone());
        Ok(())
    }

    fn invalidate_cache(&mut self) {
        if self.last_pushed.take().is_some() {
            debug!("Forgot last pushed address, next pass pushes again");
        }
    }

    fn provider_name(&self) -> &'static str {
        "custom_upstream"
    }
}

/// Factory for creating custom upstream providers
pub struct CustomUpstreamFactory;

impl DnsProviderFactory for CustomUpstreamFactory {
    fn create(
        &self,
        config: &ProviderConfig,
        engine: &EngineConfig,
    ) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::CustomUpstream { upstream_url } => {
                let provider =
                    CustomUpstreamProvider::new(upstream_url.clone(), engine.request_timeout())?
                        .with_retry_ladder(engine.retry_ladder()?);
                Ok(Box::new(provider))
            }
            _ => Err(Error::config("Invalid config for custom upstream provider")),
        }
    }
}

/// Register the custom upstream provider with a registry
pub fn register(registry: &mut pddns_core::ProviderRegistry) {
    registry.register_provider("custom_upstream", Box::new(CustomUpstreamFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> CustomUpstreamProvider {
        CustomUpstreamProvider::new(format!("{}/ddns", server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn first_pass_always_pushes() {
        let server = MockServer::start().await;
        let mut provider = provider(&server);

        let records = provider.enumerate_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, UPSTREAM_RECORD);
        assert!(records[0].content.is_empty());
    }

    #[tokio::test]
    async fn push_posts_json_and_remembers_address() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ddns"))
            .and(body_json(json!({"data": "1.2.3.4"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 200})))
            .expect(1)
            .mount(&server)
            .await;

        let mut provider = provider(&server);
        let records = provider.enumerate_records().await.unwrap();
        let new_ip = IpAddress::from("1.2.3.4");
        provider.update_record(&records[0], &new_ip).await.unwrap();

        let records = provider.enumerate_records().await.unwrap();
        assert_eq!(records[0].content, new_ip);
        assert_eq!(provider.last_pushed(), Some(&new_ip));
    }

    #[tokio::test]
    async fn non_200_reply_status_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 500})))
            .mount(&server)
            .await;

        let mut provider = provider(&server);
        let records = provider.enumerate_records().await.unwrap();
        let err = provider
            .update_record(&records[0], &IpAddress::from("1.2.3.4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert!(err.to_string().contains("500"));
        assert!(provider.last_pushed().is_none());
    }

    #[tokio::test]
    async fn reload_forces_a_fresh_push() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 200})))
            .expect(2)
            .mount(&server)
            .await;

        let mut provider = provider(&server);
        let ip = IpAddress::from("1.2.3.4");
        let records = provider.enumerate_records().await.unwrap();
        provider.update_record(&records[0], &ip).await.unwrap();

        provider.invalidate_cache();
        let records = provider.enumerate_records().await.unwrap();
        assert_ne!(records[0].content, ip);
        provider.update_record(&records[0], &ip).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_record_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 200})))
            .expect(0)
            .mount(&server)
            .await;

        let mut provider = provider(&server);
        let mut record = provider.enumerate_records().await.unwrap().remove(0);
        record.zone = "example.com".to_string();
        let err = provider
            .update_record(&record, &IpAddress::from("1.2.3.4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FatalInvariant(_)));
    }

    #[test]
    fn factory_builds_from_config() {
        let config = ProviderConfig::CustomUpstream {
            upstream_url: "http://127.0.0.1:8080/ddns".to_string(),
        };
        let provider = CustomUpstreamFactory
            .create(&config, &EngineConfig::default())
            .unwrap();
        assert_eq!(provider.provider_name(), "custom_upstream");
    }
}
