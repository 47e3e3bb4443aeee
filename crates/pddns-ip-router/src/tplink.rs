//! TP-Link router source
//!
//! The web API hands out a `stok` token on login; every query goes to
//! `<url>stok=<token>/ds`. The token is kept for as long as the router
//! accepts it.

use pddns_core::traits::{IpAddress, IpSource};
use pddns_core::transport::{self, ClientOptions};
use pddns_core::{Error, Result};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

/// `error_code` returned for an expired or unknown `stok`
const ERROR_UNAUTHORIZED: i64 = -40401;

const KEY_SHORT: &[u8] = b"RDpbLfCPsJZ7fiv";
const KEY_LONG: &[u8] = b"yLwVl0zKqws7LgKPRQ84Mdt708T1qQ3Ha7xv3H7NyU84p21BriUWBU43odz3iP4rBL3cD02KZciXTysVXiV8ngg6vL48rPJyAUw0HurW20xqxv9aYb4M9wK1Ae0wlro510qXeU07kV57fQMc8L6aLgMLwygtc0F10a0Dg70TOoouyFhdysuRMO51yY5ZlOZZLEal1h0t9YQW0Ko7oBwmCAHoic4HYbUyVeU3sfQ1xtXcPcf1aT303wAQhv66qzW";

/// Encode a password the way the router's login page does
///
/// Works on Unicode code points, so non-ASCII passwords encode the same way
/// the browser does.
pub fn encode_password(password: &str) -> String {
    const PAD: u32 = 187;
    let password: Vec<u32> = password.chars().map(u32::from).collect();
    let len = KEY_SHORT.len().max(password.len());

    (0..len)
        .map(|p| {
            let l = KEY_SHORT.get(p).copied().map_or(PAD, u32::from);
            let n = password.get(p).copied().unwrap_or(PAD);
            KEY_LONG[(l ^ n) as usize % KEY_LONG.len()] as char
        })
        .collect()
}

/// Token-cached TP-Link client
pub struct TpLinkSource {
    url: String,
    encoded_password: String,
    stok: Option<String>,
    client: reqwest::Client,
}

impl TpLinkSource {
    /// Create a client for the router web root at `url`
    pub fn new(url: &str, password: &str, timeout: Duration) -> Result<Self> {
        let mut url = url.trim().to_string();
        if !url.ends_with('/') {
            url.push('/');
        }

        Ok(Self {
            url,
            encoded_password: encode_password(password),
            stok: None,
            client: transport::build_client(&ClientOptions::with_timeout(timeout))?,
        })
    }

    async fn login(&mut self) -> Result<String> {
        debug!("Logging in to {}", self.url);
        let body = json!({"method": "do", "login": {"password": self.encoded_password}});
        let reply = self.post(&self.url, &body, "tplink login").await?;

        if error_code(&reply) != 0 {
            return Err(Error::auth(format!(
                "tplink login rejected (error_code {})",
                error_code(&reply)
            )));
        }

        let stok = reply
            .get("stok")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::auth("tplink login: no stok in reply"))?
            .to_string();

        info!("Logged in to {}", self.url);
        self.stok = Some(stok.clone());
        Ok(stok)
    }

    async fn query(&self, stok: &str) -> Result<IpAddress> {
        let url = format!("{}stok={}/ds", self.url, stok);
        let body = json!({"method": "get", "network": {"name": "wan_status"}});
        let reply = self.post(&url, &body, "tplink wan status").await?;

        match error_code(&reply) {
            0 => {}
            ERROR_UNAUTHORIZED => return Err(Error::auth("tplink session expired")),
            code => {
                return Err(Error::ip_source(format!(
                    "tplink wan status failed (error_code {})",
                    code
                )));
            }
        }

        reply
            .pointer("/network/wan_status/ipaddr")
            .and_then(Value::as_str)
            .map(IpAddress::from)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| Error::ip_source("tplink wan status carries no ipaddr"))
    }

    async fn post(&self, url: &str, body: &Value, operation: &str) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport::classify(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = transport::error_body(response).await;
            return Err(transport::status_error("tplink", operation, status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ip_source(format!("{}: reply is not JSON: {}", operation, e)))
    }
}

fn error_code(reply: &Value) -> i64 {
    reply.get("error_code").and_then(Value::as_i64).unwrap_or(0)
}

#[async_trait::async_trait]
impl IpSource for TpLinkSource {
    async fn current(&mut self) -> Result<IpAddress> {
        let stok = match self.stok.clone() {
            Some(stok) => stok,
            None => self.login().await?,
        };

        match self.query(&stok).await {
            Err(Error::Authentication(reason)) => {
                debug!("{}, logging in again", reason);
                self.stok = None;
                let stok = self.login().await?;
                self.query(&stok).await
            }
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        "tplink"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn wan_status(ip: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "network": {"wan_status": {"ipaddr": ip, "proto": "pppoe"}},
            "error_code": 0
        }))
    }

    fn login_body() -> Value {
        json!({"method": "do", "login": {"password": "77VtQbhc9TefbwK"}})
    }

    #[test]
    fn password_encoding_matches_router() {
        assert_eq!(encode_password("test"), "77VtQbhc9TefbwK");
        assert_eq!(encode_password(""), "tyWcQbhc9TefbwK");
        assert_eq!(encode_password("admin12345678901234"), "WaQ7x6b0K5xyJX25Vkc");
    }

    #[test]
    fn password_encoding_uses_code_points() {
        assert_eq!(encode_password("pässwörd€"), "x0VQ38iByTefbwK");
        assert_eq!(encode_password("密码"), "1OWcQbhc9TefbwK");
    }

    #[tokio::test]
    async fn login_then_query_and_reuse_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_json(login_body()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stok": "s1", "error_code": 0})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/stok=s1/ds"))
            .respond_with(wan_status("100.64.1.2"))
            .expect(2)
            .mount(&server)
            .await;

        let mut source = TpLinkSource::new(&server.uri(), "test", Duration::from_secs(5)).unwrap();
        assert_eq!(source.current().await.unwrap().as_str(), "100.64.1.2");
        assert_eq!(source.current().await.unwrap().as_str(), "100.64.1.2");
    }

    #[tokio::test]
    async fn expired_token_triggers_one_relogin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stok": "s1", "error_code": 0})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stok": "s2", "error_code": 0})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/stok=s1/ds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error_code": -40401})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/stok=s2/ds"))
            .respond_with(wan_status("100.64.9.9"))
            .expect(1)
            .mount(&server)
            .await;

        let mut source = TpLinkSource::new(&server.uri(), "test", Duration::from_secs(5)).unwrap();
        assert_eq!(source.current().await.unwrap().as_str(), "100.64.9.9");
    }

    #[tokio::test]
    async fn rejected_password_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error_code": -40321})))
            .mount(&server)
            .await;

        let mut source = TpLinkSource::new(&server.uri(), "wrong", Duration::from_secs(5)).unwrap();
        assert!(matches!(source.current().await, Err(Error::Authentication(_))));
    }
}
