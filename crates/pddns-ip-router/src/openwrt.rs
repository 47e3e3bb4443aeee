//! OpenWrt LuCI source
//!
//! Two query protocols exist in the field:
//!
//! - V1: ubus JSON-RPC `network.interface dump` at `/ubus/`
//! - V2: the legacy LuCI status page `/cgi-bin/luci/?status=1`
//!
//! The first successful lookup pins the protocol and persists it with the
//! login token. Later lookups call the pinned protocol directly; only
//! [`OpenWrtSource::reset_version`] makes the source detect it again.

use pddns_core::session::{ProtocolVersion, SessionFile, SessionState};
use pddns_core::traits::{IpAddress, IpSource};
use pddns_core::transport::{self, ClientOptions};
use pddns_core::{Error, Result};
use reqwest::header::COOKIE;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

/// LuCI session cookies are `sysauth`, `sysauth_http` or `sysauth_https`
const COOKIE_PREFIX: &str = "sysauth";

const RPC_METHOD_NOT_FOUND: i64 = -32601;
const RPC_SERVER_ERROR: i64 = -32000;

const UBUS_METHOD_NOT_FOUND: i64 = 3;
const UBUS_NOT_FOUND: i64 = 4;
const UBUS_PERMISSION_DENIED: i64 = 6;

/// Version-adaptive, session-cached OpenWrt client
pub struct OpenWrtSource {
    base_url: String,
    user: String,
    password: String,
    ipv6: bool,
    interface: String,
    interface6: String,
    cookie_name: String,
    session: SessionState,
    session_file: SessionFile,
    session_loaded: bool,
    client: reqwest::Client,
}

impl OpenWrtSource {
    /// Create a client for the router at `route` (host or base URL)
    ///
    /// The session file is read on the first lookup.
    pub fn new(
        route: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        session_file: SessionFile,
        timeout: Duration,
    ) -> Result<Self> {
        let options = ClientOptions {
            follow_redirects: false,
            ..ClientOptions::with_timeout(timeout)
        };

        Ok(Self {
            base_url: base_url(route),
            user: user.into(),
            password: password.into(),
            ipv6: false,
            interface: "wan".to_string(),
            interface6: "wan6".to_string(),
            cookie_name: COOKIE_PREFIX.to_string(),
            session: SessionState::default(),
            session_file,
            session_loaded: false,
            client: transport::build_client(&options)?,
        })
    }

    /// Report the IPv6 address from [`IpSource::current`]
    pub fn with_ipv6(mut self, ipv6: bool) -> Self {
        self.ipv6 = ipv6;
        self
    }

    /// Override the IPv4 and IPv6 interface names
    pub fn with_interfaces(mut self, interface: impl Into<String>, interface6: impl Into<String>) -> Self {
        self.interface = interface.into();
        self.interface6 = interface6.into();
        self
    }

    /// Current session state
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Forget the pinned protocol; the next lookup detects it again
    pub fn reset_version(&mut self) {
        info!("Forgetting detected OpenWrt protocol version");
        self.session.reset_version();
    }

    /// Look up the WAN address
    pub async fn get_ip(&mut self, wants_ipv6: bool) -> Result<IpAddress> {
        self.load_session().await;

        match self.session.protocol_version {
            ProtocolVersion::V1 => self.query_v1(wants_ipv6).await,
            ProtocolVersion::V2 => self.query_v2(wants_ipv6).await,
            ProtocolVersion::Unknown => match self.query_v1(wants_ipv6).await {
                Ok(ip) => {
                    self.pin(ProtocolVersion::V1).await;
                    Ok(ip)
                }
                Err(Error::UnsupportedProtocol(reason)) => {
                    info!("Router does not answer ubus ({}), trying LuCI status page", reason);
                    let ip = self.query_v2(wants_ipv6).await?;
                    self.pin(ProtocolVersion::V2).await;
                    Ok(ip)
                }
                Err(e) => Err(e),
            },
        }
    }

    async fn query_v1(&mut self, wants_ipv6: bool) -> Result<IpAddress> {
        self.login(false).await?;
        match self.ubus_dump(wants_ipv6).await {
            Err(Error::Authentication(reason)) => {
                debug!("ubus rejected the session ({}), logging in again", reason);
                self.login(true).await?;
                self.ubus_dump(wants_ipv6).await
            }
            other => other,
        }
    }

    async fn query_v2(&mut self, wants_ipv6: bool) -> Result<IpAddress> {
        self.login(false).await?;
        match self.status_page(wants_ipv6).await {
            Err(Error::Authentication(reason)) => {
                debug!("Status page rejected the session ({}), logging in again", reason);
                self.login(true).await?;
                self.status_page(wants_ipv6).await
            }
            other => other,
        }
    }

    async fn ubus_dump(&self, wants_ipv6: bool) -> Result<IpAddress> {
        let url = format!("{}/ubus/?{}", self.base_url, chrono::Utc::now().timestamp());
        let body = json!([{
            "jsonrpc": "2.0",
            "id": 1,
            "method": "call",
            "params": [self.session.token, "network.interface", "dump", {}],
        }]);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport::classify("openwrt ubus call", e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::unsupported("ubus endpoint not found"));
        }
        if !status.is_success() {
            return Err(Error::http(format!("openwrt ubus call: status {}", status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport::classify("openwrt ubus call", e))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|_| Error::unsupported("ubus answered with a non-JSON body"))?;

        let interface = if wants_ipv6 { &self.interface6 } else { &self.interface };
        parse_ubus_dump(&value, interface, wants_ipv6)
    }

    async fn status_page(&self, wants_ipv6: bool) -> Result<IpAddress> {
        let url = format!(
            "{}/cgi-bin/luci/?status=1&_={}",
            self.base_url,
            chrono::Utc::now().timestamp_millis()
        );

        let response = self
            .with_cookie(self.client.get(&url))
            .send()
            .await
            .map_err(|e| transport::classify("openwrt status page", e))?;

        let status = response.status();
        if status.as_u16() == 403 {
            return Err(Error::auth("LuCI status page refused the session"));
        }
        if !status.is_success() {
            return Err(Error::http(format!("openwrt status page: status {}", status)));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::ip_source(format!("LuCI status page is not JSON: {}", e)))?;

        let interface = if wants_ipv6 { &self.interface6 } else { &self.interface };
        parse_status_page(&value, interface, wants_ipv6)
    }

    /// Make sure a valid session token is held
    ///
    /// Unless `force` is set, an existing token is checked first and kept
    /// when the router still accepts it.
    async fn login(&mut self, force: bool) -> Result<()> {
        if !force && !self.session.token.is_empty() && self.check_login().await? {
            return Ok(());
        }

        self.session.clear_token();
        debug!("Logging in to {} as {}", self.base_url, self.user);

        let response = self
            .client
            .post(format!("{}/cgi-bin/luci", self.base_url))
            .form(&[
                ("luci_username", self.user.as_str()),
                ("luci_password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport::classify("openwrt login", e))?;

        let status = response.status().as_u16();
        if status != 200 && status != 302 {
            return Err(transport::status_error("openwrt", "login", status, ""));
        }

        let (name, token) = response
            .cookies()
            .find(|c| c.name().starts_with(COOKIE_PREFIX))
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .ok_or_else(|| {
                Error::auth("openwrt login: no session cookie issued, check user and password")
            })?;

        self.cookie_name = name;
        self.session.refresh_token(token);
        info!("Logged in to {}", self.base_url);
        self.persist().await;
        Ok(())
    }

    async fn check_login(&self) -> Result<bool> {
        let response = self
            .with_cookie(self.client.get(format!("{}/cgi-bin/luci/", self.base_url)))
            .send()
            .await
            .map_err(|e| transport::classify("openwrt login check", e))?;
        Ok(response.status().as_u16() == 200)
    }

    fn with_cookie(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.session.token.is_empty() {
            request
        } else {
            request.header(COOKIE, format!("{}={}", self.cookie_name, self.session.token))
        }
    }

    async fn load_session(&mut self) {
        if !self.session_loaded {
            self.session = self.session_file.load().await;
            self.session_loaded = true;
        }
    }

    async fn pin(&mut self, version: ProtocolVersion) {
        if self.session.pin_version(version) {
            info!("OpenWrt protocol detected: {:?}", version);
            self.persist().await;
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.session_file.save(&self.session).await {
            warn!(
                "Cannot write session file {} ({}), keeping session in memory",
                self.session_file.path().display(),
                e
            );
        }
    }
}

#[async_trait::async_trait]
impl IpSource for OpenWrtSource {
    async fn current(&mut self) -> Result<IpAddress> {
        let ipv6 = self.ipv6;
        self.get_ip(ipv6).await
    }

    fn name(&self) -> &'static str {
        "openwrt"
    }
}

fn base_url(route: &str) -> String {
    let route = route.trim().trim_end_matches('/');
    if route.starts_with("http://") || route.starts_with("https://") {
        route.to_string()
    } else {
        format!("http://{}", route)
    }
}

fn parse_ubus_dump(value: &Value, interface: &str, ipv6: bool) -> Result<IpAddress> {
    let reply = match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
    .ok_or_else(|| Error::unsupported("empty ubus reply"))?;

    if let Some(error) = reply.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error.get("message").and_then(Value::as_str).unwrap_or_default();
        return Err(match (code, message) {
            (_, "Access denied") => Error::auth("ubus: Access denied"),
            (RPC_METHOD_NOT_FOUND | RPC_SERVER_ERROR, _) => {
                Error::unsupported(format!("ubus error {}: {}", code, message))
            }
            _ => Error::ip_source(format!("ubus error {}: {}", code, message)),
        });
    }

    let result = reply
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::unsupported("ubus reply carries no result"))?;

    match result.first().and_then(Value::as_i64).unwrap_or(-1) {
        0 => {}
        UBUS_PERMISSION_DENIED => return Err(Error::auth("ubus: permission denied")),
        code @ (UBUS_METHOD_NOT_FOUND | UBUS_NOT_FOUND) => {
            return Err(Error::unsupported(format!("ubus status {}", code)));
        }
        code => return Err(Error::ip_source(format!("ubus status {}", code))),
    }

    let family = if ipv6 { "ipv6-address" } else { "ipv4-address" };
    result
        .get(1)
        .and_then(|data| data.get("interface"))
        .and_then(Value::as_array)
        .and_then(|interfaces| {
            interfaces
                .iter()
                .find(|i| i.get("interface").and_then(Value::as_str) == Some(interface))
        })
        .and_then(|i| i.get(family))
        .and_then(|addresses| addresses.get(0))
        .and_then(|address| address.get("address"))
        .and_then(Value::as_str)
        .map(IpAddress::from)
        .ok_or_else(|| Error::ip_source(format!("no {} on interface {}", family, interface)))
}

fn parse_status_page(value: &Value, interface: &str, ipv6: bool) -> Result<IpAddress> {
    let field = if ipv6 { "ip6addr" } else { "ipaddr" };
    value
        .get(interface)
        .and_then(|i| i.get(field))
        .and_then(Value::as_str)
        .map(|addr| IpAddress::new(addr.split('/').next().unwrap_or(addr)))
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| Error::ip_source(format!("status page has no {}.{}", interface, field)))
}
