//! Shared HTTP plumbing for IP sources and providers
//!
//! Every client in the workspace is a `reqwest::Client` built here so that
//! each request carries a bounded timeout, and every transport failure is
//! mapped onto the same [`Error`] variants the engine classifies.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for [`build_client`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Follow HTTP redirects
    pub follow_redirects: bool,
    /// Optional user agent override
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            follow_redirects: true,
            user_agent: None,
        }
    }
}

impl ClientOptions {
    /// Options with the given timeout and defaults otherwise
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Build an HTTP client with a bounded per-request timeout
pub fn build_client(options: &ClientOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(options.timeout);

    if !options.follow_redirects {
        builder = builder.redirect(reqwest::redirect::Policy::none());
    }

    if let Some(ref agent) = options.user_agent {
        builder = builder.user_agent(agent.clone());
    }

    builder
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Map a `reqwest` failure to the engine's error taxonomy
///
/// `operation` names what was being attempted (e.g. `"cloudflare list records"`)
/// and ends up in the message.
pub fn classify(operation: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(format!("{}: {}", operation, err))
    } else if err.is_connect() {
        Error::connection(format!("{}: {}", operation, err))
    } else if let Some(status) = err.status() {
        Error::http(format!("{}: status {}: {}", operation, status, err))
    } else {
        Error::http(format!("{}: {}", operation, err))
    }
}

/// Map a non-success HTTP status to the engine's error taxonomy
pub fn status_error(provider: &str, operation: &str, status: u16, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "{} {}: invalid credentials or insufficient permissions (status {})",
            provider, operation, status
        )),
        404 => Error::not_found(format!("{} {}: {}", provider, operation, body)),
        429 => Error::rate_limited(format!(
            "{} {}: rate limit exceeded (status {})",
            provider, operation, status
        )),
        500..=599 => Error::http(format!(
            "{} {}: server error (transient): {} - {}",
            provider, operation, status, body
        )),
        _ => Error::provider(
            provider,
            format!("{} failed: {} - {}", operation, status, body),
        ),
    }
}

/// Read the body of a failed response, never failing
pub async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string())
}
