//! Error types for the DDNS system
//!
//! Every fallible operation in the workspace returns [`Error`]. The engine
//! never inspects messages; it only looks at [`Error::class`] to pick a
//! backoff.

use std::fmt;
use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// A broken internal invariant; the process must stop
    #[error("Fatal invariant violated: {0}")]
    FatalInvariant(String),

    /// Credentials were rejected (after the one allowed re-login, if any)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The remote does not speak the protocol version that was tried
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// A request did not complete within its timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Connection refused, reset, or otherwise not established
    #[error("Connection failed: {0}")]
    Connection(String),

    /// HTTP-level failure (non-success status, unreadable body)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// IP source-related errors
    #[error("IP source error: {0}")]
    IpSource(String),

    /// Session cache errors
    #[error("Session cache error: {0}")]
    Session(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// How the engine reacts to a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Stop the process, never retried
    Fatal,
    /// Transport timeout, long backoff
    Timeout,
    /// Connection refused or reset, short backoff
    Connection,
    /// Anything else, backoff of a third of the interval
    Unexpected,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureClass::Fatal => "fatal",
            FailureClass::Timeout => "timeout",
            FailureClass::Connection => "connection",
            FailureClass::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error for the engine's failure policy
    pub fn class(&self) -> FailureClass {
        match self {
            Error::FatalInvariant(_) => FailureClass::Fatal,
            Error::Timeout(_) => FailureClass::Timeout,
            Error::Connection(_) => FailureClass::Connection,
            Error::Authentication(_)
            | Error::UnsupportedProtocol(_)
            | Error::Http(_)
            | Error::RateLimited(_)
            | Error::NotFound(_)
            | Error::Provider { .. }
            | Error::IpSource(_)
            | Error::Session(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Other(_) => FailureClass::Unexpected,
        }
    }

    /// Whether the retry ladder may try this operation again
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Create a fatal invariant error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::FatalInvariant(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an unsupported protocol error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedProtocol(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }

    /// Create a session cache error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
