//! Router session cache
//!
//! - [`SessionState`]: login token plus the detected router protocol version
//! - [`SessionFile`]: fixed-layout on-disk persistence of that state

pub mod file;

pub use file::SessionFile;

use chrono::{DateTime, Utc};

/// Which router query protocol is in effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// Not detected yet
    #[default]
    Unknown,
    /// Structured RPC protocol
    V1,
    /// Legacy status page
    V2,
}

/// Session state owned by one router client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Detected protocol, pinned after the first successful lookup
    pub protocol_version: ProtocolVersion,
    /// Session token issued by the router's web login
    pub token: String,
    /// When the token was last obtained (not persisted)
    pub last_refresh: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Replace the token after a fresh login
    pub fn refresh_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
        self.last_refresh = Some(Utc::now());
    }

    /// Forget the token, keeping the detected version
    pub fn clear_token(&mut self) {
        self.token.clear();
        self.last_refresh = None;
    }

    /// Pin the detected protocol version
    ///
    /// Returns `true` if the version changed.
    pub fn pin_version(&mut self, version: ProtocolVersion) -> bool {
        let changed = self.protocol_version != version;
        self.protocol_version = version;
        changed
    }

    /// Forget the detected version so the next lookup detects it again
    ///
    /// Only called on explicit reconfiguration, never automatically.
    pub fn reset_version(&mut self) {
        self.protocol_version = ProtocolVersion::Unknown;
    }
}
