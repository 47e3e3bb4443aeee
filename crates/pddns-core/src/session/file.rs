// # Session File
//
// Fixed-layout persistence of the router session between runs.
//
// ## Layout
//
// ```text
// byte 0      protocol flag     1 = V2 (legacy status page), 0 = V1
// byte 1      version defined   1 = flag above is meaningful
// byte 2      token length      0..=63
// bytes 3..66 token             UTF-8, zero padded
// ```
//
// ## Failure Handling
//
// - Missing file: no version detected yet, empty token
// - Unreadable or malformed file: same as missing, with a warning
// - Write failures are returned; the router client logs and carries on

use std::path::{Path, PathBuf};

use crate::Error;
use crate::session::{ProtocolVersion, SessionState};

/// Maximum stored token length in bytes
pub const TOKEN_CAPACITY: usize = 63;

/// Total encoded size in bytes
pub const ENCODED_LEN: usize = 3 + TOKEN_CAPACITY;

/// On-disk session cache
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    /// Point at a session file; nothing is read until [`load`](Self::load)
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached session, falling back to an empty one
    pub async fn load(&self) -> SessionState {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match decode(&bytes) {
                Ok(state) => {
                    tracing::debug!(
                        "Loaded session cache from {} (version {:?})",
                        self.path.display(),
                        state.protocol_version
                    );
                    state
                }
                Err(e) => {
                    tracing::warn!(
                        "Ignoring malformed session cache {}: {}",
                        self.path.display(),
                        e
                    );
                    SessionState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No session cache at {}", self.path.display());
                SessionState::default()
            }
            Err(e) => {
                tracing::warn!(
                    "Cannot read session cache {} ({}), using in-memory session",
                    self.path.display(),
                    e
                );
                SessionState::default()
            }
        }
    }

    /// Persist the session atomically (write temporary file, then rename)
    pub async fn save(&self, state: &SessionState) -> Result<(), Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, encode(state)).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::debug!("Session cache written to {}", self.path.display());
        Ok(())
    }
}

/// Encode a session into the fixed layout, truncating long tokens
pub fn encode(state: &SessionState) -> [u8; ENCODED_LEN] {
    let mut buf = [0u8; ENCODED_LEN];

    let (flag, defined) = match state.protocol_version {
        ProtocolVersion::Unknown => (0, 0),
        ProtocolVersion::V1 => (0, 1),
        ProtocolVersion::V2 => (1, 1),
    };
    buf[0] = flag;
    buf[1] = defined;

    let token = truncate_utf8(&state.token, TOKEN_CAPACITY);
    buf[2] = token.len() as u8;
    buf[3..3 + token.len()].copy_from_slice(token.as_bytes());
    buf
}

/// Decode the fixed layout
pub fn decode(bytes: &[u8]) -> Result<SessionState, Error> {
    if bytes.len() != ENCODED_LEN {
        return Err(Error::session(format!(
            "expected {} bytes, found {}",
            ENCODED_LEN,
            bytes.len()
        )));
    }

    let protocol_version = match (bytes[0], bytes[1]) {
        (_, 0) => ProtocolVersion::Unknown,
        (0, _) => ProtocolVersion::V1,
        _ => ProtocolVersion::V2,
    };

    let len = bytes[2] as usize;
    if len > TOKEN_CAPACITY {
        return Err(Error::session(format!("token length {} out of range", len)));
    }
    let token = std::str::from_utf8(&bytes[3..3 + len])
        .map_err(|e| Error::session(format!("token is not UTF-8: {}", e)))?
        .to_string();

    Ok(SessionState {
        protocol_version,
        token,
        last_refresh: None,
    })
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
