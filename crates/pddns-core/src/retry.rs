//! Timeout-only retry ladder for provider transport calls.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// A fixed, strictly decreasing list of waits applied to timeouts.
///
/// The first attempt runs immediately. Each time an attempt fails with
/// [`Error::Timeout`] the next rung's wait is slept before trying again;
/// when the attempt after the last rung also times out, that error is
/// returned. Any other error is returned at once.
///
/// With the default ladder `[60s, 20s, 10s, 0s]` an operation is attempted
/// at most five times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryLadder {
    waits: Vec<Duration>,
}

impl RetryLadder {
    /// Default rungs, in seconds
    pub const DEFAULT_WAITS_SECS: [u64; 4] = [60, 20, 10, 0];

    /// Create a ladder from explicit waits
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless the waits are strictly
    /// decreasing.
    pub fn new(waits: Vec<Duration>) -> Result<Self> {
        if waits.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(Error::config(format!(
                "retry ladder must be strictly decreasing, got {:?}",
                waits
            )));
        }
        Ok(Self { waits })
    }

    /// Create a ladder from waits in seconds
    pub fn from_secs(waits: &[u64]) -> Result<Self> {
        Self::new(waits.iter().copied().map(Duration::from_secs).collect())
    }

    /// A ladder that never retries
    pub fn none() -> Self {
        Self { waits: Vec::new() }
    }

    /// The configured waits
    pub fn waits(&self) -> &[Duration] {
        &self.waits
    }

    /// Run `op`, retrying on timeouts along the ladder
    ///
    /// `operation` names the call for log lines.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut rungs = self.waits.iter();
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_timeout() => match rungs.next() {
                    Some(wait) => {
                        warn!(
                            "{} timed out ({}), retrying in {}s",
                            operation,
                            e,
                            wait.as_secs()
                        );
                        tokio::time::sleep(*wait).await;
                    }
                    None => {
                        warn!("{} timed out, retry ladder exhausted", operation);
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryLadder {
    fn default() -> Self {
        Self {
            waits: Self::DEFAULT_WAITS_SECS
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}
