//! Core DDNS engine
//!
//! The DdnsEngine is responsible for:
//! - Fetching the current address from the IpSource
//! - Enumerating the provider's records
//! - Comparing them and dispatching updates for the ones that differ
//! - Sleeping until the next cycle, or until a reload or shutdown request
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐         ┌──────────────┐         ┌─────────────┐
//! │  IpSource   │──ip────▶│  DdnsEngine  │◀──recs──│ DnsProvider │
//! └─────────────┘         └──────────────┘         └─────────────┘
//!                           │    ▲      │                 ▲
//!                  events   │    │ wake │   update_record │
//!                           ▼    │      └─────────────────┘
//!                     ┌────────┐ ┌───────────────┐
//!                     │ mpsc   │ │ ControlHandle │
//!                     └────────┘ └───────────────┘
//! ```
//!
//! ## Failure Policy
//!
//! A failed cycle never stops the loop unless the error is
//! [`FailureClass::Fatal`]. The class picks the sleep before the next try:
//!
//! | Class        | Backoff                     | Log   |
//! |--------------|-----------------------------|-------|
//! | `Fatal`      | none, `run` returns the error | error |
//! | `Timeout`    | `timeout_backoff_secs`      | warn  |
//! | `Connection` | `connection_backoff_secs`   | warn  |
//! | `Unexpected` | interval / 3 (at least 1 s) | error |

use crate::config::DdnsConfig;
use crate::control::{ControlHandle, LoopControl, Wake};
use crate::error::{Error, FailureClass, Result};
use crate::traits::{DnsProvider, DnsRecord, IpAddress, IpSource};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        ip_source: &'static str,
        provider: &'static str,
    },

    /// A reconciliation pass finished
    CycleCompleted {
        ip: IpAddress,
        updated: usize,
    },

    /// A reconciliation pass failed and the engine is backing off
    CycleFailed {
        class: FailureClass,
        backoff: Duration,
    },

    /// First successful pass after one or more failures
    Recovered,

    /// Provider caches were dropped after a reload request
    Reloaded,

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// One record whose content must change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub record: DnsRecord,
    pub new_content: IpAddress,
}

/// Ordered set of pending updates for one cycle
///
/// Built fresh every cycle and consumed on dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationBatch {
    updates: Vec<PendingUpdate>,
}

impl ReconciliationBatch {
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingUpdate> {
        self.updates.iter()
    }
}

impl IntoIterator for ReconciliationBatch {
    type Item = PendingUpdate;
    type IntoIter = std::vec::IntoIter<PendingUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.into_iter()
    }
}

/// Compare enumerated records against the current address
///
/// A record is scheduled if and only if its content differs from `ip`.
/// Input order is preserved.
pub fn plan_updates(records: &[DnsRecord], ip: &IpAddress) -> ReconciliationBatch {
    let updates = records
        .iter()
        .filter(|record| &record.content != ip)
        .map(|record| PendingUpdate {
            record: record.clone(),
            new_content: ip.clone(),
        })
        .collect();
    ReconciliationBatch { updates }
}

/// Outcome of one successful reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Address reported by the source
    pub ip: IpAddress,
    /// Records enumerated from the provider
    pub records: usize,
    /// Records updated in this pass
    pub updated: usize,
}

/// Core DDNS engine
///
/// Owns one IP source and one provider exclusively and drives them from a
/// single task. Reload and shutdown arrive through the [`ControlHandle`]
/// obtained from [`DdnsEngine::control_handle`]; nothing else touches the
/// provider while the engine runs.
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`]
/// 2. Hand [`ControlHandle`]s to signal tasks
/// 3. Start with [`DdnsEngine::run()`], or drive single passes with
///    [`DdnsEngine::run_cycle()`]
///
/// ## Event Channel
///
/// Events go to a bounded channel with `try_send`. When the receiver falls
/// behind, events are dropped with a warning instead of blocking the loop.
pub struct DdnsEngine {
    ip_source: Box<dyn IpSource>,
    provider: Box<dyn DnsProvider>,
    control: LoopControl,
    interval: Duration,
    timeout_backoff: Duration,
    connection_backoff: Duration,
    /// Set while the last pass failed, for the one-shot recovery log
    failing: bool,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl DdnsEngine {
    /// Create a new DDNS engine
    ///
    /// # Parameters
    ///
    /// - `ip_source`: IP source implementation
    /// - `provider`: DNS provider implementation
    /// - `control`: Receiver side of the reload/shutdown control
    /// - `config`: DDNS configuration (interval and engine section are used)
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        ip_source: Box<dyn IpSource>,
        provider: Box<dyn DnsProvider>,
        control: LoopControl,
        config: &DdnsConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        if config.interval_secs == 0 {
            return Err(Error::config("interval_secs must be > 0"));
        }
        config.engine.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            ip_source,
            provider,
            control,
            interval: config.interval(),
            timeout_backoff: Duration::from_secs(config.engine.timeout_backoff_secs),
            connection_backoff: Duration::from_secs(config.engine.connection_backoff_secs),
            failing: false,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Handle for requesting reload or shutdown
    pub fn control_handle(&self) -> ControlHandle {
        self.control.handle()
    }

    /// Run the engine
    ///
    /// Polls forever, sleeping the interval after a successful pass or the
    /// class backoff after a failed one.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Shutdown was requested; the provider has been closed
    /// - `Err(Error)`: A fatal invariant was violated
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Engine started (source: {}, provider: {}, interval: {}s)",
            self.ip_source.name(),
            self.provider.provider_name(),
            self.interval.as_secs()
        );
        self.emit_event(EngineEvent::Started {
            ip_source: self.ip_source.name(),
            provider: self.provider.provider_name(),
        });

        loop {
            let wait = match self.run_cycle().await {
                Ok(_) => {
                    if self.failing {
                        info!("recovered");
                        self.failing = false;
                        self.emit_event(EngineEvent::Recovered);
                    }
                    self.interval
                }
                Err(e) => {
                    let class = e.class();
                    let backoff = match class {
                        FailureClass::Fatal => {
                            error!("Fatal error, stopping: {}", e);
                            self.emit_event(EngineEvent::Stopped {
                                reason: e.to_string(),
                            });
                            return Err(e);
                        }
                        FailureClass::Timeout => {
                            warn!(
                                "Cycle timed out: {}, retrying in {}s",
                                e,
                                self.timeout_backoff.as_secs()
                            );
                            self.timeout_backoff
                        }
                        FailureClass::Connection => {
                            warn!(
                                "Connection failed: {}, retrying in {}s",
                                e,
                                self.connection_backoff.as_secs()
                            );
                            self.connection_backoff
                        }
                        FailureClass::Unexpected => {
                            let backoff = self.unexpected_backoff();
                            error!(
                                "Cycle failed: {}, retrying in {}s",
                                e,
                                backoff.as_secs()
                            );
                            backoff
                        }
                    };
                    self.failing = true;
                    self.emit_event(EngineEvent::CycleFailed { class, backoff });
                    backoff
                }
            };

            match self.control.sleep(wait).await {
                Wake::Elapsed => {}
                Wake::Reload => {
                    info!("Reload requested, dropping provider caches");
                    self.provider.invalidate_cache();
                    self.emit_event(EngineEvent::Reloaded);
                }
                Wake::Shutdown => {
                    info!("Shutdown requested, closing provider");
                    if let Err(e) = self.provider.close().await {
                        warn!("Failed to close provider cleanly: {}", e);
                    }
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown requested".to_string(),
                    });
                    return Ok(());
                }
            }
        }
    }

    /// Run one reconciliation pass
    ///
    /// Fetches the address, enumerates records, and updates every record
    /// whose content differs. The first failing step aborts the pass and
    /// discards the rest of the batch.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let ip = self.ip_source.current().await?;
        if ip.is_empty() {
            return Err(Error::ip_source(format!(
                "{} returned an empty address",
                self.ip_source.name()
            )));
        }
        debug!("Current IP from {}: {}", self.ip_source.name(), ip);

        let records = self.provider.enumerate_records().await?;
        let batch = plan_updates(&records, &ip);
        let updated = batch.len();

        for pending in batch {
            debug!(
                "Updating {} ({} -> {})",
                pending.record.name, pending.record.content, pending.new_content
            );
            self.provider
                .update_record(&pending.record, &pending.new_content)
                .await?;
        }

        if updated > 0 {
            info!("IP change detected, changed {} record(s) to {}", updated, ip);
        } else {
            debug!("IP {} unchanged across {} record(s)", ip, records.len());
        }

        self.emit_event(EngineEvent::CycleCompleted {
            ip: ip.clone(),
            updated,
        });

        Ok(CycleReport {
            ip,
            records: records.len(),
            updated,
        })
    }

    /// Release provider resources without running the loop
    pub async fn close(&mut self) -> Result<()> {
        self.provider.close().await
    }

    fn unexpected_backoff(&self) -> Duration {
        (self.interval / 3).max(Duration::from_secs(1))
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
