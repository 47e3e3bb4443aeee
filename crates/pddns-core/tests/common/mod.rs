//! Test doubles and common utilities for engine contract tests
//!
//! The doubles record every call in shared state so a test can keep a
//! [`ProviderSpy`] or [`SourceSpy`] after the boxed trait object has
//! been moved into the engine.

#![allow(dead_code)]

use pddns_core::config::{DdnsConfig, EngineConfig, IpSourceConfig, ProviderConfig};
use pddns_core::error::{Error, Result};
use pddns_core::traits::{DnsProvider, DnsRecord, IpAddress, IpSource};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted answer of a [`ScriptedIpSource`]
#[derive(Debug, Clone)]
pub enum Step {
    Ip(&'static str),
    Timeout,
    Connection,
    Unexpected,
    Fatal,
}

impl Step {
    fn answer(&self) -> Result<IpAddress> {
        match self {
            Step::Ip(ip) => Ok(IpAddress::from(*ip)),
            Step::Timeout => Err(Error::timeout("scripted lookup timed out")),
            Step::Connection => Err(Error::connection("scripted connection refused")),
            Step::Unexpected => Err(Error::ip_source("scripted lookup failure")),
            Step::Fatal => Err(Error::fatal("scripted invariant violation")),
        }
    }
}

#[derive(Debug, Default)]
struct SourceState {
    script: VecDeque<Step>,
    last: Option<Step>,
    calls: usize,
}

/// Shared view on a [`ScriptedIpSource`]
#[derive(Debug, Clone, Default)]
pub struct SourceSpy {
    state: Arc<Mutex<SourceState>>,
}

impl SourceSpy {
    /// Number of times `current()` was called
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// Append answers to the script
    pub fn push(&self, steps: impl IntoIterator<Item = Step>) {
        self.state.lock().unwrap().script.extend(steps);
    }
}

/// An IpSource that replays a script, repeating the last answer once the
/// script runs dry
pub struct ScriptedIpSource {
    state: Arc<Mutex<SourceState>>,
}

impl ScriptedIpSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> (Self, SourceSpy) {
        let spy = SourceSpy::default();
        spy.push(steps);
        let source = Self {
            state: Arc::clone(&spy.state),
        };
        (source, spy)
    }
}

#[async_trait::async_trait]
impl IpSource for ScriptedIpSource {
    async fn current(&mut self) -> Result<IpAddress> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let step = match state.script.pop_front() {
            Some(step) => {
                state.last = Some(step.clone());
                step
            }
            None => state.last.clone().expect("script is not empty"),
        };
        step.answer()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    records: Vec<DnsRecord>,
    updates: Vec<(String, IpAddress)>,
    enumerate_calls: usize,
    invalidations: usize,
    closed: bool,
}

/// Shared view on a [`MockDnsProvider`]
#[derive(Debug, Clone, Default)]
pub struct ProviderSpy {
    state: Arc<Mutex<ProviderState>>,
}

impl ProviderSpy {
    /// Record names and contents passed to `update_record`, in call order
    pub fn updates(&self) -> Vec<(String, IpAddress)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates.len()
    }

    pub fn enumerate_calls(&self) -> usize {
        self.state.lock().unwrap().enumerate_calls
    }

    pub fn invalidations(&self) -> usize {
        self.state.lock().unwrap().invalidations
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Current content of a record
    pub fn content(&self, name: &str) -> Option<IpAddress> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.content.clone())
    }
}

/// A DnsProvider backed by an in-memory record list
///
/// Updates are applied to the list, so the next enumeration reflects them
/// the way a real provider would.
pub struct MockDnsProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockDnsProvider {
    /// Records given as (zone, name, content)
    pub fn new(records: &[(&str, &str, &str)]) -> (Self, ProviderSpy) {
        let spy = ProviderSpy::default();
        spy.state.lock().unwrap().records = records
            .iter()
            .enumerate()
            .map(|(i, (zone, name, content))| DnsRecord {
                id: format!("rec-{}", i),
                zone: zone.to_string(),
                name: name.to_string(),
                content: IpAddress::from(*content),
                ttl: 600,
                proxied: None,
            })
            .collect();
        let provider = Self {
            state: Arc::clone(&spy.state),
        };
        (provider, spy)
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn enumerate_records(&mut self) -> Result<Vec<DnsRecord>> {
        let mut state = self.state.lock().unwrap();
        state.enumerate_calls += 1;
        Ok(state.records.clone())
    }

    async fn update_record(&mut self, record: &DnsRecord, new_ip: &IpAddress) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.updates.push((record.name.clone(), new_ip.clone()));
        if let Some(stored) = state.records.iter_mut().find(|r| r.id == record.id) {
            stored.content = new_ip.clone();
        }
        Ok(())
    }

    fn invalidate_cache(&mut self) {
        self.state.lock().unwrap().invalidations += 1;
    }

    async fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Helper to create a DdnsConfig for testing
///
/// The provider section is never used by the engine; it only has to be
/// well formed.
pub fn test_config(interval_secs: u64) -> DdnsConfig {
    let mut config = DdnsConfig::new(
        IpSourceConfig::default(),
        ProviderConfig::Hostker {
            email: "test@example.com".to_string(),
            token: "test-token".to_string(),
            domains: BTreeMap::from([("example.com".to_string(), vec!["home".to_string()])]),
            cache_ttl_secs: 30,
        },
    );
    config.interval_secs = interval_secs;
    config.engine = EngineConfig {
        event_channel_capacity: 100,
        ..EngineConfig::default()
    };
    config
}

/// Let spawned tasks run until they block on a timer
///
/// Under a paused clock the runtime only auto-advances once every task is
/// idle, so when this returns the engine is parked in its next sleep.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Advance the paused clock by whole seconds
pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// Drain every event currently buffered in the channel
pub fn drain(rx: &mut tokio::sync::mpsc::Receiver<pddns_core::EngineEvent>) -> Vec<pddns_core::EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
