// # pddns-core
//
// Core library for the passive DDNS updater.
//
// ## Architecture Overview
//
// - **IpSource**: Trait for discovering the current address
// - **DnsProvider**: Trait for reading and updating DNS records
// - **DdnsEngine**: Polling loop that reconciles records with the address
// - **LoopControl / ControlHandle**: Interruptible sleep for reload and shutdown
// - **RetryLadder**: Timeout-only retry wrapper for provider transport calls
// - **SessionFile**: Fixed-layout router session cache
// - **ProviderRegistry**: Factory registry for providers and IP sources
//
// Implementations live in their own crates (`pddns-ip-http`,
// `pddns-ip-router`, `pddns-provider-cloudflare`, `pddns-provider-hostker`);
// `pddnsd` wires them together.

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod control;
pub mod retry;
pub mod session;
pub mod transport;

// Re-export core types for convenience
pub use traits::{DnsProvider, DnsRecord, FallbackIpSource, IpAddress, IpSource};
pub use engine::{CycleReport, DdnsEngine, EngineEvent, ReconciliationBatch, plan_updates};
pub use registry::ProviderRegistry;
pub use config::{DdnsConfig, EngineConfig, IpSourceConfig, LogConfig, ProviderConfig};
pub use error::{Error, FailureClass, Result};
pub use control::{ControlHandle, LoopControl, Wake};
pub use retry::RetryLadder;
pub use session::{ProtocolVersion, SessionFile, SessionState};
