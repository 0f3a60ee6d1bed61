//! Mechanism executors and the host adapters they drive.
//!
//! Executors never let an error escape `apply`/`revert`: every attempt, successful or not, comes
//! back as a [`hardline_types::ChangeRecord`]. Probes (`is_applied`, `current_value`) return
//! [`HostError`] so audits can report what could not be read.
//!
//! Host access goes through the traits in [`host`]. [`windows`] implements them with the stock
//! command-line tools; [`memory`] implements them in process for tests and dry environments.

#![forbid(unsafe_code)]

mod error;
mod executor;
mod firewall;
pub mod host;
pub mod memory;
mod record;
mod registry;
mod restore;
mod script;
mod service;
mod system;
mod task;
pub mod windows;

pub use error::HostError;
pub use executor::{ExecutorSet, PolicyExecutor, Reversibility};
pub use firewall::{EndpointSetChange, FirewallExecutor};
pub use host::{
    CommandOutput, CommandRunner, FirewallHost, Hosts, RegistryHost, RegistryValue, ServiceHost,
    ServiceInfo, TaskHost, TaskInfo,
};
pub use registry::{RegistryExecutor, RegistryState};
pub use restore::{CommandRestorePoints, RestorePointManager};
pub use script::ScriptExecutor;
pub use service::ServiceExecutor;
pub use system::{RegistrySystemInfo, StaticSystemInfo, SystemInfoProvider};
pub use task::TaskExecutor;
