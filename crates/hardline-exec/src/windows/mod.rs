//! Host adapters backed by the stock Windows command-line tools.
//!
//! Each adapter shells out (`reg.exe`, `sc.exe`, `schtasks.exe`, PowerShell) and parses the text it
//! prints. The parsers are plain functions so they can be tested on captured output anywhere.

mod netfw;
mod process;
mod reg;
mod sc;
mod schtasks;

pub use netfw::NetFirewall;
pub use process::{PowerShell, run_program};
pub use reg::RegExe;
pub use sc::ScExe;
pub use schtasks::SchTasks;

use crate::host::Hosts;
use crate::{CommandRestorePoints, RegistrySystemInfo};
use std::sync::Arc;

/// Adapters for the local machine.
pub fn hosts() -> Hosts {
    let powershell = Arc::new(PowerShell::default());
    Hosts {
        registry: Arc::new(RegExe),
        services: Arc::new(ScExe),
        tasks: Arc::new(SchTasks::new(powershell.clone())),
        firewall: Arc::new(NetFirewall::new(powershell.clone())),
        commands: powershell,
    }
}

pub fn restore_points() -> CommandRestorePoints {
    CommandRestorePoints::new(Arc::new(PowerShell::default()))
}

pub fn system_info() -> RegistrySystemInfo {
    RegistrySystemInfo::new(Arc::new(RegExe))
}
