use super::process::{classify, run_program};
use crate::HostError;
use crate::host::{CommandOutput, ServiceHost, ServiceInfo};

/// Service control through `sc.exe`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScExe;

const SERVICE_DOES_NOT_EXIST: i32 = 1060;
const SERVICE_NOT_ACTIVE: i32 = 1062;
const SERVICE_ALREADY_RUNNING: i32 = 1056;
const ACCESS_DENIED: i32 = 5;

/// Value of a `KEY : value` line, e.g. `START_TYPE         : 2   AUTO_START  (DELAYED)`.
fn field<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim())
    })
}

/// `sc qc` START_TYPE to the literal startup type recorded in change records.
pub(crate) fn parse_start_type(qc_output: &str) -> Option<&'static str> {
    let raw = field(qc_output, "START_TYPE")?;
    let delayed = raw.contains("DELAYED");
    let code = raw.split_whitespace().next()?;
    Some(match (code, delayed) {
        ("0", _) => "Boot",
        ("1", _) => "System",
        ("2", true) => "AutomaticDelayedStart",
        ("2", false) => "Automatic",
        ("3", _) => "Manual",
        ("4", _) => "Disabled",
        _ => return None,
    })
}

/// `sc query` STATE to running/not running; only `RUNNING` counts.
pub(crate) fn parse_running(query_output: &str) -> Option<bool> {
    let raw = field(query_output, "STATE")?;
    Some(raw.split_whitespace().nth(1) == Some("RUNNING"))
}

/// `start=` argument for a literal startup type.
pub(crate) fn start_arg(startup_type: &str) -> Option<&'static str> {
    Some(match startup_type.to_ascii_lowercase().as_str() {
        "automatic" | "auto" => "auto",
        "automaticdelayedstart" | "delayed-auto" => "delayed-auto",
        "manual" | "demand" => "demand",
        "disabled" => "disabled",
        "boot" => "boot",
        "system" => "system",
        _ => return None,
    })
}

fn sc_error(what: &str, name: &str, out: &CommandOutput) -> HostError {
    match out.exit_code {
        SERVICE_DOES_NOT_EXIST => HostError::NotFound(format!("service {name}")),
        ACCESS_DENIED => HostError::AccessDenied(format!("{what} {name}")),
        _ => classify(&format!("{what} {name}"), out),
    }
}

impl ScExe {
    fn control(&self, verb: &str, name: &str, ok_codes: &[i32]) -> Result<(), HostError> {
        let out = run_program("sc.exe", &[verb, name])?;
        if out.success() || ok_codes.contains(&out.exit_code) {
            Ok(())
        } else {
            Err(sc_error(&format!("sc {verb}"), name, &out))
        }
    }
}

impl ServiceHost for ScExe {
    fn query(&self, name: &str) -> Result<Option<ServiceInfo>, HostError> {
        let qc = run_program("sc.exe", &["qc", name])?;
        if qc.exit_code == SERVICE_DOES_NOT_EXIST {
            return Ok(None);
        }
        if !qc.success() {
            return Err(sc_error("sc qc", name, &qc));
        }
        let startup_type = parse_start_type(&qc.stdout).ok_or_else(|| {
            HostError::Failed(format!("sc qc {name}: no recognizable START_TYPE"))
        })?;

        let state = run_program("sc.exe", &["query", name])?;
        if !state.success() {
            return Err(sc_error("sc query", name, &state));
        }
        Ok(Some(ServiceInfo {
            startup_type: startup_type.to_string(),
            running: parse_running(&state.stdout).unwrap_or(false),
        }))
    }

    fn set_startup_type(&self, name: &str, startup_type: &str) -> Result<(), HostError> {
        let arg = start_arg(startup_type).ok_or_else(|| {
            HostError::Unsupported(format!("startup type {startup_type} for service {name}"))
        })?;
        let out = run_program("sc.exe", &["config", name, "start=", arg])?;
        if out.success() {
            Ok(())
        } else {
            Err(sc_error("sc config", name, &out))
        }
    }

    fn stop(&self, name: &str) -> Result<(), HostError> {
        self.control("stop", name, &[SERVICE_NOT_ACTIVE])
    }

    fn start(&self, name: &str) -> Result<(), HostError> {
        self.control("start", name, &[SERVICE_ALREADY_RUNNING])
    }
}
