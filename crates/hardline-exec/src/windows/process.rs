use crate::HostError;
use crate::host::{CommandOutput, CommandRunner};
use std::io::ErrorKind;
use std::process::Command;

/// Run `program` with `args`, capturing output. Only a failure to start is an error.
pub fn run_program(program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
    tracing::trace!(program, ?args, "running host command");
    let output = Command::new(program).args(args).output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            HostError::Unsupported(format!("{program} is not available on this host"))
        } else {
            HostError::Failed(format!("failed to start {program}: {e}"))
        }
    })?;
    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Map a failed tool invocation to the closest [`HostError`].
pub(crate) fn classify(what: &str, out: &CommandOutput) -> HostError {
    let text = format!("{}\n{}", out.stdout.trim(), out.stderr.trim());
    let lower = text.to_ascii_lowercase();
    let detail = text.trim().to_string();
    if lower.contains("access is denied") || lower.contains("access denied") {
        HostError::AccessDenied(format!("{what}: {detail}"))
    } else if lower.contains("cannot find") || lower.contains("does not exist") {
        HostError::NotFound(what.to_string())
    } else {
        HostError::Failed(format!("{what} (exit {}): {detail}", out.exit_code))
    }
}

/// Single-quoted PowerShell literal.
pub(crate) fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Runs command lines through `powershell.exe -NoProfile -NonInteractive -Command`.
#[derive(Clone, Debug)]
pub struct PowerShell {
    program: String,
}

impl Default for PowerShell {
    fn default() -> Self {
        Self {
            program: "powershell.exe".to_string(),
        }
    }
}

impl PowerShell {
    /// Use a different host binary, e.g. `pwsh`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl CommandRunner for PowerShell {
    fn run(&self, command: &str) -> Result<CommandOutput, HostError> {
        run_program(
            &self.program,
            &["-NoProfile", "-NonInteractive", "-Command", command],
        )
    }
}
