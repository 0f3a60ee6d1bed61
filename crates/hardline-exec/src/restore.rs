use crate::host::CommandRunner;
use crate::HostError;
use std::sync::Arc;

/// Creates OS-level restore points before a batch touches the machine.
pub trait RestorePointManager: Send + Sync {
    /// Returns the new restore point's identifier.
    fn create(&self, description: &str) -> Result<String, HostError>;
}

/// System Restore through `Checkpoint-Computer`.
pub struct CommandRestorePoints {
    runner: Arc<dyn CommandRunner>,
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Restore point descriptions are capped by the OS; longer ones are rejected outright.
const MAX_DESCRIPTION: usize = 256;

impl CommandRestorePoints {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub(crate) fn create_command(description: &str) -> String {
        let description: String = description.chars().take(MAX_DESCRIPTION).collect();
        format!(
            "Checkpoint-Computer -Description {} -RestorePointType MODIFY_SETTINGS -ErrorAction Stop; \
             (Get-ComputerRestorePoint | Sort-Object SequenceNumber | Select-Object -Last 1).SequenceNumber",
            quote(&description)
        )
    }
}

impl RestorePointManager for CommandRestorePoints {
    fn create(&self, description: &str) -> Result<String, HostError> {
        let out = self.runner.run(&Self::create_command(description))?;
        let stderr = out.stderr.trim();
        if !out.success() {
            let lower = stderr.to_ascii_lowercase();
            return Err(if lower.contains("access is denied") || lower.contains("administrator") {
                HostError::AccessDenied(stderr.to_string())
            } else if lower.contains("disabled") {
                HostError::Unsupported(format!("System Restore is disabled: {stderr}"))
            } else {
                HostError::Failed(format!("Checkpoint-Computer failed: {stderr}"))
            });
        }
        // Windows silently skips creation when another point was made in the last 24 hours.
        if stderr.contains("already been created within the past") {
            return Err(HostError::Failed(stderr.to_string()));
        }
        let id = out.stdout.trim();
        if id.is_empty() {
            return Err(HostError::Failed(
                "restore point created but no sequence number was reported".to_string(),
            ));
        }
        tracing::info!(restore_point = id, description, "restore point created");
        Ok(id.to_string())
    }
}

impl std::fmt::Debug for CommandRestorePoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRestorePoints").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandOutput;
    use crate::memory::MemoryCommands;

    const DESC: &str = "hardline: apply 3 policies";

    #[test]
    fn sequence_number_becomes_the_id() {
        let runner = Arc::new(MemoryCommands::default());
        runner.set_output(&CommandRestorePoints::create_command(DESC), "42\r\n");
        let rp = CommandRestorePoints::new(runner);
        assert_eq!(rp.create(DESC).expect("created"), "42");
    }

    #[test]
    fn throttled_creation_is_a_failure() {
        let runner = Arc::new(MemoryCommands::default());
        runner.set_result(
            &CommandRestorePoints::create_command(DESC),
            CommandOutput {
                exit_code: 0,
                stdout: "41".to_string(),
                stderr: "A new system restore point cannot be created because one has already \
                         been created within the past 1440 minutes."
                    .to_string(),
            },
        );
        let rp = CommandRestorePoints::new(runner);
        assert!(matches!(rp.create(DESC), Err(HostError::Failed(_))));
    }

    #[test]
    fn descriptions_are_quoted_for_powershell() {
        let cmd = CommandRestorePoints::create_command("it's");
        assert!(cmd.contains("-Description 'it''s'"), "{cmd}");
    }
}
