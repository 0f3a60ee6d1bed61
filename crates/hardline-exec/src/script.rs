use crate::host::{CommandOutput, CommandRunner};
use crate::record::{begin, fail, fail_host, succeed, wrong_mechanism};
use crate::{HostError, PolicyExecutor, Reversibility};
use hardline_domain::expected::NOT_PRESENT;
use hardline_types::{
    ChangeRecord, FailureKind, Mechanism, MechanismDetails, Operation, PolicyDefinition,
    ScriptDetails,
};
use std::sync::Arc;

pub struct ScriptExecutor {
    runner: Arc<dyn CommandRunner>,
}

fn details(policy: &PolicyDefinition) -> Option<&ScriptDetails> {
    match &policy.mechanism {
        MechanismDetails::Script(d) => Some(d),
        _ => None,
    }
}

fn failure_message(command: &str, out: &CommandOutput) -> String {
    let stderr = out.stderr.trim();
    if stderr.is_empty() {
        format!("`{command}` exited with code {}", out.exit_code)
    } else {
        format!("`{command}` exited with code {}: {stderr}", out.exit_code)
    }
}

impl ScriptExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Trimmed stdout of the verify command. A failing verify command is an error, not a value.
    fn verify(&self, d: &ScriptDetails) -> Result<String, HostError> {
        let out = self.runner.run(&d.verify_command)?;
        if !out.success() {
            return Err(HostError::Failed(failure_message(&d.verify_command, &out)));
        }
        Ok(out.stdout.trim().to_string())
    }

    fn run_step(
        &self,
        record: ChangeRecord,
        d: &ScriptDetails,
        command: &str,
        label: &str,
    ) -> ChangeRecord {
        let before = self.verify(d).ok();
        let out = match self.runner.run(command) {
            Ok(out) => out,
            Err(e) => return fail_host(record, before, &e),
        };
        if !out.success() {
            return fail(
                record,
                before,
                FailureKind::Execution,
                failure_message(command, &out),
            );
        }
        let after = self.verify(d).ok();
        let description = format!(
            "Ran {label} script; verify output {} -> {}",
            before.as_deref().unwrap_or(NOT_PRESENT),
            after.as_deref().unwrap_or(NOT_PRESENT)
        );
        succeed(record, before, after, description)
    }
}

impl PolicyExecutor for ScriptExecutor {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Script
    }

    fn is_applied(&self, policy: &PolicyDefinition) -> Result<bool, HostError> {
        let Some(d) = details(policy) else {
            return Ok(false);
        };
        Ok(self.verify(d)? == d.expected_output.trim())
    }

    fn current_value(&self, policy: &PolicyDefinition) -> Result<String, HostError> {
        let Some(d) = details(policy) else {
            return Ok(NOT_PRESENT.to_string());
        };
        self.verify(d)
    }

    fn apply(&self, policy: &PolicyDefinition) -> ChangeRecord {
        let record = begin(Operation::Apply, policy);
        let Some(d) = details(policy) else {
            return wrong_mechanism(record, "script");
        };
        self.run_step(record, d, &d.apply_command, "apply")
    }

    fn revert(&self, policy: &PolicyDefinition, _original: &ChangeRecord) -> ChangeRecord {
        let record = begin(Operation::Revert, policy);
        let Some(d) = details(policy) else {
            return wrong_mechanism(record, "script");
        };
        let Some(command) = d.revert_command.as_deref() else {
            return fail(
                record,
                None,
                FailureKind::Unsupported,
                "script policy has no revert command",
            );
        };
        self.run_step(record, d, command, "revert")
    }

    fn reversibility(&self, policy: &PolicyDefinition) -> Reversibility {
        match details(policy) {
            Some(d) if d.revert_command.is_none() => Reversibility::Irreversible {
                reason: "no revert command".to_string(),
            },
            _ => Reversibility::Reversible,
        }
    }
}

impl std::fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExecutor").finish_non_exhaustive()
    }
}
