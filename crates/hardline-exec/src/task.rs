use crate::host::{TaskHost, TaskInfo};
use crate::record::{begin, fail, fail_host, succeed, wrong_mechanism};
use crate::{HostError, PolicyExecutor, Reversibility};
use hardline_domain::expected::NOT_PRESENT;
use hardline_domain::state_kv::{format_state, parse_state, state_bool};
use hardline_types::{
    ChangeRecord, FailureKind, Mechanism, MechanismDetails, Operation, PolicyDefinition,
    ScheduledTaskAction, ScheduledTaskDetails,
};
use std::path::PathBuf;
use std::sync::Arc;

const ENABLED_KEY: &str = "Enabled";
const TRIGGERS_KEY: &str = "TriggersEnabled";

pub struct TaskExecutor {
    host: Arc<dyn TaskHost>,
}

fn details(policy: &PolicyDefinition) -> Option<&ScheduledTaskDetails> {
    match &policy.mechanism {
        MechanismDetails::ScheduledTask(d) => Some(d),
        _ => None,
    }
}

fn encode(info: TaskInfo) -> String {
    format_state(&[
        (ENABLED_KEY, info.enabled.to_string()),
        (TRIGGERS_KEY, info.triggers_enabled.to_string()),
    ])
}

/// `\Microsoft\Windows\Foo Bar\Task` -> `Microsoft_Windows_Foo Bar_Task.xml`.
fn export_file_name(task_path: &str) -> String {
    let stem: String = task_path
        .trim_matches('\\')
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    format!("{stem}.xml")
}

impl TaskExecutor {
    pub fn new(host: Arc<dyn TaskHost>) -> Self {
        Self { host }
    }

    fn export(&self, d: &ScheduledTaskDetails) -> Result<PathBuf, HostError> {
        let Some(dir) = d.export_directory.as_deref() else {
            return Err(HostError::Failed(
                "export action requires export_directory".to_string(),
            ));
        };
        let xml = self.host.export_xml(&d.task_path)?;
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)
            .map_err(|e| HostError::Failed(format!("create {}: {e}", dir.display())))?;
        let file = dir.join(export_file_name(&d.task_path));
        std::fs::write(&file, xml)
            .map_err(|e| HostError::Failed(format!("write {}: {e}", file.display())))?;
        Ok(file)
    }
}

impl PolicyExecutor for TaskExecutor {
    fn mechanism(&self) -> Mechanism {
        Mechanism::ScheduledTask
    }

    /// A task that does not exist cannot run, which satisfies every task action.
    fn is_applied(&self, policy: &PolicyDefinition) -> Result<bool, HostError> {
        let Some(d) = details(policy) else {
            return Ok(false);
        };
        let Some(info) = self.host.query(&d.task_path)? else {
            return Ok(true);
        };
        Ok(match d.action {
            ScheduledTaskAction::Disable | ScheduledTaskAction::Export => !info.enabled,
            ScheduledTaskAction::ModifyTriggers => !info.triggers_enabled,
            ScheduledTaskAction::Delete => false,
        })
    }

    fn current_value(&self, policy: &PolicyDefinition) -> Result<String, HostError> {
        let Some(d) = details(policy) else {
            return Ok(NOT_PRESENT.to_string());
        };
        Ok(self
            .host
            .query(&d.task_path)?
            .map_or_else(|| NOT_PRESENT.to_string(), encode))
    }

    fn apply(&self, policy: &PolicyDefinition) -> ChangeRecord {
        let record = begin(Operation::Apply, policy);
        let Some(d) = details(policy) else {
            return wrong_mechanism(record, "scheduled task");
        };
        let path = &d.task_path;

        let before = match self.host.query(path) {
            Ok(Some(info)) => info,
            Ok(None) => {
                return succeed(
                    record,
                    None,
                    None,
                    format!("Task {path} not found; nothing to change"),
                );
            }
            Err(e) => return fail_host(record, None, &e),
        };
        let previous = encode(before);

        let outcome = match d.action {
            ScheduledTaskAction::Disable => self
                .host
                .set_enabled(path, false)
                .map(|()| (Some(TaskInfo { enabled: false, ..before }), format!("Disabled task {path}"))),
            ScheduledTaskAction::ModifyTriggers => {
                self.host.set_triggers_enabled(path, false).map(|()| {
                    (
                        Some(TaskInfo {
                            triggers_enabled: false,
                            ..before
                        }),
                        format!("Disabled triggers of task {path}"),
                    )
                })
            }
            ScheduledTaskAction::Delete => self
                .host
                .delete(path)
                .map(|()| (None, format!("Deleted task {path} (irreversible)"))),
            ScheduledTaskAction::Export => self.export(d).and_then(|file| {
                self.host.set_enabled(path, false).map(|()| {
                    (
                        Some(TaskInfo { enabled: false, ..before }),
                        format!("Exported task {path} to {} and disabled it", file.display()),
                    )
                })
            }),
        };

        match outcome {
            Ok((after, description)) => succeed(
                record,
                Some(previous),
                Some(after.map_or_else(|| NOT_PRESENT.to_string(), encode)),
                description,
            ),
            Err(e) => fail_host(record, Some(previous), &e),
        }
    }

    fn revert(&self, policy: &PolicyDefinition, original: &ChangeRecord) -> ChangeRecord {
        let record = begin(Operation::Revert, policy);
        let Some(d) = details(policy) else {
            return wrong_mechanism(record, "scheduled task");
        };
        let path = &d.task_path;

        if d.action == ScheduledTaskAction::Delete {
            return fail(
                record,
                None,
                FailureKind::Irreversible,
                format!("task {path} was deleted and cannot be restored"),
            );
        }

        let Some(prior) = original.previous_state.as_deref() else {
            return succeed(
                record,
                None,
                None,
                format!("Task {path} did not exist at apply; nothing to restore"),
            );
        };
        let prior = parse_state(prior);
        let want_enabled = state_bool(&prior, ENABLED_KEY);
        let want_triggers = state_bool(&prior, TRIGGERS_KEY);
        if want_enabled.is_none() && want_triggers.is_none() {
            return fail(
                record,
                None,
                FailureKind::Execution,
                format!("change {} has no usable previous state", original.change_id),
            );
        }

        let current = match self.host.query(path) {
            Ok(Some(info)) => info,
            Ok(None) => {
                return fail(
                    record,
                    None,
                    FailureKind::NotFound,
                    format!("task {path} no longer exists"),
                );
            }
            Err(e) => return fail_host(record, None, &e),
        };
        let before = encode(current);
        let mut after = current;

        if let Some(enabled) = want_enabled
            && enabled != current.enabled
        {
            if let Err(e) = self.host.set_enabled(path, enabled) {
                return fail_host(record, Some(before), &e);
            }
            after.enabled = enabled;
        }
        if let Some(triggers) = want_triggers
            && triggers != current.triggers_enabled
        {
            if let Err(e) = self.host.set_triggers_enabled(path, triggers) {
                return fail_host(record, Some(before), &e);
            }
            after.triggers_enabled = triggers;
        }

        succeed(
            record,
            Some(before),
            Some(encode(after)),
            format!("Restored task {path} to {}", encode(after)),
        )
    }

    fn reversibility(&self, policy: &PolicyDefinition) -> Reversibility {
        match details(policy).map(|d| d.action) {
            Some(ScheduledTaskAction::Delete) => Reversibility::Irreversible {
                reason: "deleted tasks cannot be recreated".to_string(),
            },
            _ => Reversibility::Reversible,
        }
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor").finish_non_exhaustive()
    }
}
