use super::process::{classify, ps_quote, run_program};
use crate::HostError;
use crate::host::{CommandRunner, TaskHost, TaskInfo};
use std::sync::Arc;

/// Scheduled tasks through `schtasks.exe`; trigger edits go through PowerShell because
/// `schtasks` cannot toggle individual triggers.
pub struct SchTasks {
    powershell: Arc<dyn CommandRunner>,
}

const DISABLED: &str = "<Enabled>false</Enabled>";

fn section<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

/// Number of `<...Trigger>` elements directly described in a `<Triggers>` body.
fn count_triggers(body: &str) -> usize {
    body.split('<')
        .skip(1)
        .filter(|chunk| !chunk.starts_with('/'))
        .filter_map(|chunk| {
            chunk
                .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
                .next()
        })
        .filter(|name| name.ends_with("Trigger"))
        .count()
}

/// Task state from its definition XML. A task with no enabled trigger reports
/// `triggers_enabled == false`.
pub(crate) fn parse_task_xml(xml: &str) -> TaskInfo {
    let enabled = section(xml, "Settings").is_none_or(|s| !s.contains(DISABLED));
    let triggers_enabled = section(xml, "Triggers").is_some_and(|body| {
        let total = count_triggers(body);
        total > body.matches(DISABLED).count()
    });
    TaskInfo {
        enabled,
        triggers_enabled,
    }
}

/// `\Microsoft\Windows\Foo\Bar` -> (`\Microsoft\Windows\Foo\`, `Bar`).
pub(crate) fn split_task_path(path: &str) -> (String, String) {
    match path.rfind('\\') {
        Some(i) => (path[..=i].to_string(), path[i + 1..].to_string()),
        None => ("\\".to_string(), path.to_string()),
    }
}

fn is_missing(out: &crate::CommandOutput) -> bool {
    let text = format!("{}{}", out.stdout, out.stderr).to_ascii_lowercase();
    text.contains("cannot find the file") || text.contains("does not exist")
}

impl SchTasks {
    pub fn new(powershell: Arc<dyn CommandRunner>) -> Self {
        Self { powershell }
    }

    fn query_xml(&self, path: &str) -> Result<Option<String>, HostError> {
        let out = run_program("schtasks.exe", &["/Query", "/TN", path, "/XML"])?;
        if out.success() {
            return Ok(Some(out.stdout));
        }
        if is_missing(&out) {
            return Ok(None);
        }
        Err(classify(&format!("schtasks /Query {path}"), &out))
    }

    fn schtasks(&self, what: &str, args: &[&str]) -> Result<(), HostError> {
        let out = run_program("schtasks.exe", args)?;
        if out.success() {
            Ok(())
        } else {
            Err(classify(what, &out))
        }
    }
}

impl TaskHost for SchTasks {
    fn query(&self, path: &str) -> Result<Option<TaskInfo>, HostError> {
        Ok(self.query_xml(path)?.map(|xml| parse_task_xml(&xml)))
    }

    fn set_enabled(&self, path: &str, enabled: bool) -> Result<(), HostError> {
        let flag = if enabled { "/ENABLE" } else { "/DISABLE" };
        self.schtasks(
            &format!("schtasks /Change {flag} {path}"),
            &["/Change", "/TN", path, flag],
        )
    }

    fn set_triggers_enabled(&self, path: &str, enabled: bool) -> Result<(), HostError> {
        let (folder, name) = split_task_path(path);
        let command = format!(
            "$t = Get-ScheduledTask -TaskPath {} -TaskName {} -ErrorAction Stop; \
             foreach ($tr in $t.Triggers) {{ $tr.Enabled = ${} }}; \
             Set-ScheduledTask -InputObject $t -ErrorAction Stop | Out-Null",
            ps_quote(&folder),
            ps_quote(&name),
            enabled
        );
        let out = self.powershell.run(&command)?;
        if out.success() {
            Ok(())
        } else {
            Err(classify(&format!("update triggers of {path}"), &out))
        }
    }

    fn delete(&self, path: &str) -> Result<(), HostError> {
        self.schtasks(
            &format!("schtasks /Delete {path}"),
            &["/Delete", "/TN", path, "/F"],
        )
    }

    fn export_xml(&self, path: &str) -> Result<String, HostError> {
        self.query_xml(path)?
            .ok_or_else(|| HostError::NotFound(format!("task {path}")))
    }
}

impl std::fmt::Debug for SchTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchTasks").finish_non_exhaustive()
    }
}
