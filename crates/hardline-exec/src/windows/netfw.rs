use super::process::{classify, ps_quote};
use crate::HostError;
use crate::host::{CommandRunner, FirewallHost};
use hardline_types::{FirewallAction, FirewallDirection, FirewallProtocol, FirewallRule};
use serde::Deserialize;
use std::sync::Arc;

/// Firewall rules through the `NetSecurity` PowerShell module. Rules are addressed by their
/// `-Name` (the stable identifier), which is also used as the display name.
pub struct NetFirewall {
    powershell: Arc<dyn CommandRunner>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Shape emitted by [`projection`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsRule {
    name: String,
    direction: String,
    action: String,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    remote_address: Option<OneOrMany<String>>,
    #[serde(default)]
    remote_port: Option<OneOrMany<String>>,
    #[serde(default)]
    program: Option<String>,
}

/// `Any` is how the cmdlets spell "unrestricted".
fn filter_list(values: Option<OneOrMany<String>>) -> Vec<String> {
    values
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("any"))
        .collect()
}

impl PsRule {
    fn into_rule(self) -> FirewallRule {
        let direction = if self.direction.eq_ignore_ascii_case("inbound") {
            FirewallDirection::Inbound
        } else {
            FirewallDirection::Outbound
        };
        let action = if self.action.eq_ignore_ascii_case("allow") {
            FirewallAction::Allow
        } else {
            FirewallAction::Block
        };
        let protocol = match self.protocol.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("tcp" | "6") => FirewallProtocol::Tcp,
            Some("udp" | "17") => FirewallProtocol::Udp,
            _ => FirewallProtocol::Any,
        };
        FirewallRule {
            name: self.name,
            direction,
            action,
            protocol,
            remote_addresses: filter_list(self.remote_address),
            remote_ports: filter_list(self.remote_port),
            program: self
                .program
                .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("any")),
        }
    }
}

/// Parse the JSON printed by a [`projection`] pipeline. Empty output means no rules.
pub(crate) fn parse_rules(json: &str) -> Result<Vec<FirewallRule>, HostError> {
    let json = json.trim();
    if json.is_empty() {
        return Ok(Vec::new());
    }
    let parsed: OneOrMany<PsRule> = serde_json::from_str(json)
        .map_err(|e| HostError::Failed(format!("unreadable firewall rule listing: {e}")))?;
    Ok(parsed.into_vec().into_iter().map(PsRule::into_rule).collect())
}

/// Pipeline that flattens the rules selected by `selector` into [`PsRule`] JSON.
fn projection(selector: &str) -> String {
    format!(
        "{selector} -ErrorAction SilentlyContinue | ForEach-Object {{ \
         $p = $_ | Get-NetFirewallPortFilter; \
         $a = $_ | Get-NetFirewallAddressFilter; \
         $app = $_ | Get-NetFirewallApplicationFilter; \
         [pscustomobject]@{{ Name = $_.Name; Direction = [string]$_.Direction; \
         Action = [string]$_.Action; Protocol = [string]$p.Protocol; \
         RemoteAddress = @($a.RemoteAddress); RemotePort = @($p.RemotePort); \
         Program = [string]$app.Program }} }} | ConvertTo-Json -Depth 3 -Compress"
    )
}

fn ps_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| ps_quote(v))
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn new_rule_command(rule: &FirewallRule) -> String {
    let name = ps_quote(&rule.name);
    let direction = match rule.direction {
        FirewallDirection::Inbound => "Inbound",
        FirewallDirection::Outbound => "Outbound",
    };
    let action = match rule.action {
        FirewallAction::Allow => "Allow",
        FirewallAction::Block => "Block",
    };
    let protocol = match rule.protocol {
        FirewallProtocol::Any => "Any",
        FirewallProtocol::Tcp => "TCP",
        FirewallProtocol::Udp => "UDP",
    };
    let mut cmd = format!(
        "Remove-NetFirewallRule -Name {name} -ErrorAction SilentlyContinue; \
         New-NetFirewallRule -Name {name} -DisplayName {name} -Direction {direction} \
         -Action {action} -Protocol {protocol}"
    );
    if !rule.remote_addresses.is_empty() {
        cmd.push_str(&format!(" -RemoteAddress {}", ps_list(&rule.remote_addresses)));
    }
    if !rule.remote_ports.is_empty() {
        cmd.push_str(&format!(" -RemotePort {}", ps_list(&rule.remote_ports)));
    }
    if let Some(program) = &rule.program {
        cmd.push_str(&format!(" -Program {}", ps_quote(program)));
    }
    cmd.push_str(" -ErrorAction Stop | Out-Null");
    cmd
}

impl NetFirewall {
    pub fn new(powershell: Arc<dyn CommandRunner>) -> Self {
        Self { powershell }
    }

    fn list(&self, selector: &str) -> Result<Vec<FirewallRule>, HostError> {
        let out = self.powershell.run(&projection(selector))?;
        if !out.success() {
            return Err(classify("Get-NetFirewallRule", &out));
        }
        parse_rules(&out.stdout)
    }

    fn run(&self, what: &str, command: &str) -> Result<(), HostError> {
        let out = self.powershell.run(command)?;
        if out.success() {
            Ok(())
        } else {
            Err(classify(what, &out))
        }
    }
}

impl FirewallHost for NetFirewall {
    fn get_rule(&self, name: &str) -> Result<Option<FirewallRule>, HostError> {
        let selector = format!("Get-NetFirewallRule -Name {}", ps_quote(name));
        Ok(self.list(&selector)?.into_iter().next())
    }

    fn rules_with_prefix(&self, prefix: &str) -> Result<Vec<FirewallRule>, HostError> {
        let pattern = format!("{}*", prefix.replace(['*', '?', '[', ']'], ""));
        self.list(&format!("Get-NetFirewallRule -Name {}", ps_quote(&pattern)))
    }

    fn upsert_rule(&self, rule: &FirewallRule) -> Result<(), HostError> {
        self.run(
            &format!("New-NetFirewallRule {}", rule.name),
            &new_rule_command(rule),
        )
    }

    fn remove_rule(&self, name: &str) -> Result<bool, HostError> {
        if self.get_rule(name)?.is_none() {
            return Ok(false);
        }
        self.run(
            &format!("Remove-NetFirewallRule {name}"),
            &format!(
                "Remove-NetFirewallRule -Name {} -ErrorAction Stop",
                ps_quote(name)
            ),
        )?;
        Ok(true)
    }
}

impl std::fmt::Debug for NetFirewall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetFirewall").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object_and_any_filters() {
        let json = r#"{"Name":"hardline-block-smb-in","Direction":"Inbound","Action":"Block","Protocol":"TCP","RemoteAddress":["Any"],"RemotePort":"445","Program":"Any"}"#;
        let rules = parse_rules(json).expect("parse");
        assert_eq!(
            rules,
            vec![FirewallRule {
                name: "hardline-block-smb-in".to_string(),
                direction: FirewallDirection::Inbound,
                action: FirewallAction::Block,
                protocol: FirewallProtocol::Tcp,
                remote_addresses: Vec::new(),
                remote_ports: vec!["445".to_string()],
                program: None,
            }]
        );
    }

    #[test]
    fn arrays_and_empty_output() {
        let json = r#"[{"Name":"a-001","Direction":"Outbound","Action":"Block","Protocol":"Any","RemoteAddress":["203.0.113.1"],"RemotePort":["Any"],"Program":""},{"Name":"a-002","Direction":"Outbound","Action":"Allow"}]"#;
        let rules = parse_rules(json).expect("parse");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].remote_addresses, vec!["203.0.113.1".to_string()]);
        assert_eq!(rules[1].action, FirewallAction::Allow);
        assert!(parse_rules("  \r\n").expect("empty").is_empty());
    }

    #[test]
    fn new_rule_command_quotes_everything() {
        let rule = FirewallRule {
            name: "it's".to_string(),
            direction: FirewallDirection::Outbound,
            action: FirewallAction::Block,
            protocol: FirewallProtocol::Any,
            remote_addresses: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            remote_ports: Vec::new(),
            program: Some("C:\\Program Files\\x.exe".to_string()),
        };
        let cmd = new_rule_command(&rule);
        assert!(cmd.contains("-Name 'it''s'"), "{cmd}");
        assert!(cmd.contains("-RemoteAddress '10.0.0.1','10.0.0.2'"), "{cmd}");
        assert!(cmd.contains("-Program 'C:\\Program Files\\x.exe'"), "{cmd}");
        assert!(!cmd.contains("-RemotePort"));
    }
}
