use super::process::{classify, run_program};
use crate::HostError;
use crate::host::{RegistryHost, RegistryValue};
use hardline_types::{RegistryHive, RegistryValueType};

/// Registry access through `reg.exe`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegExe;

const NOT_FOUND_MARKER: &str = "unable to find the specified registry key or value";

fn key_arg(hive: RegistryHive, key: &str) -> String {
    format!("{}\\{}", hive.as_str(), key.trim_matches('\\'))
}

/// `/v <name>`, or `/ve` for the key's default value.
fn value_args(name: &str) -> Vec<&str> {
    if name.is_empty() || name.eq_ignore_ascii_case("(Default)") {
        vec!["/ve"]
    } else {
        vec!["/v", name]
    }
}

/// DWORD/QWORD data is printed as `0x..`; it is stored as decimal.
fn normalize_data(value_type: RegistryValueType, raw: &str) -> String {
    match value_type {
        RegistryValueType::Dword | RegistryValueType::Qword => raw
            .strip_prefix("0x")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .map_or_else(|| raw.to_string(), |n| n.to_string()),
        _ => raw.to_string(),
    }
}

/// Find `name` in `reg query` output. Value lines are `    <name>    <REG_TYPE>    <data>`.
pub(crate) fn parse_query(output: &str, name: &str) -> Option<RegistryValue> {
    let wanted = if name.is_empty() { "(Default)" } else { name };
    output.lines().find_map(|line| {
        let line = line.trim_end_matches('\r');
        if !line.starts_with("    ") {
            return None;
        }
        let mut parts = line.trim_start().splitn(3, "    ");
        let value_name = parts.next()?;
        let value_type = RegistryValueType::from_reg_name(parts.next()?.trim())?;
        let data = parts.next().unwrap_or_default();
        value_name
            .eq_ignore_ascii_case(wanted)
            .then(|| RegistryValue {
                value_type,
                data: normalize_data(value_type, data),
            })
    })
}

impl RegistryHost for RegExe {
    fn get_value(
        &self,
        hive: RegistryHive,
        key: &str,
        name: &str,
    ) -> Result<Option<RegistryValue>, HostError> {
        let key = key_arg(hive, key);
        let mut args = vec!["query", key.as_str()];
        args.extend(value_args(name));
        let out = run_program("reg.exe", &args)?;
        if !out.success() {
            if out.stderr.to_ascii_lowercase().contains(NOT_FOUND_MARKER) {
                return Ok(None);
            }
            return Err(classify(&format!("reg query {key}"), &out));
        }
        Ok(parse_query(&out.stdout, name))
    }

    fn set_value(
        &self,
        hive: RegistryHive,
        key: &str,
        name: &str,
        value: &RegistryValue,
    ) -> Result<(), HostError> {
        let key = key_arg(hive, key);
        let mut args = vec!["add", key.as_str()];
        args.extend(value_args(name));
        args.extend(["/t", value.value_type.reg_name(), "/d", value.data.as_str(), "/f"]);
        let out = run_program("reg.exe", &args)?;
        if out.success() {
            Ok(())
        } else {
            Err(classify(&format!("reg add {key}"), &out))
        }
    }

    fn delete_value(&self, hive: RegistryHive, key: &str, name: &str) -> Result<bool, HostError> {
        if self.get_value(hive, key, name)?.is_none() {
            return Ok(false);
        }
        let key = key_arg(hive, key);
        let mut args = vec!["delete", key.as_str()];
        args.extend(value_args(name));
        args.push("/f");
        let out = run_program("reg.exe", &args)?;
        if out.success() {
            Ok(true)
        } else {
            Err(classify(&format!("reg delete {key}"), &out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "\r\nHKEY_LOCAL_MACHINE\\SOFTWARE\\Policies\\Microsoft\\Windows\\DataCollection\r\n    AllowTelemetry    REG_DWORD    0x1\r\n    Commercial Id    REG_SZ    contoso lab\r\n    Empty    REG_SZ    \r\n\r\n";

    #[test]
    fn parses_dword_as_decimal() {
        let v = parse_query(QUERY, "allowtelemetry").expect("found");
        assert_eq!(v.value_type, RegistryValueType::Dword);
        assert_eq!(v.data, "1");
    }

    #[test]
    fn names_and_data_may_contain_spaces() {
        let v = parse_query(QUERY, "Commercial Id").expect("found");
        assert_eq!(v.data, "contoso lab");
        assert_eq!(parse_query(QUERY, "Empty").expect("found").data, "");
    }

    #[test]
    fn missing_value_is_none() {
        assert_eq!(parse_query(QUERY, "Other"), None);
        assert_eq!(parse_query(QUERY, "HKEY_LOCAL_MACHINE"), None);
    }

    #[test]
    fn default_value_uses_ve() {
        assert_eq!(value_args(""), vec!["/ve"]);
        assert_eq!(value_args("X"), vec!["/v", "X"]);
    }
}
