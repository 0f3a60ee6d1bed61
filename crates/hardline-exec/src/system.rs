use crate::host::RegistryHost;
use hardline_types::{RegistryHive, SystemInfo};
use std::sync::Arc;

pub trait SystemInfoProvider: Send + Sync {
    /// Never fails; unknown fields come back as build `0` or empty strings.
    fn system_info(&self) -> SystemInfo;
}

const CURRENT_VERSION: &str = "SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion";

/// Build, edition and display version from the `CurrentVersion` registry key.
pub struct RegistrySystemInfo {
    registry: Arc<dyn RegistryHost>,
}

impl RegistrySystemInfo {
    pub fn new(registry: Arc<dyn RegistryHost>) -> Self {
        Self { registry }
    }

    fn read(&self, name: &str) -> Option<String> {
        match self
            .registry
            .get_value(RegistryHive::LocalMachine, CURRENT_VERSION, name)
        {
            Ok(v) => v.map(|v| v.data),
            Err(e) => {
                tracing::warn!(value = name, error = %e, "could not read system version value");
                None
            }
        }
    }
}

impl SystemInfoProvider for RegistrySystemInfo {
    fn system_info(&self) -> SystemInfo {
        let build = self.read("CurrentBuildNumber");
        let windows_build = match build.as_deref().map(|b| b.trim().parse::<u32>()) {
            Some(Ok(b)) => b,
            _ => {
                tracing::warn!(
                    raw = build.as_deref().unwrap_or_default(),
                    "host build unknown; build-range applicability checks are skipped"
                );
                0
            }
        };
        let os_version = [self.read("ProductName"), self.read("DisplayVersion")]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        SystemInfo {
            windows_build,
            sku: self.read("EditionID").unwrap_or_default(),
            os_version,
        }
    }
}

impl std::fmt::Debug for RegistrySystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySystemInfo").finish_non_exhaustive()
    }
}

/// Fixed answer, for tests and for callers that already know the host.
#[derive(Clone, Debug)]
pub struct StaticSystemInfo(pub SystemInfo);

impl StaticSystemInfo {
    pub fn new(windows_build: u32, sku: &str) -> Self {
        Self(SystemInfo {
            windows_build,
            sku: sku.to_string(),
            os_version: String::new(),
        })
    }
}

impl SystemInfoProvider for StaticSystemInfo {
    fn system_info(&self) -> SystemInfo {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegistryValue;
    use crate::memory::MemoryRegistry;
    use hardline_types::RegistryValueType;

    fn string(data: &str) -> RegistryValue {
        RegistryValue {
            value_type: RegistryValueType::String,
            data: data.to_string(),
        }
    }

    #[test]
    fn reads_current_version_values() {
        let reg = Arc::new(MemoryRegistry::default());
        let hklm = RegistryHive::LocalMachine;
        reg.insert(hklm, CURRENT_VERSION, "CurrentBuildNumber", string("22631"));
        reg.insert(hklm, CURRENT_VERSION, "EditionID", string("Professional"));
        reg.insert(hklm, CURRENT_VERSION, "ProductName", string("Windows 10 Pro"));
        reg.insert(hklm, CURRENT_VERSION, "DisplayVersion", string("23H2"));

        let info = RegistrySystemInfo::new(reg).system_info();
        assert_eq!(info.windows_build, 22631);
        assert_eq!(info.sku, "Professional");
        assert_eq!(info.os_version, "Windows 10 Pro 23H2");
    }

    #[test]
    fn unreadable_build_is_zero() {
        let info = RegistrySystemInfo::new(Arc::new(MemoryRegistry::default())).system_info();
        assert_eq!(info.windows_build, 0);
        assert_eq!(info.sku, "");
    }
}
