//! Compatibility gate: does a policy apply to this host?
//!
//! Not applicable is a normal skip with a reason, not an error.

use hardline_types::{PolicyDefinition, SystemInfo};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Compatibility {
    Applicable,
    NotApplicable { reason: String },
}

impl Compatibility {
    pub fn is_applicable(&self) -> bool {
        matches!(self, Compatibility::Applicable)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Compatibility::Applicable => None,
            Compatibility::NotApplicable { reason } => Some(reason),
        }
    }
}

/// Evaluate build range and SKU filters.
///
/// A host build of `0` means "unknown"; build bounds are not enforced against it.
pub fn check_compatibility(policy: &PolicyDefinition, system: &SystemInfo) -> Compatibility {
    let Some(app) = &policy.applicability else {
        return Compatibility::Applicable;
    };

    if system.windows_build != 0 {
        if let Some(min) = app.min_build
            && system.windows_build < min
        {
            return Compatibility::NotApplicable {
                reason: format!(
                    "requires build {min} or newer (host is {})",
                    system.windows_build
                ),
            };
        }
        if let Some(max) = app.max_build
            && system.windows_build > max
        {
            return Compatibility::NotApplicable {
                reason: format!(
                    "requires build {max} or older (host is {})",
                    system.windows_build
                ),
            };
        }
    }

    let sku = system.sku.trim();
    if app
        .excluded_skus
        .iter()
        .any(|s| s.trim().eq_ignore_ascii_case(sku))
    {
        return Compatibility::NotApplicable {
            reason: format!("not supported on SKU {sku}"),
        };
    }
    if !app.included_skus.is_empty()
        && !app
            .included_skus
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(sku))
    {
        return Compatibility::NotApplicable {
            reason: format!(
                "only for SKUs {} (host is {sku})",
                app.included_skus.join(", ")
            ),
        };
    }

    Compatibility::Applicable
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardline_test_util::policies::{registry_policy, with_builds};

    fn host(build: u32, sku: &str) -> SystemInfo {
        SystemInfo {
            windows_build: build,
            sku: sku.to_string(),
            os_version: String::new(),
        }
    }

    #[test]
    fn no_applicability_means_applicable() {
        let p = registry_policy("p", "A", "1");
        assert!(check_compatibility(&p, &host(19045, "Professional")).is_applicable());
    }

    #[test]
    fn build_range_is_inclusive() {
        let p = with_builds(registry_policy("p", "A", "1"), Some(19041), Some(22631));
        assert!(check_compatibility(&p, &host(19041, "Professional")).is_applicable());
        assert!(check_compatibility(&p, &host(22631, "Professional")).is_applicable());

        let too_old = check_compatibility(&p, &host(17763, "Professional"));
        assert_eq!(
            too_old.reason(),
            Some("requires build 19041 or newer (host is 17763)")
        );
        assert!(!check_compatibility(&p, &host(26100, "Professional")).is_applicable());
    }

    #[test]
    fn unknown_build_skips_range_checks() {
        let p = with_builds(registry_policy("p", "A", "1"), Some(19041), None);
        assert!(check_compatibility(&p, &host(0, "Professional")).is_applicable());
    }

    #[test]
    fn sku_filters_are_case_insensitive() {
        let mut p = registry_policy("p", "A", "1");
        p.applicability = Some(hardline_types::Applicability {
            included_skus: vec!["Enterprise".into(), "Education".into()],
            excluded_skus: vec!["EnterpriseS".into()],
            ..Default::default()
        });
        assert!(check_compatibility(&p, &host(22631, "enterprise")).is_applicable());
        assert!(!check_compatibility(&p, &host(22631, "Core")).is_applicable());
        assert!(!check_compatibility(&p, &host(22631, "EnterpriseS")).is_applicable());
    }
}
