use crate::host::{ServiceHost, ServiceInfo};
use crate::record::{begin, fail, fail_host, succeed, wrong_mechanism};
use crate::{HostError, PolicyExecutor, Reversibility};
use hardline_domain::expected::NOT_PRESENT;
use hardline_domain::state_kv::{format_state, parse_state, state_bool};
use hardline_types::{
    ChangeRecord, FailureKind, Mechanism, MechanismDetails, Operation, PolicyDefinition,
    ServiceDetails, ServiceStartupType,
};
use std::sync::Arc;

const STARTUP_KEY: &str = "StartupType";
const RUNNING_KEY: &str = "Running";

pub struct ServiceExecutor {
    host: Arc<dyn ServiceHost>,
}

fn details(policy: &PolicyDefinition) -> Option<&ServiceDetails> {
    match &policy.mechanism {
        MechanismDetails::Service(d) => Some(d),
        _ => None,
    }
}

fn encode(info: &ServiceInfo) -> String {
    format_state(&[
        (STARTUP_KEY, info.startup_type.clone()),
        (RUNNING_KEY, info.running.to_string()),
    ])
}

fn matches(d: &ServiceDetails, info: &ServiceInfo) -> bool {
    ServiceStartupType::parse(&info.startup_type) == Some(d.startup_type)
        && (!d.stop_service || !info.running)
}

impl ServiceExecutor {
    pub fn new(host: Arc<dyn ServiceHost>) -> Self {
        Self { host }
    }

    /// Undo a startup-type change whose follow-up stop failed, so the failed record leaves the
    /// host as it found it.
    fn roll_back_startup(
        &self,
        record: ChangeRecord,
        name: &str,
        before: &ServiceInfo,
        previous: String,
        cause: &HostError,
    ) -> ChangeRecord {
        match self.host.set_startup_type(name, &before.startup_type) {
            Ok(()) => fail_host(record, Some(previous), cause),
            Err(rollback) => {
                tracing::error!(
                    service = %name,
                    error = %rollback,
                    "startup type left changed after failed stop"
                );
                fail(
                    record,
                    Some(previous),
                    cause.failure_kind(),
                    format!(
                        "{cause}; restoring startup type {} also failed: {rollback}",
                        before.startup_type
                    ),
                )
            }
        }
    }
}

impl PolicyExecutor for ServiceExecutor {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Service
    }

    /// An uninstalled service satisfies a policy that disables it.
    fn is_applied(&self, policy: &PolicyDefinition) -> Result<bool, HostError> {
        let Some(d) = details(policy) else {
            return Ok(false);
        };
        Ok(match self.host.query(&d.service_name)? {
            Some(info) => matches(d, &info),
            None => d.startup_type == ServiceStartupType::Disabled,
        })
    }

    fn current_value(&self, policy: &PolicyDefinition) -> Result<String, HostError> {
        let Some(d) = details(policy) else {
            return Ok(NOT_PRESENT.to_string());
        };
        Ok(self
            .host
            .query(&d.service_name)?
            .map_or_else(|| NOT_PRESENT.to_string(), |info| encode(&info)))
    }

    fn apply(&self, policy: &PolicyDefinition) -> ChangeRecord {
        let record = begin(Operation::Apply, policy);
        let Some(d) = details(policy) else {
            return wrong_mechanism(record, "service");
        };
        let name = &d.service_name;

        let before = match self.host.query(name) {
            Ok(Some(info)) => info,
            Ok(None) => {
                return succeed(
                    record,
                    None,
                    None,
                    format!("Service {name} not installed; nothing to change"),
                );
            }
            Err(e) => return fail_host(record, None, &e),
        };
        let previous = encode(&before);

        if let Err(e) = self.host.set_startup_type(name, d.startup_type.as_str()) {
            return fail_host(record, Some(previous), &e);
        }
        let mut stopped = false;
        if d.stop_service && before.running {
            if let Err(e) = self.host.stop(name) {
                return self.roll_back_startup(record, name, &before, previous, &e);
            }
            stopped = true;
        }

        let after = ServiceInfo {
            startup_type: d.startup_type.as_str().to_string(),
            running: before.running && !stopped,
        };
        let mut description = format!(
            "Set {name} startup type {} -> {}",
            before.startup_type,
            d.startup_type.as_str()
        );
        if stopped {
            description.push_str(" and stopped it");
        }
        succeed(record, Some(previous), Some(encode(&after)), description)
    }

    fn revert(&self, policy: &PolicyDefinition, original: &ChangeRecord) -> ChangeRecord {
        let record = begin(Operation::Revert, policy);
        let Some(d) = details(policy) else {
            return wrong_mechanism(record, "service");
        };
        let name = &d.service_name;

        let Some(prior) = original.previous_state.as_deref() else {
            return succeed(
                record,
                None,
                None,
                format!("Service {name} was not installed at apply; nothing to restore"),
            );
        };
        let prior = parse_state(prior);
        let Some(startup) = prior.get(STARTUP_KEY) else {
            return fail(
                record,
                None,
                FailureKind::Execution,
                format!("change {} has no prior startup type", original.change_id),
            );
        };
        let was_running = state_bool(&prior, RUNNING_KEY).unwrap_or(false);

        let current = match self.host.query(name) {
            Ok(Some(info)) => info,
            Ok(None) => {
                return succeed(
                    record,
                    None,
                    None,
                    format!("Service {name} no longer installed; nothing to restore"),
                );
            }
            Err(e) => return fail_host(record, None, &e),
        };
        let before = encode(&current);

        if let Err(e) = self.host.set_startup_type(name, startup) {
            return fail_host(record, Some(before), &e);
        }
        let mut restarted = false;
        if was_running && !current.running {
            if let Err(e) = self.host.start(name) {
                return fail_host(record, Some(before), &e);
            }
            restarted = true;
        }

        let after = ServiceInfo {
            startup_type: startup.clone(),
            running: current.running || restarted,
        };
        let mut description = format!("Restored {name} startup type to {startup}");
        if restarted {
            description.push_str(" and restarted it");
        }
        succeed(record, Some(before), Some(encode(&after)), description)
    }

    fn reversibility(&self, _policy: &PolicyDefinition) -> Reversibility {
        Reversibility::Reversible
    }
}

impl std::fmt::Debug for ServiceExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryServices;
    use hardline_test_util::policies::service_policy;

    fn stopping(mut p: PolicyDefinition) -> PolicyDefinition {
        if let MechanismDetails::Service(d) = &mut p.mechanism {
            d.stop_service = true;
        }
        p
    }

    #[test]
    fn apply_records_literal_prior_state_and_revert_restores_it() {
        let host = Arc::new(MemoryServices::default());
        host.install("DiagTrack", "AutomaticDelayedStart", true);
        let exec = ServiceExecutor::new(host.clone());
        let p = stopping(service_policy("svc-001", "DiagTrack", ServiceStartupType::Disabled));

        let applied = exec.apply(&p);
        assert!(applied.success, "{applied:?}");
        assert_eq!(
            applied.previous_state.as_deref(),
            Some("StartupType=AutomaticDelayedStart;Running=true")
        );
        assert_eq!(
            applied.new_state.as_deref(),
            Some("StartupType=Disabled;Running=false")
        );
        assert!(exec.is_applied(&p).expect("probe"));

        let reverted = exec.revert(&p, &applied);
        assert!(reverted.success, "{reverted:?}");
        assert_eq!(
            host.info("DiagTrack"),
            Some(ServiceInfo {
                startup_type: "AutomaticDelayedStart".to_string(),
                running: true,
            })
        );
    }

    #[test]
    fn missing_service_is_a_no_op() {
        let exec = ServiceExecutor::new(Arc::new(MemoryServices::default()));
        let p = service_policy("svc-009", "Ghost", ServiceStartupType::Disabled);
        let rec = exec.apply(&p);
        assert!(rec.success);
        assert!(rec.description.contains("not installed"));
        assert!(exec.is_applied(&p).expect("probe"));
        assert_eq!(exec.current_value(&p).expect("probe"), NOT_PRESENT);
    }

    /// Startup changes go through; stopping is refused.
    #[derive(Debug, Default)]
    struct Unstoppable {
        inner: MemoryServices,
        refuse_startup_restore: bool,
    }

    impl ServiceHost for Unstoppable {
        fn query(&self, name: &str) -> Result<Option<ServiceInfo>, HostError> {
            self.inner.query(name)
        }

        fn set_startup_type(&self, name: &str, startup_type: &str) -> Result<(), HostError> {
            if self.refuse_startup_restore && startup_type != "Disabled" {
                return Err(HostError::Failed("service control manager busy".to_string()));
            }
            self.inner.set_startup_type(name, startup_type)
        }

        fn stop(&self, name: &str) -> Result<(), HostError> {
            Err(HostError::Failed(format!("{name} did not stop")))
        }

        fn start(&self, name: &str) -> Result<(), HostError> {
            self.inner.start(name)
        }
    }

    #[test]
    fn failed_stop_restores_the_startup_type() {
        let host = Arc::new(Unstoppable::default());
        host.inner.install("DiagTrack", "Automatic", true);
        let exec = ServiceExecutor::new(host.clone());
        let p = stopping(service_policy("svc-001", "DiagTrack", ServiceStartupType::Disabled));

        let rec = exec.apply(&p);

        assert!(!rec.success);
        assert_eq!(rec.failure_kind, Some(FailureKind::Execution));
        assert_eq!(
            host.inner.info("DiagTrack"),
            Some(ServiceInfo {
                startup_type: "Automatic".to_string(),
                running: true,
            })
        );
    }

    #[test]
    fn failed_rollback_is_named_in_the_record() {
        let host = Arc::new(Unstoppable {
            refuse_startup_restore: true,
            ..Unstoppable::default()
        });
        host.inner.install("DiagTrack", "Automatic", true);
        let exec = ServiceExecutor::new(host);
        let p = stopping(service_policy("svc-001", "DiagTrack", ServiceStartupType::Disabled));

        let rec = exec.apply(&p);

        assert!(!rec.success);
        let message = rec.error_message.expect("message");
        assert!(message.contains("did not stop"), "{message}");
        assert!(message.contains("restoring startup type Automatic also failed"), "{message}");
    }

    #[test]
    fn failures_are_records_not_errors() {
        let host = Arc::new(MemoryServices::default());
        host.install("WinDefend", "Automatic", true);
        host.deny("WinDefend");
        let exec = ServiceExecutor::new(host);
        let rec = exec.apply(&service_policy("svc-003", "WinDefend", ServiceStartupType::Disabled));
        assert!(!rec.success);
        assert_eq!(rec.failure_kind, Some(FailureKind::Authorization));
        assert_eq!(
            rec.previous_state.as_deref(),
            Some("StartupType=Automatic;Running=true")
        );
    }
}
