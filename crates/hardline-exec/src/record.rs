use crate::HostError;
use hardline_types::{ChangeRecord, FailureKind, Operation, PolicyDefinition};
use time::OffsetDateTime;
use uuid::Uuid;

/// Fresh record for one attempt: new id, current time, not yet successful.
pub(crate) fn begin(operation: Operation, policy: &PolicyDefinition) -> ChangeRecord {
    ChangeRecord {
        change_id: Uuid::new_v4().to_string(),
        operation,
        policy_id: policy.policy_id.clone(),
        mechanism: policy.mechanism_kind(),
        applied_at: OffsetDateTime::now_utc(),
        previous_state: None,
        new_state: None,
        success: false,
        error_message: None,
        failure_kind: None,
        snapshot_id: None,
        description: String::new(),
    }
}

pub(crate) fn succeed(
    mut record: ChangeRecord,
    previous_state: Option<String>,
    new_state: Option<String>,
    description: impl Into<String>,
) -> ChangeRecord {
    record.previous_state = previous_state;
    record.new_state = new_state;
    record.success = true;
    record.description = description.into();
    tracing::debug!(
        policy_id = %record.policy_id,
        operation = record.operation.as_str(),
        description = %record.description,
        "change succeeded"
    );
    record
}

pub(crate) fn fail(
    mut record: ChangeRecord,
    previous_state: Option<String>,
    kind: FailureKind,
    message: impl Into<String>,
) -> ChangeRecord {
    let message = message.into();
    record.previous_state = previous_state;
    record.success = false;
    record.failure_kind = Some(kind);
    record.description = format!("{} failed: {message}", record.operation.as_str());
    record.error_message = Some(message);
    tracing::warn!(
        policy_id = %record.policy_id,
        operation = record.operation.as_str(),
        kind = kind.as_str(),
        error = record.error_message.as_deref().unwrap_or_default(),
        "change failed"
    );
    record
}

pub(crate) fn fail_host(
    record: ChangeRecord,
    previous_state: Option<String>,
    err: &HostError,
) -> ChangeRecord {
    fail(record, previous_state, err.failure_kind(), err.to_string())
}

pub(crate) fn wrong_mechanism(record: ChangeRecord, executor: &str) -> ChangeRecord {
    let message = format!(
        "{executor} executor cannot handle {} details",
        record.mechanism.as_str()
    );
    fail(record, None, FailureKind::Unsupported, message)
}
