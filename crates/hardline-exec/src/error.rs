use hardline_types::FailureKind;

/// Failure talking to the host.
///
/// `AccessDenied` is kept apart from `Failed` so callers can offer elevation instead of reporting a
/// generic error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("{0}")]
    Failed(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl HostError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            HostError::NotFound(_) => FailureKind::NotFound,
            HostError::AccessDenied(_) => FailureKind::Authorization,
            HostError::Failed(_) => FailureKind::Execution,
            HostError::Unsupported(_) => FailureKind::Unsupported,
        }
    }
}
