//! Cooperative cancellation and progress reporting for batch commands.

use hardline_types::PolicyId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancel flag. Clones observe the same flag.
///
/// Batches check it between policies, never in the middle of one.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reported after each policy of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
    pub policy_id: PolicyId,
}

impl Progress {
    pub fn new(processed: usize, total: usize, policy_id: PolicyId) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (processed.min(total) * 100 / total) as u8
        };
        Self {
            processed,
            total,
            percent,
            policy_id,
        }
    }
}

type ProgressFn<'a> = Box<dyn Fn(&Progress) + 'a>;

/// Per-call knobs for apply and revert.
#[derive(Default)]
pub struct BatchControl<'a> {
    cancel: CancellationToken,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> BatchControl<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(&Progress) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn report(&self, processed: usize, total: usize, policy_id: &PolicyId) {
        if let Some(callback) = &self.progress {
            callback(&Progress::new(processed, total, policy_id.clone()));
        }
    }
}

impl std::fmt::Debug for BatchControl<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchControl")
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
