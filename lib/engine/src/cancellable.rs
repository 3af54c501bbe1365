use crate::sparql::QueryEvaluationError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared flag that aborts running evaluations.
///
/// Clones share the flag. Evaluations check it between produced solutions, so a cancelled cursor
/// stops at the next row it would compute.
#[derive(Clone, Debug, Default)]
pub struct Cancellable {
    cancelled: Arc<AtomicBool>,
}

impl Cancellable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns [`QueryEvaluationError::Cancelled`] once [`Cancellable::cancel`] has been called.
    pub fn check(&self) -> Result<(), QueryEvaluationError> {
        if self.is_cancelled() {
            Err(QueryEvaluationError::Cancelled)
        } else {
            Ok(())
        }
    }
}
