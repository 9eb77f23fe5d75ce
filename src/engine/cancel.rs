//! Cancellation tokens for long-running optimization work.
//!
//! A token combines a caller-initiated trip wire with optional soft and hard
//! deadlines. The optimizer checks it at the head of every iteration; the
//! hot inner loops never look at the clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Soft budget elapsed: finish cleanly, not reported as cancelled.
    SoftBudget,
    /// Hard cap elapsed or the caller tripped the token: equivalent to
    /// cancellation, best-so-far is returned with `cancelled = true`.
    Cancelled,
}

/// Shared cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tripped: Arc<AtomicBool>,
    started: Instant,
    soft_deadline: Option<Duration>,
    hard_deadline: Option<Duration>,
}

impl CancelToken {
    /// Token that never fires on its own; only [`CancelToken::cancel`]
    /// stops it.
    pub fn unbounded() -> Self {
        Self {
            tripped: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            soft_deadline: None,
            hard_deadline: None,
        }
    }

    /// Token with the given budgets, measured from now.
    pub fn with_budget(soft: Option<Duration>, hard: Option<Duration>) -> Self {
        Self {
            tripped: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            soft_deadline: soft,
            hard_deadline: hard,
        }
    }

    /// Trip the token from another task or thread.
    pub fn cancel(&self) {
        self.tripped.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.tripped.load(Ordering::Relaxed) {
            return true;
        }
        matches!(self.check(), Some(StopReason::Cancelled))
    }

    /// Poll the token. `None` means keep going.
    pub fn check(&self) -> Option<StopReason> {
        if self.tripped.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }
        let elapsed = self.started.elapsed();
        if let Some(hard) = self.hard_deadline {
            if elapsed >= hard {
                return Some(StopReason::Cancelled);
            }
        }
        if let Some(soft) = self.soft_deadline {
            if elapsed >= soft {
                return Some(StopReason::SoftBudget);
            }
        }
        None
    }
}
