//! Cooperative cancellation: a caller-owned token the retry loop observes.
//!
//! A `CancelToken` is a cheap cloneable handle around shared state. Any clone
//! may cancel it; every clone (and every child) then reports cancelled. A
//! token can also carry a deadline, after which it reports
//! `CancelError::DeadlineExceeded` without anyone calling `cancel`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

/// Why a token stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    /// `cancel` or `cancel_with_reason` was called (on this token or a parent).
    #[error("context canceled{}", reason_suffix(.reason))]
    Canceled { reason: Option<String> },
    /// The token's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

#[derive(Default)]
struct State {
    cause: Option<CancelError>,
    children: Vec<Weak<Inner>>,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    state: Mutex<State>,
    wake: Condvar,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Self {
        Inner {
            cancelled: AtomicBool::new(false),
            deadline,
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panic; take it back from a poisoned lock.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records `cause` unless already cancelled, then cascades to children.
    fn cancel(&self, cause: CancelError) {
        let children = {
            let mut state = self.lock();
            if state.cause.is_some() {
                return;
            }
            state.cause = Some(cause.clone());
            self.cancelled.store(true, Ordering::Release);
            std::mem::take(&mut state.children)
        };
        self.wake.notify_all();
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(cause.clone());
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Handle to a cancellation signal. Clones share the same signal.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("deadline", &self.inner.deadline)
            .field("error", &self.error())
            .finish()
    }
}

impl CancelToken {
    /// A token that is cancelled only when `cancel` is called.
    pub fn new() -> Self {
        CancelToken {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// A token nobody intends to cancel. Equivalent to `new()`; reads better at call sites.
    pub fn never() -> Self {
        Self::new()
    }

    /// A token that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        CancelToken {
            inner: Arc::new(Inner::new(Some(deadline))),
        }
    }

    /// A token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    /// A token cancelled whenever this one is. Cancelling the child leaves
    /// the parent untouched. The child inherits the parent's deadline.
    pub fn child(&self) -> Self {
        self.derive(self.inner.deadline)
    }

    /// Like `child`, but expires after `timeout` if the parent has not already.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now().checked_add(timeout);
        let deadline = match (self.inner.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.derive(deadline)
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        let child = Arc::new(Inner::new(deadline));
        let mut state = self.inner.lock();
        if let Some(cause) = state.cause.clone() {
            drop(state);
            child.cancel(cause);
        } else {
            state.children.retain(|w| w.strong_count() > 0);
            state.children.push(Arc::downgrade(&child));
        }
        CancelToken { inner: child }
    }

    /// Cancel this token and all of its children. Idempotent; the first cause wins.
    pub fn cancel(&self) {
        self.inner.cancel(CancelError::Canceled { reason: None });
    }

    /// Cancel with an explanation carried in the resulting `CancelError`.
    pub fn cancel_with_reason(&self, reason: impl Into<String>) {
        self.inner.cancel(CancelError::Canceled {
            reason: Some(reason.into()),
        });
    }

    /// True once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire) || self.inner.deadline_passed()
    }

    /// Why the token stopped, or `None` while it is still live.
    pub fn error(&self) -> Option<CancelError> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            if let Some(cause) = self.inner.lock().cause.clone() {
                return Some(cause);
            }
        }
        if self.inner.deadline_passed() {
            return Some(CancelError::DeadlineExceeded);
        }
        None
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Block for `duration`, waking early if the token is cancelled or its
    /// deadline passes. Returns true if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let until = Instant::now().checked_add(duration);
        let deadline = self.inner.deadline;
        let mut state = self.inner.lock();
        loop {
            if state.cause.is_some() {
                return false;
            }
            let now = Instant::now();
            if until.is_some_and(|u| u <= now) {
                return true;
            }
            if deadline.is_some_and(|d| d <= now) {
                return false;
            }
            let wake_at = match (until, deadline) {
                (Some(u), Some(d)) => Some(u.min(d)),
                (u, d) => u.or(d),
            };
            state = match wake_at {
                Some(at) => match self.inner.wake.wait_timeout(state, at - now) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => poisoned.into_inner().0,
                },
                None => match self.inner.wake.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }
}
