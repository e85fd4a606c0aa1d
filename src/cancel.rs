//! Cooperative cancellation shared by everything running inside one batch.
//!
//! A [`CancelToken`] is write-once: the first call to [`CancelToken::cancel`]
//! records why the batch stopped, later calls are no-ops. Readers only ever
//! load an atomic, so the polling loop and the batch loop never coordinate
//! with whoever sets the flag. Sleeping through a suspension point goes
//! through [`CancelToken::sleep`], which wakes early when the token is set.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

const NOT_CANCELLED: u8 = 0;
const USER: u8 = 1;
const TIMEOUT: u8 = 2;

/// Why a batch was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The operator pressed cancel (or hit Ctrl-C).
    User,
    /// The watchdog's global ceiling elapsed.
    Timeout,
}

impl CancelReason {
    fn encode(self) -> u8 {
        match self {
            Self::User => USER,
            Self::Timeout => TIMEOUT,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            USER => Some(Self::User),
            TIMEOUT => Some(Self::Timeout),
            _ => None,
        }
    }
}

/// Returned by a cancellable wait that was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug)]
struct Inner {
    reason: AtomicU8,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Shared, clonable cancellation flag for a single batch.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                reason: AtomicU8::new(NOT_CANCELLED),
                lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// Operator-initiated cancel. Returns `true` only for the call that
    /// actually set the token.
    pub fn request_cancel(&self) -> bool {
        self.cancel(CancelReason::User)
    }

    /// Set the token with `reason` unless it is already set.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let won = self
            .inner
            .reason
            .compare_exchange(
                NOT_CANCELLED,
                reason.encode(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            // Notify under the lock so a sleeper between its check and its
            // wait cannot miss the wakeup.
            let _guard = self
                .inner
                .lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.wake.notify_all();
        }
        won
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.load(Ordering::Acquire) != NOT_CANCELLED
    }

    /// The reason recorded by the first successful cancel, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        CancelReason::decode(self.inner.reason.load(Ordering::Acquire))
    }

    /// Fail fast when the token is already set.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, returning early with [`Cancelled`] if the token
    /// is set before or during the wait.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now() + duration;
        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            guard = self
                .inner
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
