//! Bounded polling against the surface.
//!
//! The surface offers no change notifications, so every wait is a polling
//! loop: check immediately, then once per interval until the condition is
//! satisfied, the batch is cancelled, or the timeout elapses.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::cancel::{CancelToken, Cancelled};
use crate::surface::{Handle, Surface};

/// Timing for one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSpec {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("condition not met within {}ms", waited.as_millis())]
    NotFound { waited: Duration },
    #[error("wait cancelled")]
    Cancelled,
}

impl From<Cancelled> for PollError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Call `check` until it yields a value.
///
/// The first check runs before any wait, so an already-satisfied condition
/// returns with no delay. Waits are cut to the remaining budget, so the last
/// check lands at the deadline rather than past it.
pub fn poll_until<T, F>(spec: PollSpec, token: &CancelToken, mut check: F) -> Result<T, PollError>
where
    F: FnMut() -> Option<T>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Some(value) = check() {
            trace!(attempts, "poll satisfied");
            return Ok(value);
        }

        let waited = start.elapsed();
        if waited >= spec.timeout {
            trace!(attempts, waited_ms = waited.as_millis() as u64, "poll timed out");
            return Err(PollError::NotFound { waited });
        }

        token.sleep(spec.interval.min(spec.timeout - waited))?;
    }
}

/// Wait for a control to become actionable.
///
/// `locate` runs on every check so stale handles are never reused. A control
/// that is found but hidden or disabled keeps the wait going.
pub fn await_actionable<S, F>(
    surface: &S,
    spec: PollSpec,
    token: &CancelToken,
    mut locate: F,
) -> Result<Handle, PollError>
where
    S: Surface + ?Sized,
    F: FnMut(&S) -> Option<Handle>,
{
    poll_until(spec, token, || {
        locate(surface).filter(|handle| surface.is_actionable(handle))
    })
}

/// Wait for `handle` to be detached from the surface or stop rendering.
pub fn await_gone<S>(
    surface: &S,
    handle: &Handle,
    spec: PollSpec,
    token: &CancelToken,
) -> Result<(), PollError>
where
    S: Surface + ?Sized,
{
    poll_until(spec, token, || (!surface.still_present(handle)).then_some(()))
}
