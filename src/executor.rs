//! Per-item deletion sequence.
//!
//! ## State machine
//!
//! ```text
//! LocateContextMenu → OpenMenu → LocateDeleteControl → TriggerDelete
//!   → LocateConfirmControl → TriggerConfirm → AwaitRemoval → done
//! ```
//!
//! The sequence is linear. The cancel token is checked at every step
//! boundary and every wait observes it, so a cancelled batch never issues
//! another destructive click. Failures are returned as outcomes, never as
//! errors, after a best-effort dismiss gesture so a stuck overlay does not
//! block the next item.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cancel::{CancelToken, Cancelled};
use crate::poller::{self, PollError, PollSpec};
use crate::surface::{ActionKind, Control, ControlSelectors, Handle, Item, SelectorSet, Surface};

/// Step timeouts and delays for one sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub selectors: ControlSelectors,
    /// Interval between actionable-control checks.
    pub poll_interval: Duration,
    /// Interval between disappearance checks.
    pub removal_poll_interval: Duration,
    pub delete_timeout: Duration,
    pub confirm_timeout: Duration,
    pub removal_timeout: Duration,
    /// Fixed pause after every trigger, before the next check.
    pub settle_delay: Duration,
    /// Pause after the dismiss gesture that follows a failure.
    pub recovery_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            selectors: ControlSelectors::default(),
            poll_interval: Duration::from_millis(150),
            removal_poll_interval: Duration::from_millis(100),
            delete_timeout: Duration::from_secs(7),
            confirm_timeout: Duration::from_secs(7),
            removal_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_millis(150),
            recovery_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ItemNotFound,
    MenuControlNotFound,
    DeleteControlNotFound,
    ConfirmControlNotFound,
    DidNotDisappear,
    TriggerFailed { control: Control, detail: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemNotFound => f.write_str("item not found"),
            Self::MenuControlNotFound => f.write_str("menu control not found"),
            Self::DeleteControlNotFound => f.write_str("delete control not found"),
            Self::ConfirmControlNotFound => f.write_str("confirm control not found"),
            Self::DidNotDisappear => f.write_str("did not disappear in time"),
            Self::TriggerFailed { control, detail } => {
                write!(f, "could not trigger {control}: {detail}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The item left the surface before its sequence started.
    Vanished,
    /// Cancellation was observed mid-sequence.
    Aborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vanished => f.write_str("vanished"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Result of one attempted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Success,
    Failure(FailureReason),
    Skipped(SkipReason),
}

impl OperationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure(_) => "failure",
            Self::Skipped(_) => "skipped",
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::Failure(reason) => Some(reason.to_string()),
            Self::Skipped(reason) => Some(reason.to_string()),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Skipped(SkipReason::Aborted))
    }
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({reason})", self.label()),
            None => f.write_str(self.label()),
        }
    }
}

enum StepError {
    Skipped(SkipReason),
    Failed(FailureReason),
}

impl From<Cancelled> for StepError {
    fn from(_: Cancelled) -> Self {
        Self::Skipped(SkipReason::Aborted)
    }
}

impl StepError {
    fn from_poll(err: PollError, on_timeout: FailureReason) -> Self {
        match err {
            PollError::Cancelled => Self::Skipped(SkipReason::Aborted),
            PollError::NotFound { waited } => {
                debug!(waited_ms = waited.as_millis() as u64, reason = %on_timeout, "step timed out");
                Self::Failed(on_timeout)
            }
        }
    }
}

/// Drives the deletion sequence for one item at a time.
pub struct ActionSequence<'a, S: Surface + ?Sized> {
    surface: &'a S,
    config: &'a ExecutorConfig,
}

impl<'a, S: Surface + ?Sized> ActionSequence<'a, S> {
    pub fn new(surface: &'a S, config: &'a ExecutorConfig) -> Self {
        Self { surface, config }
    }

    pub fn execute(&self, item: &Item, token: &CancelToken) -> OperationOutcome {
        match self.run(item, token) {
            Ok(()) => {
                debug!(item = %item.id, "item deleted");
                OperationOutcome::Success
            }
            Err(StepError::Skipped(reason)) => {
                debug!(item = %item.id, reason = %reason, "item skipped");
                OperationOutcome::Skipped(reason)
            }
            Err(StepError::Failed(reason)) => {
                warn!(item = %item.id, reason = %reason, "item failed");
                self.recover(token);
                OperationOutcome::Failure(reason)
            }
        }
    }

    fn run(&self, item: &Item, token: &CancelToken) -> Result<(), StepError> {
        let selectors = &self.config.selectors;
        token.check()?;

        if !self.surface.still_present(&item.marker) {
            return Err(StepError::Skipped(SkipReason::Vanished));
        }

        // LocateContextMenu: never trust a handle from selection time.
        let row = self
            .surface
            .resolve(item)
            .ok_or(StepError::Failed(FailureReason::ItemNotFound))?;
        let menu = self
            .surface
            .locate(&selectors.menu_trigger, Some(&row))
            .ok_or(StepError::Failed(FailureReason::MenuControlNotFound))?;

        self.fire(&menu, Control::MenuTrigger, token)?;

        let delete = self
            .await_in_overlay(&selectors.delete_control, self.config.delete_timeout, token)
            .map_err(|e| StepError::from_poll(e, FailureReason::DeleteControlNotFound))?;
        self.fire(&delete, Control::DeleteControl, token)?;

        let confirm = self
            .await_in_overlay(&selectors.confirm_control, self.config.confirm_timeout, token)
            .map_err(|e| StepError::from_poll(e, FailureReason::ConfirmControlNotFound))?;
        self.fire(&confirm, Control::ConfirmControl, token)?;

        token.check()?;
        let spec = PollSpec::new(
            self.config.removal_timeout,
            self.config.removal_poll_interval,
        );
        poller::await_gone(self.surface, &row, spec, token)
            .map_err(|e| StepError::from_poll(e, FailureReason::DidNotDisappear))
    }

    /// Controls live inside the transient overlay, which is re-located on
    /// every check along with the control itself.
    fn await_in_overlay(
        &self,
        control: &SelectorSet,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<Handle, PollError> {
        token.check()?;
        let overlay = &self.config.selectors.overlay;
        let spec = PollSpec::new(timeout, self.config.poll_interval);
        poller::await_actionable(self.surface, spec, token, |surface| {
            let layer = surface.locate(overlay, None)?;
            surface.locate(control, Some(&layer))
        })
    }

    fn fire(&self, handle: &Handle, control: Control, token: &CancelToken) -> Result<(), StepError> {
        token.check()?;
        self.surface
            .trigger(handle, ActionKind::Activate)
            .map_err(|e| {
                StepError::Failed(FailureReason::TriggerFailed {
                    control,
                    detail: format!("{e:#}"),
                })
            })?;
        token.sleep(self.config.settle_delay)?;
        Ok(())
    }

    fn recover(&self, token: &CancelToken) {
        if let Err(e) = self.surface.dispatch_dismiss() {
            warn!(error = %e, "dismiss gesture failed");
        }
        let _ = token.sleep(self.config.recovery_delay);
    }
}
