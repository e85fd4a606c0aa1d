//! Orchestrator: sequential bulk-delete driver.
//!
//! Owns one batch at a time. For every run it:
//! 1. Claims the single-batch slot (a second concurrent run is rejected)
//! 2. Captures the item list, creates a fresh cancel token and arms the watchdog
//! 3. Runs the deletion sequence for each item, strictly in selection order
//! 4. Publishes a progress snapshot after every attempted item
//! 5. Stops at the next checkpoint once cancellation or a timeout is observed
//! 6. Disarms the watchdog, publishes the terminal message and tears down
//!
//! ## State machine
//!
//! ```text
//! Idle → Preparing → Running → Completed | Cancelled | TimedOut
//!                                 → Finalizing → Idle
//! ```
//!
//! Items are never processed in parallel: the menus and dialogs of the
//! surface are one shared resource.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::{CancelReason, CancelToken};
use crate::executor::{ActionSequence, ExecutorConfig, OperationOutcome};
use crate::progress::{ProgressReporter, ProgressSnapshot};
use crate::surface::{Item, Surface};
use crate::watchdog::Watchdog;

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Per-item step timings and selectors.
    pub executor: ExecutorConfig,
    /// Global ceiling on one batch's duration.
    pub watchdog_timeout: Duration,
    /// Cancellable pause before the first item.
    pub start_delay: Duration,
    /// Yield to the host every N items (0 disables).
    pub yield_every: usize,
    pub yield_pause: Duration,
    /// How long the terminal message stays up before teardown.
    pub terminal_hold: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            watchdog_timeout: Duration::from_secs(30),
            start_delay: Duration::from_millis(500),
            yield_every: 20,
            yield_pause: Duration::from_millis(10),
            terminal_hold: Duration::from_millis(2200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Preparing,
    Running,
    Completed,
    Cancelled,
    TimedOut,
    Finalizing,
}

/// How the item loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Completed,
    Cancelled,
    TimedOut,
}

impl From<CancelReason> for TerminalState {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::User => Self::Cancelled,
            CancelReason::Timeout => Self::TimedOut,
        }
    }
}

impl From<TerminalState> for BatchState {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Completed => Self::Completed,
            TerminalState::Cancelled => Self::Cancelled,
            TerminalState::TimedOut => Self::TimedOut,
        }
    }
}

/// Aggregate result, finalized exactly once per batch.
///
/// `skipped` includes items that were never attempted, so
/// `succeeded + failed + skipped == total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Stopped early, by the operator or the watchdog.
    pub cancelled: bool,
    pub state: TerminalState,
}

/// Operator-facing summary chosen from the final counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMessage {
    NoItems,
    AllSucceeded { total: usize },
    PartialSuccess { succeeded: usize, failed: usize, total: usize },
    AllFailed { total: usize },
    NothingDeleted { failed: usize, skipped: usize },
    Cancelled,
    TimedOut,
}

impl TerminalMessage {
    /// Cancellation and timeout win over the counts.
    pub fn classify(result: &BatchResult) -> Self {
        match result.state {
            TerminalState::Cancelled => return Self::Cancelled,
            TerminalState::TimedOut => return Self::TimedOut,
            TerminalState::Completed => {}
        }

        let BatchResult {
            total,
            succeeded,
            failed,
            skipped,
            ..
        } = *result;
        if total == 0 {
            Self::NoItems
        } else if succeeded == total && failed == 0 {
            Self::AllSucceeded { total }
        } else if succeeded > 0 {
            Self::PartialSuccess {
                succeeded,
                failed,
                total,
            }
        } else if failed == total {
            Self::AllFailed { total }
        } else {
            Self::NothingDeleted { failed, skipped }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoItems => "no_items",
            Self::AllSucceeded { .. } => "all_succeeded",
            Self::PartialSuccess { .. } => "partial_success",
            Self::AllFailed { .. } => "all_failed",
            Self::NothingDeleted { .. } => "nothing_deleted",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    /// Whether the UI should show its completion tick.
    pub fn is_affirmative(&self) -> bool {
        match self {
            Self::AllSucceeded { .. } => true,
            Self::PartialSuccess {
                succeeded, failed, ..
            } => succeeded >= failed,
            _ => false,
        }
    }
}

impl fmt::Display for TerminalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems => f.write_str("No items selected."),
            Self::AllSucceeded { total } => write!(f, "All {total} items deleted."),
            Self::PartialSuccess {
                succeeded, total, ..
            } => write!(f, "Deleted {succeeded} of {total} items."),
            Self::AllFailed { total } => write!(f, "Could not delete any of the {total} items."),
            Self::NothingDeleted { .. } => f.write_str("No items were deleted."),
            Self::Cancelled => f.write_str("Deletion cancelled."),
            Self::TimedOut => {
                f.write_str("Deletion stopped: the operation took too long. Try a smaller batch.")
            }
        }
    }
}

/// Callbacks for batch events (console output, execution log, UI).
///
/// All callbacks run synchronously on the batch thread, in order.
pub trait BatchObserver: Send {
    fn on_state(&mut self, _state: BatchState) {}
    fn on_started(&mut self, _batch_id: &str, _total: usize) {}
    fn on_outcome(&mut self, _index: usize, _item: &Item, _outcome: &OperationOutcome) {}
    fn on_progress(&mut self, snapshot: &ProgressSnapshot);
    fn on_terminal(&mut self, result: &BatchResult, message: &TerminalMessage);
}

/// Fans every callback out to several observers.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn BatchObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Box<dyn BatchObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl BatchObserver for ObserverSet {
    fn on_state(&mut self, state: BatchState) {
        for o in &mut self.observers {
            o.on_state(state);
        }
    }

    fn on_started(&mut self, batch_id: &str, total: usize) {
        for o in &mut self.observers {
            o.on_started(batch_id, total);
        }
    }

    fn on_outcome(&mut self, index: usize, item: &Item, outcome: &OperationOutcome) {
        for o in &mut self.observers {
            o.on_outcome(index, item, outcome);
        }
    }

    fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
        for o in &mut self.observers {
            o.on_progress(snapshot);
        }
    }

    fn on_terminal(&mut self, result: &BatchResult, message: &TerminalMessage) {
        for o in &mut self.observers {
            o.on_terminal(result, message);
        }
    }
}

/// Prints progress to stdout.
pub struct ConsoleObserver;

impl ConsoleObserver {
    fn print(line: &str) {
        println!("\x1b[36m[sweep]\x1b[0m {line}");
    }
}

impl BatchObserver for ConsoleObserver {
    fn on_started(&mut self, batch_id: &str, total: usize) {
        Self::print(&format!("● deleting {total} items (batch {batch_id})"));
    }

    fn on_outcome(&mut self, index: usize, item: &Item, outcome: &OperationOutcome) {
        if !matches!(outcome, OperationOutcome::Success) {
            Self::print(&format!("✗ #{} {}: {outcome}", index + 1, item.id));
        }
    }

    fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
        Self::print(&format!(
            "→ {} [{:.0}%]",
            snapshot.status_line(),
            snapshot.percent()
        ));
    }

    fn on_terminal(&mut self, result: &BatchResult, message: &TerminalMessage) {
        let symbol = if message.is_affirmative() { "✓" } else { "⚠" };
        Self::print(&format!("{symbol} {message}"));
        Self::print(&format!(
            "  deleted {} · failed {} · skipped {} · total {}",
            result.succeeded, result.failed, result.skipped, result.total
        ));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("a batch is already running")]
    AlreadyRunning,
    #[error("failed to start the batch watchdog")]
    WatchdogSpawn(#[source] std::io::Error),
}

/// Everything scoped to one batch. Dropped when the batch is torn down.
pub struct BatchSession {
    pub id: String,
    items: Vec<Item>,
    token: CancelToken,
    reporter: ProgressReporter,
    watchdog: Option<Watchdog>,
}

impl BatchSession {
    fn prepare(
        items: Vec<Item>,
        token: CancelToken,
        watchdog_timeout: Duration,
    ) -> Result<Self, OrchestratorError> {
        let id = Uuid::new_v4().to_string();
        // Nothing to guard for an empty batch.
        let watchdog = if items.is_empty() {
            None
        } else {
            let on_timeout = token.clone();
            let watchdog = Watchdog::arm(watchdog_timeout, move || {
                on_timeout.cancel(CancelReason::Timeout);
            })
            .map_err(OrchestratorError::WatchdogSpawn)?;
            Some(watchdog)
        };

        Ok(Self {
            id,
            reporter: ProgressReporter::new(items.len()),
            items,
            token,
            watchdog,
        })
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

/// Releases the single-batch slot even if the run unwinds.
struct ActiveGuard<'a> {
    active: &'a Mutex<Option<CancelToken>>,
    state: &'a Mutex<BatchState>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        *lock(self.active) = None;
        *lock(self.state) = BatchState::Idle;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Orchestrator<S: Surface> {
    surface: S,
    config: OrchestratorConfig,
    active: Mutex<Option<CancelToken>>,
    state: Mutex<BatchState>,
}

impl<S: Surface> Orchestrator<S> {
    pub fn new(surface: S, config: OrchestratorConfig) -> Self {
        Self {
            surface,
            config,
            active: Mutex::new(None),
            state: Mutex::new(BatchState::Idle),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn state(&self) -> BatchState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Ask the active batch to stop. Returns `true` only when this call set
    /// the token; repeated calls and calls with no active batch are no-ops.
    pub fn cancel(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(token) => {
                let set = token.request_cancel();
                if set {
                    info!("cancellation requested");
                }
                set
            }
            None => false,
        }
    }

    /// Run one batch to completion on the calling thread.
    ///
    /// Only contract violations are errors; every per-item problem ends up
    /// in the returned [`BatchResult`].
    pub fn run_batch(
        &self,
        items: Vec<Item>,
        observer: &mut dyn BatchObserver,
    ) -> Result<BatchResult, OrchestratorError> {
        let token = CancelToken::new();
        let _guard = self.claim(&token)?;

        self.transition(BatchState::Preparing, observer);
        let mut session =
            BatchSession::prepare(items, token, self.config.watchdog_timeout)?;
        let end = if session.total() == 0 {
            debug!(batch = %session.id, "nothing selected");
            TerminalState::Completed
        } else {
            info!(batch = %session.id, total = session.total(), "batch starting");
            observer.on_started(&session.id, session.total());
            self.transition(BatchState::Running, observer);
            self.run_items(&mut session, observer)
        };

        Ok(self.finalize(session, end, observer))
    }

    fn claim(&self, token: &CancelToken) -> Result<ActiveGuard<'_>, OrchestratorError> {
        let mut active = lock(&self.active);
        if active.is_some() {
            warn!("rejecting new batch: another batch is running");
            return Err(OrchestratorError::AlreadyRunning);
        }
        *active = Some(token.clone());
        Ok(ActiveGuard {
            active: &self.active,
            state: &self.state,
        })
    }

    fn run_items(&self, session: &mut BatchSession, observer: &mut dyn BatchObserver) -> TerminalState {
        let token = &session.token;
        if token.sleep(self.config.start_delay).is_err() {
            return stop_state(token);
        }

        let executor = ActionSequence::new(&self.surface, &self.config.executor);
        let total = session.items.len();
        for (index, item) in session.items.iter().enumerate() {
            if token.is_cancelled() {
                info!(batch = %session.id, remaining = total - index, "stopping before next item");
                return stop_state(token);
            }

            debug!(batch = %session.id, index, item = %item.id, "attempting item");
            let outcome = executor.execute(item, token);
            observer.on_outcome(index, item, &outcome);
            session.reporter.update(index, &outcome, observer);

            if outcome.is_aborted() {
                return stop_state(token);
            }

            let done = index + 1;
            if self.config.yield_every > 0 && done % self.config.yield_every == 0 && done < total {
                std::thread::yield_now();
                let _ = token.sleep(self.config.yield_pause);
            }
        }

        TerminalState::Completed
    }

    fn finalize(
        &self,
        mut session: BatchSession,
        end: TerminalState,
        observer: &mut dyn BatchObserver,
    ) -> BatchResult {
        self.transition(end.into(), observer);
        self.transition(BatchState::Finalizing, observer);

        let fired = session.watchdog.take().is_some_and(Watchdog::disarm);
        if fired && end == TerminalState::Completed {
            debug!(batch = %session.id, "watchdog fired after the last item; keeping completed state");
        }

        let result = session.reporter.finalize(end);
        let message = TerminalMessage::classify(&result);
        info!(
            batch = %session.id,
            state = ?result.state,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            total = result.total,
            "batch finished: {message}"
        );
        observer.on_terminal(&result, &message);

        // The hold keeps the final status readable; an empty batch has none.
        if result.total > 0 && !self.config.terminal_hold.is_zero() {
            std::thread::sleep(self.config.terminal_hold);
        }

        if let Err(e) = self.surface.clear_selection() {
            warn!(error = %e, "failed to clear selection");
        }
        drop(session);
        self.transition(BatchState::Idle, observer);
        result
    }

    fn transition(&self, state: BatchState, observer: &mut dyn BatchObserver) {
        *lock(&self.state) = state;
        debug!(state = ?state, "batch state");
        observer.on_state(state);
    }
}

fn stop_state(token: &CancelToken) -> TerminalState {
    token
        .reason()
        .map(TerminalState::from)
        .unwrap_or(TerminalState::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::sim::{RowBehavior, SimRow, SimulatedSurface};
    use std::sync::Arc;
    use std::thread;

    /// Test observer that collects events.
    struct TestObserver {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl TestObserver {
        fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
            let events = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    events: events.clone(),
                },
                events,
            )
        }
    }

    impl BatchObserver for TestObserver {
        fn on_state(&mut self, state: BatchState) {
            self.events.lock().unwrap().push(format!("state:{state:?}"));
        }
        fn on_started(&mut self, _batch_id: &str, total: usize) {
            self.events.lock().unwrap().push(format!("started:{total}"));
        }
        fn on_outcome(&mut self, index: usize, item: &Item, outcome: &OperationOutcome) {
            self.events
                .lock()
                .unwrap()
                .push(format!("outcome:{index}:{}:{}", item.id, outcome.label()));
        }
        fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
            self.events
                .lock()
                .unwrap()
                .push(format!("progress:{}/{}", snapshot.processed, snapshot.total));
        }
        fn on_terminal(&mut self, _result: &BatchResult, message: &TerminalMessage) {
            self.events
                .lock()
                .unwrap()
                .push(format!("terminal:{}", message.kind()));
        }
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            executor: ExecutorConfig {
                poll_interval: Duration::from_millis(2),
                removal_poll_interval: Duration::from_millis(2),
                delete_timeout: Duration::from_millis(40),
                confirm_timeout: Duration::from_millis(40),
                removal_timeout: Duration::from_millis(40),
                settle_delay: Duration::ZERO,
                recovery_delay: Duration::ZERO,
                ..ExecutorConfig::default()
            },
            watchdog_timeout: Duration::from_secs(20),
            start_delay: Duration::ZERO,
            yield_every: 20,
            yield_pause: Duration::from_millis(1),
            terminal_hold: Duration::ZERO,
        }
    }

    fn result(state: TerminalState, total: usize, succeeded: usize, failed: usize) -> BatchResult {
        BatchResult {
            total,
            attempted: succeeded + failed,
            succeeded,
            failed,
            skipped: total - succeeded - failed,
            cancelled: state != TerminalState::Completed,
            state,
        }
    }

    #[test]
    fn default_config_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.watchdog_timeout, Duration::from_secs(30));
        assert_eq!(config.start_delay, Duration::from_millis(500));
        assert_eq!(config.yield_every, 20);
        assert_eq!(config.terminal_hold, Duration::from_millis(2200));
    }

    #[test]
    fn classify_tie_breaks() {
        use TerminalState::*;
        assert_eq!(
            TerminalMessage::classify(&result(Completed, 0, 0, 0)),
            TerminalMessage::NoItems
        );
        assert_eq!(
            TerminalMessage::classify(&result(Completed, 5, 5, 0)),
            TerminalMessage::AllSucceeded { total: 5 }
        );
        assert_eq!(
            TerminalMessage::classify(&result(Completed, 5, 4, 1)),
            TerminalMessage::PartialSuccess {
                succeeded: 4,
                failed: 1,
                total: 5
            }
        );
        assert_eq!(
            TerminalMessage::classify(&result(Completed, 3, 0, 3)),
            TerminalMessage::AllFailed { total: 3 }
        );
        assert_eq!(
            TerminalMessage::classify(&result(Completed, 3, 0, 1)),
            TerminalMessage::NothingDeleted {
                failed: 1,
                skipped: 2
            }
        );
        assert_eq!(
            TerminalMessage::classify(&result(Cancelled, 5, 5, 0)),
            TerminalMessage::Cancelled
        );
        assert_eq!(
            TerminalMessage::classify(&result(TimedOut, 5, 0, 0)),
            TerminalMessage::TimedOut
        );
    }

    #[test]
    fn affirmative_only_when_successes_dominate() {
        assert!(TerminalMessage::AllSucceeded { total: 2 }.is_affirmative());
        assert!(
            TerminalMessage::PartialSuccess {
                succeeded: 2,
                failed: 2,
                total: 4
            }
            .is_affirmative()
        );
        assert!(
            !TerminalMessage::PartialSuccess {
                succeeded: 1,
                failed: 3,
                total: 4
            }
            .is_affirmative()
        );
        assert!(!TerminalMessage::Cancelled.is_affirmative());
        assert!(!TerminalMessage::AllFailed { total: 1 }.is_affirmative());
    }

    #[test]
    fn messages_name_counts() {
        let partial = TerminalMessage::PartialSuccess {
            succeeded: 4,
            failed: 1,
            total: 5,
        };
        assert_eq!(partial.to_string(), "Deleted 4 of 5 items.");
        assert_eq!(TerminalMessage::NoItems.to_string(), "No items selected.");
        assert_eq!(TerminalMessage::TimedOut.kind(), "timed_out");
    }

    #[test]
    fn empty_batch_goes_straight_to_terminal() {
        let orch = Orchestrator::new(SimulatedSurface::new(vec![]), fast_config());
        let (mut observer, events) = TestObserver::new();

        let result = orch.run_batch(vec![], &mut observer).unwrap();
        assert_eq!(result.total, 0);
        assert!(!result.cancelled);

        let collected = events.lock().unwrap();
        assert!(!collected.iter().any(|e| e.starts_with("started:")));
        assert!(!collected.iter().any(|e| e.starts_with("progress:")));
        assert!(!collected.iter().any(|e| e == "state:Running"));
        assert!(collected.contains(&"terminal:no_items".to_string()));
        assert_eq!(collected.last().unwrap(), "state:Idle");
        assert_eq!(orch.state(), BatchState::Idle);
    }

    #[test]
    fn empty_batch_skips_the_terminal_hold_and_opens_no_log() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.terminal_hold = Duration::from_secs(5);
        let orch = Orchestrator::new(SimulatedSurface::new(vec![]), config);
        let mut logger = crate::log::BatchLogger::new(tmp.path().join("logs"));

        let start = std::time::Instant::now();
        let result = orch.run_batch(vec![], &mut logger).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(TerminalMessage::classify(&result), TerminalMessage::NoItems);
        assert!(logger.path().is_none());
        assert!(!tmp.path().join("logs").exists());
    }

    #[test]
    fn failed_housekeeping_gestures_do_not_stop_the_batch() {
        let surface = SimulatedSurface::new(vec![
            SimRow::new("a").with_behavior(RowBehavior::DeleteMissing),
            SimRow::new("b"),
        ])
        .with_failing_gestures();
        let items = surface.selected_items();
        let orch = Orchestrator::new(surface, fast_config());
        let (mut observer, events) = TestObserver::new();

        let result = orch.run_batch(items, &mut observer).unwrap();
        assert_eq!(result.state, TerminalState::Completed);
        assert_eq!((result.succeeded, result.failed, result.skipped), (1, 1, 0));
        assert_eq!(orch.state(), BatchState::Idle);

        let collected = events.lock().unwrap();
        assert!(collected.contains(&"outcome:0:a:failure".to_string()));
        assert!(collected.contains(&"outcome:1:b:success".to_string()));
        assert_eq!(orch.surface().removed_ids(), vec!["b"]);
        assert!(!orch.surface().selection_cleared());
    }

    #[test]
    fn state_machine_funnels_through_finalizing() {
        let surface = SimulatedSurface::new(vec![SimRow::new("a"), SimRow::new("b")]);
        let items = surface.selected_items();
        let orch = Orchestrator::new(surface, fast_config());
        let (mut observer, events) = TestObserver::new();

        let result = orch.run_batch(items, &mut observer).unwrap();
        assert_eq!(result.succeeded, 2);

        let states: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("state:"))
            .cloned()
            .collect();
        assert_eq!(
            states,
            vec![
                "state:Preparing",
                "state:Running",
                "state:Completed",
                "state:Finalizing",
                "state:Idle"
            ]
        );
        assert!(!orch.is_running());
        assert!(orch.surface().selection_cleared());
    }

    #[test]
    fn outcome_is_reported_before_its_snapshot() {
        let surface = SimulatedSurface::new(vec![
            SimRow::new("a"),
            SimRow::new("b").with_behavior(RowBehavior::DeleteMissing),
        ]);
        let items = surface.selected_items();
        let orch = Orchestrator::new(surface, fast_config());
        let (mut observer, events) = TestObserver::new();
        orch.run_batch(items, &mut observer).unwrap();

        let collected: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("outcome:") || e.starts_with("progress:"))
            .cloned()
            .collect();
        assert_eq!(
            collected,
            vec![
                "outcome:0:a:success",
                "progress:1/2",
                "outcome:1:b:failure",
                "progress:2/2"
            ]
        );
    }

    #[test]
    fn cancel_without_active_batch_is_noop() {
        let orch = Orchestrator::new(SimulatedSurface::new(vec![]), fast_config());
        assert!(!orch.cancel());
        assert!(!orch.is_running());
    }

    #[test]
    fn second_batch_is_rejected_while_running() {
        let surface = SimulatedSurface::new(vec![SimRow::new("slow").with_removal_delay_ms(60_000)]);
        let items = surface.selected_items();
        let mut config = fast_config();
        config.executor.removal_timeout = Duration::from_secs(60);
        let orch = Arc::new(Orchestrator::new(surface, config));

        let runner = Arc::clone(&orch);
        let handle = thread::spawn(move || {
            let (mut observer, _events) = TestObserver::new();
            runner.run_batch(items, &mut observer).unwrap()
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !orch.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(orch.is_running());

        let (mut observer, _events) = TestObserver::new();
        let err = orch.run_batch(vec![], &mut observer).unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyRunning));

        assert!(orch.cancel());
        assert!(!orch.cancel());
        let result = handle.join().unwrap();
        assert_eq!(result.state, TerminalState::Cancelled);
        assert_eq!(result.skipped, 1);
        assert!(!orch.is_running());
    }

    #[test]
    fn watchdog_wins_over_later_cancel() {
        let surface = SimulatedSurface::new(vec![SimRow::new("slow").with_removal_delay_ms(60_000)]);
        let items = surface.selected_items();
        let mut config = fast_config();
        config.executor.removal_timeout = Duration::from_secs(60);
        config.watchdog_timeout = Duration::from_millis(50);
        config.terminal_hold = Duration::from_millis(500);
        let orch = Arc::new(Orchestrator::new(surface, config));

        // Lands while the timed-out batch is still holding its final status.
        let canceller = Arc::clone(&orch);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            (canceller.is_running(), canceller.cancel())
        });

        let (mut observer, events) = TestObserver::new();
        let result = orch.run_batch(items, &mut observer).unwrap();
        assert_eq!(result.state, TerminalState::TimedOut);
        assert!(result.cancelled);
        assert!(
            events
                .lock()
                .unwrap()
                .contains(&"terminal:timed_out".to_string())
        );
        let (running, accepted) = handle.join().unwrap();
        assert!(running);
        assert!(!accepted);
    }

    #[test]
    fn yields_on_long_batches_without_losing_items() {
        let rows = (0..25).map(|i| SimRow::new(format!("item-{i}"))).collect();
        let surface = SimulatedSurface::new(rows);
        let items = surface.selected_items();
        let mut config = fast_config();
        config.yield_every = 5;
        let orch = Orchestrator::new(surface, config);
        let (mut observer, events) = TestObserver::new();

        let result = orch.run_batch(items, &mut observer).unwrap();
        assert_eq!(result.succeeded, 25);
        let progress = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("progress:"))
            .count();
        assert_eq!(progress, 25);
    }

    #[test]
    fn observer_set_fans_out() {
        let (first, first_events) = TestObserver::new();
        let (second, second_events) = TestObserver::new();
        let mut set = ObserverSet::new();
        set.push(Box::new(first));
        set.push(Box::new(second));
        assert_eq!(set.len(), 2);

        set.on_started("batch", 3);
        assert_eq!(first_events.lock().unwrap().as_slice(), ["started:3"]);
        assert_eq!(second_events.lock().unwrap().as_slice(), ["started:3"]);
    }
}
