//! Global batch watchdog.
//!
//! One timer thread per batch. If the batch has not disarmed it before the
//! deadline, the `on_timeout` callback runs once on the timer thread.
//! Disarming joins the thread, so once [`Watchdog::disarm`] returns no late
//! callback can fire.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

pub struct Watchdog {
    disarm_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
    timeout: Duration,
}

impl Watchdog {
    /// Start the timer. Spawning the timer thread is the only thing that can
    /// fail here.
    pub fn arm<F>(timeout: Duration, on_timeout: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (disarm_tx, disarm_rx) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_flag = Arc::clone(&fired);

        let handle = thread::Builder::new()
            .name("sweep-watchdog".to_string())
            .spawn(move || match disarm_rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        "watchdog fired: batch is taking too long"
                    );
                    fired_flag.store(true, Ordering::Release);
                    on_timeout();
                }
                // An explicit disarm or a dropped sender both mean "stand down".
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            })?;

        debug!(timeout_ms = timeout.as_millis() as u64, "watchdog armed");
        Ok(Self {
            disarm_tx: Some(disarm_tx),
            handle: Some(handle),
            fired,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Stop the timer and wait for its thread. Returns whether it had already
    /// fired. Consuming `self` makes a second disarm impossible.
    pub fn disarm(mut self) -> bool {
        self.stop();
        self.has_fired()
    }

    fn stop(&mut self) {
        if let Some(tx) = self.disarm_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("watchdog thread panicked");
            }
            debug!(fired = self.has_fired(), "watchdog disarmed");
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
