//! Sequential bulk deletion against a live UI surface.
//!
//! An [`orchestrator::Orchestrator`] walks a captured list of items and, for
//! each one, drives a multi-step interaction (open menu, delete, confirm,
//! await removal) through a [`surface::Surface`], tolerating per-item
//! failures, reporting progress after every item, and honouring operator
//! cancellation plus a global watchdog.

pub mod cancel;
pub mod config;
pub mod executor;
pub mod log;
pub mod orchestrator;
pub mod poller;
pub mod progress;
pub mod surface;
pub mod watchdog;
