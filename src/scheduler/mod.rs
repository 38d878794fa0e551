//! Repeating cycles that decide which users get work.
//!
//! Each cycle runs on its own loop: wait, run once, reschedule. The running
//! flag of a cycle prevents a second run from starting while one is in
//! flight, and the [`crate::lock::LockRegistry`] keeps two cycles from
//! working on the same user at once.

mod context;
mod cycle;
pub mod cycles;
mod initial_send;
mod midnight;
mod runner;

pub use context::{CycleContext, DeliveryOutcome, UserOutcome};
pub use cycle::{Cycle, CycleError, CycleKind, CycleReport, CycleSchedule};
pub use initial_send::InitialSendTracker;
pub use midnight::{delay_until_next_local_midnight, next_local_midnight};
pub use runner::{run_cycle_once, CycleRun, CycleScheduler, SchedulerError};
