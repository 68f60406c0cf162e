//! Auto-reassign scheduler: a worker that periodically re-checks tracked jobs.

mod reassign;

pub use reassign::{ReassignScheduler, SchedulerConfig, SweepReport, TrackedJob};
