//! Scheduled-task engine: next-run computation for cron, interval, and once schedules, and the
//! tick loop that fires due tasks through the router's dispatcher.

mod error;
mod next_run;
mod tick;

pub use error::SchedulerError;
pub use next_run::{initial_run, next_after};
pub use tick::{Scheduler, TaskDispatcher};
