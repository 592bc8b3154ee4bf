//! Scheduled trigger for SkyCast predictions.
//!
//! `TriggerSchedule` answers when the trigger fires, `ScheduledTask`
//! provisions dependencies and runs the prediction entry point, and
//! `run_daemon` wires the two together on a cron job scheduler.

pub mod daemon;
pub mod schedule;
pub mod task;

pub use daemon::run_daemon;
pub use schedule::TriggerSchedule;
pub use task::{execute, ScheduledTask};

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid schedule {expression:?}: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("Job scheduler error: {0}")]
    Scheduler(String),

    #[error("Signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(e: JobSchedulerError) -> Self {
        Self::Scheduler(format!("{:?}", e))
    }
}
