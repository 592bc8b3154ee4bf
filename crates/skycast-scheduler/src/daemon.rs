//! Long-running trigger: fire the scheduled task at every schedule match.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use skycast_services::TriggerKind;

use crate::schedule::TriggerSchedule;
use crate::task::ScheduledTask;
use crate::SchedulerError;

const OVERLAP_REASON: &str = "previous run still in flight";

/// Run the trigger until Ctrl-C.
///
/// At most one execution is in flight; a firing that lands while a run is
/// still going is skipped and journaled as such.
pub async fn run_daemon(task: ScheduledTask, schedule: TriggerSchedule) -> Result<(), SchedulerError> {
    let task = Arc::new(task);
    let gate = Arc::new(Mutex::new(()));

    let mut scheduler = JobScheduler::new().await?;

    let job = {
        let task = task.clone();
        let gate = gate.clone();
        Job::new_async(schedule.job_expression(), move |_id, _scheduler| {
            let task = task.clone();
            let gate = gate.clone();
            Box::pin(async move {
                fire(&task, &gate).await;
            })
        })?
    };

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!("Trigger armed: {}", schedule.describe());
    if let Some(next) = schedule.next_after(Utc::now()) {
        tracing::info!("Next prediction at {}", next);
    }

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down trigger");
    scheduler.shutdown().await?;
    Ok(())
}

/// Handle one schedule match. Returns false when the firing was skipped.
pub async fn fire(task: &ScheduledTask, gate: &Mutex<()>) -> bool {
    let Ok(_running) = gate.try_lock() else {
        tracing::warn!("Skipping scheduled firing: {}", OVERLAP_REASON);
        if let Err(e) = task
            .journal()
            .record_skipped(TriggerKind::Scheduled, OVERLAP_REASON)
            .await
        {
            tracing::warn!("Failed to record skipped firing: {}", e);
        }
        return false;
    };

    // Failures are logged and journaled by the task
    let _ = task.run(TriggerKind::Scheduled).await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use skycast_core::Config;
    use skycast_services::{JournalClient, RunJournal, RunOutcome};

    #[tokio::test]
    async fn test_job_scheduler_accepts_translated_expressions() {
        for expression in [
            skycast_core::config::DEFAULT_SCHEDULE,
            "30 6 * * 0",
            "0 9 * * 1-5",
            "0 8 * * 6-7",
            "15 */4 1,15 * 7",
        ] {
            let schedule = TriggerSchedule::parse(expression).unwrap();
            let job = Job::new_async(schedule.job_expression(), |_id, _scheduler| {
                Box::pin(async {})
            });
            assert!(
                job.is_ok(),
                "{} -> {} rejected",
                expression,
                schedule.job_expression()
            );
        }
    }

    #[tokio::test]
    async fn test_overlapping_firing_is_skipped() {
        let journal = JournalClient::new(RunJournal::in_memory().unwrap());
        let task = ScheduledTask::new(Config::default(), journal.clone());
        let gate = Mutex::new(());

        let _in_flight = gate.lock().await;
        assert!(!fire(&task, &gate).await);

        let runs = journal.recent(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, RunOutcome::Skipped);
        assert_eq!(runs[0].message.as_deref(), Some(OVERLAP_REASON));
    }

    #[tokio::test]
    async fn test_firing_runs_when_idle() {
        let journal = JournalClient::new(RunJournal::in_memory().unwrap());
        // Default config has no credentials, so the run fails in provisioning
        let task = ScheduledTask::new(Config::default(), journal.clone());
        let gate = Mutex::new(());

        assert!(fire(&task, &gate).await);
        assert!(gate.try_lock().is_ok());

        let runs = journal.recent(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].trigger, TriggerKind::Scheduled);
        assert_eq!(runs[0].outcome, RunOutcome::Failed);
    }
}
