use std::{future::Future, sync::Arc};

use anyhow::{Error, Result};
use chrono::{DateTime, Days, FixedOffset};
use scopeguard::defer;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::{
    event::index_fingerprint::{IndexFingerprintEvent, Outcome},
    logging,
    scheduler::guard::ScheduleGuard,
};

pub mod guard;

/// Run keys older than this many days are dropped on each tick.
const RUN_KEY_RETENTION_DAYS: u64 = 2;

/// Starts the polling job. Each tick dispatches every newly due index as a
/// detached task, so a slow chain never delays the next tick.
pub async fn start(
    sched: &JobScheduler,
    guard: Arc<ScheduleGuard>,
    event: Arc<IndexFingerprintEvent>,
    poll_interval_secs: u64,
) -> Result<()> {
    let expr = poll_expression(poll_interval_secs);
    logging::info_file_async(format!("polling every {}s ({})", poll_interval_secs, expr));

    let job = create_job(expr, move || {
        let guard = guard.clone();
        let event = event.clone();
        async move {
            let now = event.now();
            dispatch_due(&guard, &event, now);
            Ok(())
        }
    })?;

    sched.add(job).await?;
    sched.start().await?;

    Ok(())
}

/// Spawns one fetch-and-publish task per index that became due at `now`.
pub fn dispatch_due(
    guard: &Arc<ScheduleGuard>,
    event: &Arc<IndexFingerprintEvent>,
    now: DateTime<FixedOffset>,
) -> Vec<JoinHandle<()>> {
    if let Some(horizon) = now.date_naive().checked_sub_days(Days::new(RUN_KEY_RETENTION_DAYS)) {
        guard.forget_before(horizon);
    }

    guard
        .due_indices(&now)
        .into_iter()
        .map(|index| {
            logging::info_file_async(format!(
                "{} due at {}, dispatching",
                index,
                now.format("%F %H:%M:%S")
            ));

            let guard = guard.clone();
            let event = event.clone();
            tokio::spawn(async move {
                defer! {
                    guard.finish(index);
                }

                match event.execute(index, now).await {
                    Ok(Outcome::Published { fingerprint, .. }) => {
                        logging::debug_file_async(format!("{} run ended with {}", index, fingerprint));
                    }
                    Ok(Outcome::Warned { reason, .. }) => {
                        logging::debug_file_async(format!("{} run ended with a warning: {}", index, reason));
                    }
                    Err(why) => {
                        logging::error_file_async(format!(
                            "{} message could not be published because {}",
                            index, why
                        ));
                    }
                }
            })
        })
        .collect()
}

/// Six-field cron expression (seconds first) firing every `secs` seconds.
/// Slots match to the minute, so the interval is kept within 1..=59 seconds.
fn poll_expression(secs: u64) -> String {
    format!("*/{} * * * * *", secs.clamp(1, 59))
}

fn create_job<F, Fut>(cron_expr: String, task: F) -> Result<Job>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    let schedule = cron_expr.clone();
    Ok(Job::new_async(schedule.as_str(), move |_uuid, _l| {
        let task = task.clone();
        let cron_expr = cron_expr.clone();
        Box::pin(async move {
            if let Err(why) = task().await {
                logging::error_file_async(format!(
                    "Failed to execute task({}) because {:?}",
                    cron_expr, why
                ));
            }
        })
    })?)
}
