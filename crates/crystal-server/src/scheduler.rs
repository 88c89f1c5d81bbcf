//! Background job scheduler.
//!
//! Registers the daily crawl at the configured platform-local hour. Missed
//! fires are not backfilled; the manual trigger accepts an explicit date for
//! operator backfill instead.

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crystal_core::{previous_day_window, PlatformSelector, PLATFORM_TZ_OFFSET_HOURS};
use crystal_scheduler::{CrawlScheduler, TriggerKind};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    crawl: CrawlScheduler,
    daily_job_hour: u8,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let utc_hour = local_hour_to_utc(daily_job_hour);
    let schedule = format!("0 0 {utc_hour} * * *");
    tracing::info!(
        local_hour = daily_job_hour,
        utc_hour,
        "registering daily crawl job"
    );

    let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let crawl = crawl.clone();
        Box::pin(async move {
            run_daily_crawl(&crawl).await;
        })
    })?;
    scheduler.add(job).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Collect the previous platform-local day's window across all platforms.
async fn run_daily_crawl(crawl: &CrawlScheduler) {
    let window = previous_day_window(Utc::now());
    tracing::info!(start = %window.start, end = %window.end, "scheduler: starting daily crawl");
    match crawl
        .run(&PlatformSelector::All, TriggerKind::Timer, window)
        .await
    {
        Ok(summary) => {
            tracing::info!(
                run_id = summary.run_id,
                status = summary.status.as_str(),
                "scheduler: daily crawl finished"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: daily crawl failed to persist");
        }
    }
}

/// Convert a platform-local wall-clock hour to the equivalent UTC hour.
/// The platform timezone has no DST, so the conversion is computed once.
fn local_hour_to_utc(local_hour: u8) -> u8 {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let offset = PLATFORM_TZ_OFFSET_HOURS as u8;
    (local_hour + 24 - offset) % 24
}

#[cfg(test)]
mod tests {
    use super::local_hour_to_utc;

    #[test]
    fn local_hour_converts_across_midnight() {
        // 06:00 UTC+8 is 22:00 UTC the previous day.
        assert_eq!(local_hour_to_utc(6), 22);
        assert_eq!(local_hour_to_utc(8), 0);
        assert_eq!(local_hour_to_utc(20), 12);
    }
}
