use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use sqlx::PgPool;
use uuid::Uuid;

use crystal_core::{CrawlWindow, Platform, PlatformSelector, WatchTarget};
use crystal_crawler::{retry_with_backoff, CrawlError, PlatformAdapter, RawItem};
use crystal_db::{CrawlRunRow, NewSentimentItem, SaveOutcome};
use crystal_session::SessionManager;

use crate::error::SchedulerError;
use crate::types::{
    CancelFlag, PlatformOutcome, PlatformStatus, RunHandle, RunStatus, RunSummary, TriggerKind,
};

type SharedOutcome = Shared<BoxFuture<'static, PlatformOutcome>>;

/// Coalescing crawl orchestrator. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct CrawlScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    pool: PgPool,
    sessions: Arc<SessionManager>,
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    in_flight: Mutex<HashMap<Platform, SharedOutcome>>,
    active_runs: Mutex<HashMap<Uuid, CancelFlag>>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl CrawlScheduler {
    #[must_use]
    pub fn new(
        pool: PgPool,
        sessions: Arc<SessionManager>,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|a| (a.platform(), a))
            .collect();
        Self {
            inner: Arc::new(SchedulerInner {
                pool,
                sessions,
                adapters,
                in_flight: Mutex::new(HashMap::new()),
                active_runs: Mutex::new(HashMap::new()),
                max_retries,
                backoff_base_ms,
            }),
        }
    }

    /// Run a crawl and wait for it. Platforms already being crawled are
    /// attached to, not re-crawled; the trigger still gets its own run row,
    /// finalized from the outcomes it observed.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Db`] if run-row persistence fails; worker
    /// failures are reported in the summary, never as an `Err`.
    pub async fn run(
        &self,
        selector: &PlatformSelector,
        trigger: TriggerKind,
        window: CrawlWindow,
    ) -> Result<RunSummary, SchedulerError> {
        let run = crystal_db::create_crawl_run(
            &self.inner.pool,
            trigger.as_str(),
            window.start,
            window.end,
        )
        .await?;
        let cancel = self.register_run(run.public_id);
        self.clone()
            .execute(run, selector.platforms(), window, cancel)
            .await
    }

    /// Non-blocking trigger. Unlike [`Self::run`] it refuses to attach:
    /// overlapping an in-flight platform is an error.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::AlreadyRunning`] when any selected platform is in
    /// flight; [`SchedulerError::Db`] if the run row cannot be created.
    pub async fn run_detached(
        &self,
        selector: &PlatformSelector,
        trigger: TriggerKind,
        window: CrawlWindow,
    ) -> Result<RunHandle, SchedulerError> {
        let platforms = selector.platforms();
        {
            let in_flight = self.inner.in_flight.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let busy: Vec<Platform> = platforms
                .iter()
                .copied()
                .filter(|p| in_flight.contains_key(p))
                .collect();
            if !busy.is_empty() {
                return Err(SchedulerError::AlreadyRunning { platforms: busy });
            }
        }

        let run = crystal_db::create_crawl_run(
            &self.inner.pool,
            trigger.as_str(),
            window.start,
            window.end,
        )
        .await?;
        let handle = RunHandle {
            run_id: run.id,
            public_id: run.public_id,
        };
        let cancel = self.register_run(run.public_id);

        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.execute(run, platforms, window, cancel).await {
                tracing::error!(error = %e, "detached crawl run failed to finalize");
            }
        });
        Ok(handle)
    }

    /// Request cooperative cancellation of an active run. Returns `false`
    /// when the run is unknown or already finished.
    #[must_use]
    pub fn cancel_run(&self, public_id: Uuid) -> bool {
        let active = self
            .inner
            .active_runs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(flag) = active.get(&public_id) {
            flag.cancel();
            true
        } else {
            false
        }
    }

    fn register_run(&self, public_id: Uuid) -> CancelFlag {
        let cancel = CancelFlag::default();
        self.inner
            .active_runs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(public_id, cancel.clone());
        cancel
    }

    fn unregister_run(&self, public_id: Uuid) {
        self.inner
            .active_runs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&public_id);
    }

    async fn execute(
        self,
        run: CrawlRunRow,
        platforms: Vec<Platform>,
        window: CrawlWindow,
        cancel: CancelFlag,
    ) -> Result<RunSummary, SchedulerError> {
        tracing::info!(
            run_id = run.id,
            public_id = %run.public_id,
            trigger = run.trigger_kind,
            platforms = ?platforms,
            "crawl run started"
        );

        let workers: Vec<SharedOutcome> = platforms
            .iter()
            .map(|&p| self.obtain_worker(p, window, cancel.clone()))
            .collect();
        let outcomes = join_all(workers).await;

        for outcome in &outcomes {
            crystal_db::upsert_crawl_run_platform(
                &self.inner.pool,
                run.id,
                outcome.platform.as_str(),
                outcome.status.as_str(),
                outcome.items_seen,
                outcome.items_saved,
                outcome.error.as_deref(),
            )
            .await?;
        }

        let status = aggregate_status(&outcomes);
        let error_summary = summarize_errors(&outcomes);
        crystal_db::finalize_crawl_run(
            &self.inner.pool,
            run.id,
            status.as_str(),
            error_summary.as_deref(),
        )
        .await?;
        self.unregister_run(run.public_id);

        tracing::info!(
            run_id = run.id,
            status = status.as_str(),
            items_saved = outcomes.iter().map(|o| o.items_saved).sum::<i32>(),
            "crawl run finished"
        );
        Ok(RunSummary {
            run_id: run.id,
            public_id: run.public_id,
            status,
            window,
            platforms: outcomes,
        })
    }

    /// Attach to the platform's in-flight worker, or spawn one. The worker
    /// removes its in-flight entry only after its outcome is complete, so at
    /// most one crawl per platform is ever active.
    fn obtain_worker(
        &self,
        platform: Platform,
        window: CrawlWindow,
        cancel: CancelFlag,
    ) -> SharedOutcome {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = in_flight.get(&platform) {
            tracing::debug!(%platform, "attaching to in-flight crawl");
            return existing.clone();
        }

        let inner = Arc::clone(&self.inner);
        let worker: SharedOutcome = async move {
            let outcome = inner.run_platform(platform, window, cancel).await;
            inner
                .in_flight
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(&platform);
            outcome
        }
        .boxed()
        .shared();
        in_flight.insert(platform, worker.clone());
        worker
    }
}

impl SchedulerInner {
    /// One platform worker: targets → session → fetch (with retry) → save.
    /// Failures never escape; they become the outcome.
    async fn run_platform(
        &self,
        platform: Platform,
        window: CrawlWindow,
        cancel: CancelFlag,
    ) -> PlatformOutcome {
        let targets = match self.load_targets(platform).await {
            Ok(targets) => targets,
            Err(e) => return failed(platform, 0, 0, e.to_string()),
        };
        if targets.is_empty() {
            tracing::info!(%platform, "no enabled watch targets, nothing to crawl");
            return PlatformOutcome {
                platform,
                status: PlatformStatus::Completed,
                items_seen: 0,
                items_saved: 0,
                error: None,
            };
        }

        let Some(adapter) = self.adapters.get(&platform) else {
            return failed(platform, 0, 0, "no adapter registered".to_owned());
        };

        let session = match self.sessions.get_session(platform).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(%platform, error = %e, "no usable session, skipping platform");
                return failed(platform, 0, 0, e.to_string());
            }
        };

        let fetched = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            adapter.fetch(&session.credential, &targets, &window)
        })
        .await;

        let items = match fetched {
            Ok(items) => items,
            Err(err @ CrawlError::AuthExpired { .. }) => {
                if let Err(e) = self.sessions.mark_unhealthy(platform, &err.to_string()).await {
                    tracing::error!(%platform, error = %e, "failed to record session failure");
                }
                return failed(platform, 0, 0, err.to_string());
            }
            Err(err) => return failed(platform, 0, 0, err.to_string()),
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let items_seen = items.len() as i32;
        let mut items_saved = 0i32;
        for item in &items {
            if cancel.is_cancelled() {
                tracing::warn!(%platform, items_saved, "crawl cancelled mid-save");
                return PlatformOutcome {
                    platform,
                    status: PlatformStatus::Cancelled,
                    items_seen,
                    items_saved,
                    error: Some("cancelled".to_owned()),
                };
            }
            match crystal_db::save_item(&self.pool, &to_new_item(item)).await {
                Ok(SaveOutcome::Inserted | SaveOutcome::Updated) => items_saved += 1,
                Ok(SaveOutcome::Unchanged) => {}
                // One bad item never fails the platform.
                Err(e) => {
                    tracing::warn!(
                        %platform,
                        external_id = %item.external_id,
                        error = %e,
                        "item save failed, skipping"
                    );
                }
            }
        }

        if let Err(e) = self.sessions.mark_healthy(platform).await {
            tracing::error!(%platform, error = %e, "failed to reset session health");
        }
        PlatformOutcome {
            platform,
            status: PlatformStatus::Completed,
            items_seen,
            items_saved,
            error: None,
        }
    }

    async fn load_targets(&self, platform: Platform) -> Result<Vec<WatchTarget>, SchedulerError> {
        let rows = crystal_db::list_enabled_targets(&self.pool, platform.as_str()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let target = row.to_domain();
                if target.is_none() {
                    tracing::warn!(id = row.id, "skipping watch target with unknown platform or kind");
                }
                target
            })
            .collect())
    }
}

fn failed(platform: Platform, items_seen: i32, items_saved: i32, error: String) -> PlatformOutcome {
    PlatformOutcome {
        platform,
        status: PlatformStatus::Failed,
        items_seen,
        items_saved,
        error: Some(error),
    }
}

fn aggregate_status(outcomes: &[PlatformOutcome]) -> RunStatus {
    let completed = outcomes
        .iter()
        .filter(|o| o.status == PlatformStatus::Completed)
        .count();
    if completed == outcomes.len() {
        RunStatus::Completed
    } else if completed == 0 {
        RunStatus::Failed
    } else {
        RunStatus::Partial
    }
}

fn summarize_errors(outcomes: &[PlatformOutcome]) -> Option<String> {
    let parts: Vec<String> = outcomes
        .iter()
        .filter_map(|o| {
            o.error
                .as_ref()
                .map(|e| format!("{}: {e}", o.platform))
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn to_new_item(item: &RawItem) -> NewSentimentItem {
    NewSentimentItem {
        platform: item.platform.as_str().to_owned(),
        external_id: item.external_id.clone(),
        target_id: item.target_id,
        symbol: item.symbol.clone(),
        root_post_id: item.root_post_id.clone(),
        author_id: item.author_id.clone(),
        author_name: item.author_name.clone(),
        content: item.content.clone(),
        url: item.url.clone(),
        posted_at: item.posted_at,
        heat_score: item.heat_score,
        topic: item.topic.clone(),
        extra: item.extra.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(platform: Platform, status: PlatformStatus, error: Option<&str>) -> PlatformOutcome {
        PlatformOutcome {
            platform,
            status,
            items_seen: 0,
            items_saved: 0,
            error: error.map(str::to_owned),
        }
    }

    #[test]
    fn aggregate_all_completed_is_completed() {
        let outcomes = [
            outcome(Platform::Weibo, PlatformStatus::Completed, None),
            outcome(Platform::Zhihu, PlatformStatus::Completed, None),
        ];
        assert_eq!(aggregate_status(&outcomes), RunStatus::Completed);
    }

    #[test]
    fn aggregate_mixed_is_partial() {
        let outcomes = [
            outcome(Platform::Weibo, PlatformStatus::Completed, None),
            outcome(Platform::Zhihu, PlatformStatus::Failed, Some("boom")),
        ];
        assert_eq!(aggregate_status(&outcomes), RunStatus::Partial);
    }

    #[test]
    fn aggregate_none_completed_is_failed() {
        let outcomes = [
            outcome(Platform::Weibo, PlatformStatus::Cancelled, Some("cancelled")),
            outcome(Platform::Zhihu, PlatformStatus::Failed, Some("boom")),
        ];
        assert_eq!(aggregate_status(&outcomes), RunStatus::Failed);
    }

    #[test]
    fn error_summary_joins_platform_errors() {
        let outcomes = [
            outcome(Platform::Weibo, PlatformStatus::Completed, None),
            outcome(Platform::Zhihu, PlatformStatus::Failed, Some("session expired")),
        ];
        assert_eq!(
            summarize_errors(&outcomes).as_deref(),
            Some("zhihu: session expired")
        );
        assert!(summarize_errors(&outcomes[..1]).is_none());
    }
}
