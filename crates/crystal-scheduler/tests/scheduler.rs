//! End-to-end scheduler tests against a real Postgres database, with fake
//! platform adapters standing in for the live sites.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use sqlx::PgPool;

use crystal_core::{day_window, CrawlWindow, Credential, Platform, PlatformSelector, WatchTarget};
use crystal_crawler::{CrawlError, PlatformAdapter, RawItem};
use crystal_db::NewWatchTarget;
use crystal_scheduler::{
    CrawlScheduler, PlatformStatus, RunStatus, SchedulerError, TriggerKind,
};
use crystal_session::{NullAuthenticator, SessionManager};

struct FakeAdapter {
    platform: Platform,
    calls: Arc<AtomicU32>,
    delay_ms: u64,
    rate_limit_first: u32,
    auth_expired: bool,
    item_count: u32,
}

impl FakeAdapter {
    fn ok(platform: Platform, calls: &Arc<AtomicU32>, item_count: u32) -> Arc<Self> {
        Arc::new(Self {
            platform,
            calls: Arc::clone(calls),
            delay_ms: 0,
            rate_limit_first: 0,
            auth_expired: false,
            item_count,
        })
    }
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(
        &self,
        _credential: &Credential,
        _targets: &[WatchTarget],
        window: &CrawlWindow,
    ) -> Result<Vec<RawItem>, CrawlError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.auth_expired {
            return Err(CrawlError::AuthExpired {
                platform: self.platform,
                status: 403,
            });
        }
        if call <= self.rate_limit_first {
            return Err(CrawlError::RateLimited {
                platform: self.platform,
                retry_after_secs: 1,
            });
        }
        Ok((0..self.item_count)
            .map(|i| {
                let mut item =
                    RawItem::new(self.platform, format!("post-{i}"));
                item.content = Some(format!("content {i}"));
                item.posted_at = Some(window.start);
                item.heat_score = Some(5.0);
                item
            })
            .collect())
    }
}

async fn seed_session(pool: &PgPool, platform: Platform) {
    crystal_db::record_login_success(
        pool,
        platform.as_str(),
        "tester",
        &json!({"cookies": {"SUB": "abc", "SUBP": "def", "z_c0": "tok", "xq_a_token": "tok"}}),
    )
    .await
    .expect("seed session");
}

async fn seed_keyword_target(pool: &PgPool, platform: Platform) {
    crystal_db::insert_watch_target(
        pool,
        &NewWatchTarget {
            platform: platform.as_str().to_owned(),
            kind: "keyword".to_owned(),
            external_id: None,
            symbol: None,
            keyword: Some("贵州茅台".to_owned()),
            display_name: "茅台舆情".to_owned(),
        },
    )
    .await
    .expect("seed watch target");
}

fn scheduler(
    pool: &PgPool,
    adapters: Vec<Arc<dyn PlatformAdapter>>,
    max_retries: u32,
) -> CrawlScheduler {
    let sessions = Arc::new(SessionManager::new(
        pool.clone(),
        Arc::new(NullAuthenticator),
        5,
        3,
    ));
    CrawlScheduler::new(pool.clone(), sessions, adapters, max_retries, 0)
}

fn test_window() -> CrawlWindow {
    day_window(NaiveDate::from_ymd_opt(2024, 12, 7).expect("valid date"))
}

async fn wait_for_final_status(pool: &PgPool, public_id: uuid::Uuid) -> String {
    for _ in 0..100 {
        let run = crystal_db::get_crawl_run_by_public_id(pool, public_id)
            .await
            .expect("run row exists");
        if run.status != "running" {
            return run.status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("run {public_id} never left status 'running'");
}

#[sqlx::test(migrations = "../../migrations")]
async fn coalesced_triggers_share_one_fetch(pool: PgPool) {
    seed_session(&pool, Platform::Weibo).await;
    seed_keyword_target(&pool, Platform::Weibo).await;

    let calls = Arc::new(AtomicU32::new(0));
    let adapter = Arc::new(FakeAdapter {
        platform: Platform::Weibo,
        calls: Arc::clone(&calls),
        delay_ms: 150,
        rate_limit_first: 0,
        auth_expired: false,
        item_count: 2,
    });
    let scheduler = scheduler(&pool, vec![adapter], 0);

    let selector = PlatformSelector::Named(vec![Platform::Weibo]);
    let a = {
        let s = scheduler.clone();
        let sel = selector.clone();
        tokio::spawn(async move { s.run(&sel, TriggerKind::Manual, test_window()).await })
    };
    let b = {
        let s = scheduler.clone();
        let sel = selector.clone();
        tokio::spawn(async move { s.run(&sel, TriggerKind::Timer, test_window()).await })
    };
    let first = a.await.expect("task").expect("run");
    let second = b.await.expect("task").expect("run");

    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "both triggers must attach to one platform worker"
    );
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(first.platforms[0].items_seen, 2);
    assert_eq!(second.platforms[0].items_seen, 2);
    assert_ne!(first.public_id, second.public_id, "each trigger gets its own run row");

    let runs = crystal_db::list_crawl_runs(&pool, 10).await.expect("list runs");
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == "completed"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn platform_failures_are_isolated(pool: PgPool) {
    for platform in [Platform::Weibo, Platform::Zhihu] {
        seed_session(&pool, platform).await;
        seed_keyword_target(&pool, platform).await;
    }

    let weibo_calls = Arc::new(AtomicU32::new(0));
    let zhihu_calls = Arc::new(AtomicU32::new(0));
    let zhihu = Arc::new(FakeAdapter {
        platform: Platform::Zhihu,
        calls: Arc::clone(&zhihu_calls),
        delay_ms: 0,
        rate_limit_first: 0,
        auth_expired: true,
        item_count: 0,
    });
    let scheduler = scheduler(
        &pool,
        vec![FakeAdapter::ok(Platform::Weibo, &weibo_calls, 3), zhihu],
        0,
    );

    let selector = PlatformSelector::Named(vec![Platform::Weibo, Platform::Zhihu]);
    let summary = scheduler
        .run(&selector, TriggerKind::Manual, test_window())
        .await
        .expect("run");

    assert_eq!(summary.status, RunStatus::Partial);
    let weibo = summary
        .platforms
        .iter()
        .find(|o| o.platform == Platform::Weibo)
        .expect("weibo outcome");
    let zhihu = summary
        .platforms
        .iter()
        .find(|o| o.platform == Platform::Zhihu)
        .expect("zhihu outcome");
    assert_eq!(weibo.status, PlatformStatus::Completed);
    assert_eq!(weibo.items_saved, 3);
    assert_eq!(zhihu.status, PlatformStatus::Failed);
    assert!(zhihu.error.as_deref().is_some_and(|e| e.contains("credential")));

    // The rejected credential degrades the zhihu session only.
    let row = crystal_db::get_session_row(&pool, "zhihu")
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.status, "degraded");
    assert_eq!(row.consecutive_failures, 1);
    let weibo_row = crystal_db::get_session_row(&pool, "weibo")
        .await
        .expect("query")
        .expect("row");
    assert_eq!(weibo_row.status, "healthy");

    let run = crystal_db::get_crawl_run(&pool, summary.run_id).await.expect("run row");
    assert!(run.error_summary.as_deref().is_some_and(|e| e.starts_with("zhihu:")));
    let platform_rows = crystal_db::list_crawl_run_platforms(&pool, summary.run_id)
        .await
        .expect("platform rows");
    assert_eq!(platform_rows.len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn transient_failures_are_retried_within_budget(pool: PgPool) {
    seed_session(&pool, Platform::Xueqiu).await;
    seed_keyword_target(&pool, Platform::Xueqiu).await;

    let calls = Arc::new(AtomicU32::new(0));
    let adapter = Arc::new(FakeAdapter {
        platform: Platform::Xueqiu,
        calls: Arc::clone(&calls),
        delay_ms: 0,
        rate_limit_first: 2,
        auth_expired: false,
        item_count: 1,
    });
    let scheduler = scheduler(&pool, vec![adapter], 3);

    let summary = scheduler
        .run(
            &PlatformSelector::Named(vec![Platform::Xueqiu]),
            TriggerKind::Timer,
            test_window(),
        )
        .await
        .expect("run");

    assert_eq!(calls.load(Ordering::SeqCst), 3, "two rate limits, then success");
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.platforms[0].items_saved, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn retry_budget_is_bounded(pool: PgPool) {
    seed_session(&pool, Platform::Xueqiu).await;
    seed_keyword_target(&pool, Platform::Xueqiu).await;

    let calls = Arc::new(AtomicU32::new(0));
    let adapter = Arc::new(FakeAdapter {
        platform: Platform::Xueqiu,
        calls: Arc::clone(&calls),
        delay_ms: 0,
        rate_limit_first: u32::MAX,
        auth_expired: false,
        item_count: 0,
    });
    let scheduler = scheduler(&pool, vec![adapter], 2);

    let summary = scheduler
        .run(
            &PlatformSelector::Named(vec![Platform::Xueqiu]),
            TriggerKind::Timer,
            test_window(),
        )
        .await
        .expect("run");

    assert_eq!(
        calls.load(Ordering::SeqCst),
        3,
        "budget of 2 retries allows 3 invocations total"
    );
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.platforms[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("rate limited")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn identical_reruns_save_nothing_new(pool: PgPool) {
    seed_session(&pool, Platform::Weibo).await;
    seed_keyword_target(&pool, Platform::Weibo).await;

    let calls = Arc::new(AtomicU32::new(0));
    let scheduler = scheduler(&pool, vec![FakeAdapter::ok(Platform::Weibo, &calls, 4)], 0);
    let selector = PlatformSelector::Named(vec![Platform::Weibo]);

    let first = scheduler
        .run(&selector, TriggerKind::Timer, test_window())
        .await
        .expect("first run");
    let second = scheduler
        .run(&selector, TriggerKind::Manual, test_window())
        .await
        .expect("second run");

    assert_eq!(first.platforms[0].items_saved, 4);
    assert_eq!(second.platforms[0].items_seen, 4);
    assert_eq!(
        second.platforms[0].items_saved, 0,
        "identical observations are deduplicated"
    );
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sentiment_items")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(count, 4);
}

#[sqlx::test(migrations = "../../migrations")]
async fn detached_trigger_refuses_overlap(pool: PgPool) {
    seed_session(&pool, Platform::Weibo).await;
    seed_keyword_target(&pool, Platform::Weibo).await;

    let calls = Arc::new(AtomicU32::new(0));
    let adapter = Arc::new(FakeAdapter {
        platform: Platform::Weibo,
        calls: Arc::clone(&calls),
        delay_ms: 300,
        rate_limit_first: 0,
        auth_expired: false,
        item_count: 1,
    });
    let scheduler = scheduler(&pool, vec![adapter], 0);
    let selector = PlatformSelector::Named(vec![Platform::Weibo]);

    let handle = scheduler
        .run_detached(&selector, TriggerKind::Manual, test_window())
        .await
        .expect("first detached trigger");

    let overlap = scheduler
        .run_detached(&selector, TriggerKind::Manual, test_window())
        .await;
    match overlap {
        Err(SchedulerError::AlreadyRunning { platforms }) => {
            assert_eq!(platforms, vec![Platform::Weibo]);
        }
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }

    let status = wait_for_final_status(&pool, handle.public_id).await;
    assert_eq!(status, "completed");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancellation_stops_saving_and_marks_the_run(pool: PgPool) {
    seed_session(&pool, Platform::Weibo).await;
    seed_keyword_target(&pool, Platform::Weibo).await;

    let calls = Arc::new(AtomicU32::new(0));
    let adapter = Arc::new(FakeAdapter {
        platform: Platform::Weibo,
        calls: Arc::clone(&calls),
        delay_ms: 300,
        rate_limit_first: 0,
        auth_expired: false,
        item_count: 10,
    });
    let scheduler = scheduler(&pool, vec![adapter], 0);

    let handle = scheduler
        .run_detached(
            &PlatformSelector::Named(vec![Platform::Weibo]),
            TriggerKind::Manual,
            test_window(),
        )
        .await
        .expect("detached trigger");

    // Cancel while the fetch is still sleeping, before any item is saved.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(scheduler.cancel_run(handle.public_id));

    let status = wait_for_final_status(&pool, handle.public_id).await;
    assert_eq!(status, "failed");
    let platform_rows = crystal_db::list_crawl_run_platforms(&pool, handle.run_id)
        .await
        .expect("platform rows");
    assert_eq!(platform_rows.len(), 1);
    assert_eq!(platform_rows[0].status, "cancelled");
    assert_eq!(platform_rows[0].items_saved, 0);

    assert!(
        !scheduler.cancel_run(handle.public_id),
        "a finished run is no longer cancellable"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn platform_without_targets_completes_empty(pool: PgPool) {
    // No session seeded either; a platform with nothing to crawl must not
    // trigger a login.
    let calls = Arc::new(AtomicU32::new(0));
    let scheduler = scheduler(&pool, vec![FakeAdapter::ok(Platform::Zhihu, &calls, 5)], 0);

    let summary = scheduler
        .run(
            &PlatformSelector::Named(vec![Platform::Zhihu]),
            TriggerKind::Timer,
            test_window(),
        )
        .await
        .expect("run");

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.platforms[0].items_seen, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "adapter must not be invoked");
}
