//! One-shot crawl command.
//!
//! Builds the same scheduler stack the server runs and drives a single
//! waited crawl, printing the per-platform outcome.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;

use crystal_core::{day_window, previous_day_window, AppConfig, Platform, PlatformSelector};
use crystal_crawler::{PlatformAdapter, WeiboAdapter, XueqiuAdapter, ZhihuAdapter};
use crystal_scheduler::{CrawlScheduler, RunStatus, TriggerKind};
use crystal_session::{Authenticator, HttpAuthenticator, NullAuthenticator, SessionManager};

pub(crate) async fn run_crawl(
    pool: &PgPool,
    config: &AppConfig,
    platform_names: &[String],
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let selector = parse_selector(platform_names)?;
    let window = date.map_or_else(|| previous_day_window(Utc::now()), day_window);

    let authenticator: Arc<dyn Authenticator> = match &config.auth_bridge_url {
        Some(url) => Arc::new(HttpAuthenticator::new(url.clone(), config.headless)?),
        None => Arc::new(NullAuthenticator),
    };
    let sessions = Arc::new(SessionManager::new(
        pool.clone(),
        authenticator,
        config.auth_timeout_secs,
        i32::try_from(config.session_max_failures).unwrap_or(i32::MAX),
    ));
    let scheduler = CrawlScheduler::new(
        pool.clone(),
        sessions,
        build_adapters(config)?,
        config.crawler_max_retries,
        config.crawler_backoff_base_ms,
    );

    println!(
        "crawling {} from {} to {}",
        selector_label(&selector),
        window.start,
        window.end
    );
    let summary = scheduler
        .run(&selector, TriggerKind::Manual, window)
        .await?;

    println!("run {} finished: {}", summary.public_id, summary.status.as_str());
    for outcome in &summary.platforms {
        match &outcome.error {
            Some(error) => println!(
                "  {:<8} {:<10} seen {:>4} saved {:>4}  {error}",
                outcome.platform.as_str(),
                outcome.status.as_str(),
                outcome.items_seen,
                outcome.items_saved,
            ),
            None => println!(
                "  {:<8} {:<10} seen {:>4} saved {:>4}",
                outcome.platform.as_str(),
                outcome.status.as_str(),
                outcome.items_seen,
                outcome.items_saved,
            ),
        }
    }

    if summary.status == RunStatus::Failed {
        anyhow::bail!("crawl run failed on every platform");
    }
    Ok(())
}

fn parse_selector(platform_names: &[String]) -> anyhow::Result<PlatformSelector> {
    if platform_names.is_empty() {
        return Ok(PlatformSelector::All);
    }
    let mut platforms = Vec::with_capacity(platform_names.len());
    for name in platform_names {
        let platform: Platform = name
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        platforms.push(platform);
    }
    Ok(PlatformSelector::Named(platforms))
}

fn selector_label(selector: &PlatformSelector) -> String {
    selector
        .platforms()
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_adapters(config: &AppConfig) -> anyhow::Result<Vec<Arc<dyn PlatformAdapter>>> {
    let timeout = config.crawler_request_timeout_secs;
    let ua = &config.crawler_user_agent;
    Ok(vec![
        Arc::new(WeiboAdapter::new(timeout, ua)?),
        Arc::new(ZhihuAdapter::new(timeout, ua)?),
        Arc::new(XueqiuAdapter::new(timeout, ua)?),
    ])
}
