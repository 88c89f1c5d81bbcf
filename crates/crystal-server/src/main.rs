mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crystal_session::{Authenticator, HttpAuthenticator, NullAuthenticator, SessionManager};

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(crystal_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = crystal_db::PoolConfig::from_app_config(&config);
    let pool = crystal_db::connect_pool(&config.database_url, pool_config).await?;
    crystal_db::run_migrations(&pool).await?;

    let authenticator: Arc<dyn Authenticator> = match &config.auth_bridge_url {
        Some(url) => Arc::new(HttpAuthenticator::new(url.clone(), config.headless)?),
        None => {
            tracing::warn!("CRYSTAL_AUTH_BRIDGE_URL not set; automated login disabled");
            Arc::new(NullAuthenticator)
        }
    };
    let sessions = Arc::new(SessionManager::new(
        pool.clone(),
        authenticator,
        config.auth_timeout_secs,
        i32::try_from(config.session_max_failures).unwrap_or(i32::MAX),
    ));

    let crawl = crystal_scheduler::CrawlScheduler::new(
        pool.clone(),
        Arc::clone(&sessions),
        build_adapters(&config)?,
        config.crawler_max_retries,
        config.crawler_backoff_base_ms,
    );

    // The handle must stay alive; dropping it stops all scheduled jobs.
    let _jobs = scheduler::build_scheduler(crawl.clone(), config.daily_job_hour).await?;

    let app = build_app(AppState {
        pool,
        crawl,
        sessions,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn build_adapters(
    config: &crystal_core::AppConfig,
) -> anyhow::Result<Vec<Arc<dyn crystal_crawler::PlatformAdapter>>> {
    let timeout = config.crawler_request_timeout_secs;
    let ua = &config.crawler_user_agent;
    Ok(vec![
        Arc::new(crystal_crawler::WeiboAdapter::new(timeout, ua)?),
        Arc::new(crystal_crawler::ZhihuAdapter::new(timeout, ua)?),
        Arc::new(crystal_crawler::XueqiuAdapter::new(timeout, ua)?),
    ])
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
