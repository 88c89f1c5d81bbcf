//! Status command: session health per platform plus recent crawl runs.

use sqlx::PgPool;

use crystal_core::Platform;
use crystal_db::sessions::status;

pub(crate) async fn print_status(pool: &PgPool) -> anyhow::Result<()> {
    println!("sessions:");
    for platform in Platform::ALL {
        let row = crystal_db::get_session_row(pool, platform.as_str()).await?;
        match row {
            Some(row) => {
                let user = row.username.as_deref().unwrap_or("-");
                let last_login = row
                    .last_login_at
                    .map_or_else(|| "never".to_owned(), |t| t.to_rfc3339());
                println!(
                    "  {:<8} {:<15} user {user:<12} failures {:<2} last login {last_login}",
                    platform.as_str(),
                    row.status,
                    row.consecutive_failures,
                );
                if row.status != status::HEALTHY {
                    if let Some(error) = &row.last_error {
                        println!("           last error: {error}");
                    }
                }
            }
            None => println!("  {:<8} {}", platform.as_str(), status::UNAUTHENTICATED),
        }
    }

    let runs = crystal_db::list_crawl_runs(pool, 10).await?;
    println!("recent runs:");
    if runs.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for run in &runs {
        let ended = run
            .ended_at
            .map_or_else(|| "running".to_owned(), |t| t.to_rfc3339());
        println!(
            "  {} {:<9} {:<7} window {} .. {} ended {ended}",
            run.public_id,
            run.status,
            run.trigger_kind,
            run.window_start,
            run.window_end,
        );
        if let Some(error) = &run.error_summary {
            println!("    {error}");
        }
    }
    Ok(())
}
