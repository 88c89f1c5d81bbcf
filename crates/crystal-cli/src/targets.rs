//! Watch-target seeding commands.

use clap::Args;
use sqlx::PgPool;

use crystal_core::{Platform, TargetKind};
use crystal_db::NewWatchTarget;

#[derive(Debug, Args)]
pub(crate) struct AddTargetArgs {
    #[arg(long)]
    pub platform: String,
    /// One of: account, symbol, keyword.
    #[arg(long)]
    pub kind: String,
    /// Platform-native account id; required for account targets.
    #[arg(long)]
    pub external_id: Option<String>,
    /// Stock symbol (e.g. SH600519); required for symbol targets.
    #[arg(long)]
    pub symbol: Option<String>,
    /// Search keyword; required for keyword targets.
    #[arg(long)]
    pub keyword: Option<String>,
    #[arg(long)]
    pub display_name: String,
}

pub(crate) async fn add_target(pool: &PgPool, args: &AddTargetArgs) -> anyhow::Result<()> {
    let platform: Platform = args
        .platform
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let kind: TargetKind = args.kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    match kind {
        TargetKind::Account if args.external_id.is_none() => {
            anyhow::bail!("account targets require --external-id")
        }
        TargetKind::Symbol if args.symbol.is_none() => {
            anyhow::bail!("symbol targets require --symbol")
        }
        TargetKind::Keyword if args.keyword.is_none() => {
            anyhow::bail!("keyword targets require --keyword")
        }
        _ => {}
    }

    let row = crystal_db::insert_watch_target(
        pool,
        &NewWatchTarget {
            platform: platform.as_str().to_owned(),
            kind: kind.as_str().to_owned(),
            external_id: args.external_id.clone(),
            symbol: args.symbol.clone(),
            keyword: args.keyword.clone(),
            display_name: args.display_name.clone(),
        },
    )
    .await?;

    println!(
        "added target {} ({} {} \"{}\")",
        row.id,
        row.platform,
        row.kind,
        row.display_name
    );
    Ok(())
}

pub(crate) async fn list_targets(pool: &PgPool, platform: Option<&str>) -> anyhow::Result<()> {
    if let Some(name) = platform {
        name.parse::<Platform>()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }

    let rows = crystal_db::list_watch_targets(pool, platform).await?;
    if rows.is_empty() {
        println!("no watch targets");
        return Ok(());
    }
    for row in &rows {
        let key = row
            .external_id
            .as_deref()
            .or(row.symbol.as_deref())
            .or(row.keyword.as_deref())
            .unwrap_or("-");
        let enabled = if row.enabled { "enabled" } else { "disabled" };
        println!(
            "  {:<5} {:<8} {:<8} {:<20} {:<9} {}",
            row.id, row.platform, row.kind, key, enabled, row.display_name
        );
    }
    Ok(())
}
