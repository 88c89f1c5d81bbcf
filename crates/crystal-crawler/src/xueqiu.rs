//! Xueqiu adapter: user timelines, per-symbol stock timelines, and keyword
//! search against the xueqiu.com JSON API. Timestamps arrive as epoch
//! milliseconds; timelines are newest-first so paging stops early once a
//! post falls before the window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crystal_core::{CrawlWindow, Credential, Platform, TargetKind, WatchTarget};

use crate::adapter::PlatformAdapter;
use crate::error::CrawlError;
use crate::http::{build_client, get_body, parse_body};
use crate::parse::{heat_score, json_id};
use crate::types::RawItem;

const DEFAULT_API_BASE: &str = "https://xueqiu.com";
const REFERER: &str = "https://xueqiu.com/";
const PAGE_SIZE: u32 = 20;
const MAX_TIMELINE_PAGES: u32 = 10;
const MAX_SEARCH_PAGES: u32 = 5;

pub struct XueqiuAdapter {
    client: Client,
    api_base: String,
    inter_page_delay_ms: u64,
}

#[derive(Debug, Deserialize, Default)]
struct UserTimelineResponse {
    #[serde(default)]
    statuses: Vec<Status>,
}

#[derive(Debug, Deserialize, Default)]
struct ListResponse {
    #[serde(default)]
    list: Vec<Status>,
}

#[derive(Debug, Deserialize, Default)]
struct Status {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    text: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    created_at: i64,
    user: Option<StatusUser>,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    reply_count: i64,
    #[serde(default)]
    retweet_count: i64,
    #[serde(default)]
    target: String,
    #[serde(default)]
    symbols: Vec<SymbolRef>,
}

#[derive(Debug, Deserialize, Default)]
struct StatusUser {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    screen_name: String,
}

#[derive(Debug, Deserialize, Default)]
struct SymbolRef {
    #[serde(default)]
    symbol: String,
}

impl XueqiuAdapter {
    /// # Errors
    ///
    /// Returns [`CrawlError::Transport`] if the HTTP client cannot be built.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, CrawlError> {
        Ok(Self {
            client: build_client(timeout_secs, user_agent)?,
            api_base: DEFAULT_API_BASE.to_owned(),
            inter_page_delay_ms: 1_000,
        })
    }

    /// Point the adapter at a different API origin (tests).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    #[must_use]
    pub fn with_page_delay_ms(mut self, delay_ms: u64) -> Self {
        self.inter_page_delay_ms = delay_ms;
        self
    }

    async fn page_delay(&self) {
        if self.inter_page_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.inter_page_delay_ms)).await;
        }
    }

    async fn fetch_user_timeline(
        &self,
        credential: &Credential,
        target: &WatchTarget,
        window: &CrawlWindow,
        items: &mut Vec<RawItem>,
    ) -> Result<(), CrawlError> {
        let Some(user_id) = target.external_id.as_deref() else {
            tracing::warn!(target = %target.display_name, "xueqiu account target has no external_id, skipping");
            return Ok(());
        };

        let url = format!("{}/v4/statuses/user_timeline.json", self.api_base);
        for page in 1..=MAX_TIMELINE_PAGES {
            if page > 1 {
                self.page_delay().await;
            }
            let query = [
                ("user_id", user_id.to_owned()),
                ("page", page.to_string()),
                ("count", PAGE_SIZE.to_string()),
            ];
            let body = get_body(
                &self.client,
                Platform::Xueqiu,
                &url,
                &query,
                credential,
                Some(REFERER),
            )
            .await?;
            let response: UserTimelineResponse = parse_body(&body, "xueqiu user timeline")?;
            if response.statuses.is_empty() {
                break;
            }
            if Self::collect(&response.statuses, target, target.symbol.clone(), None, window, items)
            {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn fetch_stock_timeline(
        &self,
        credential: &Credential,
        target: &WatchTarget,
        window: &CrawlWindow,
        items: &mut Vec<RawItem>,
    ) -> Result<(), CrawlError> {
        let Some(symbol) = target.symbol.as_deref() else {
            tracing::warn!(target = %target.display_name, "xueqiu symbol target has no symbol, skipping");
            return Ok(());
        };

        let url = format!("{}/v4/statuses/stock_timeline.json", self.api_base);
        let mut max_id: Option<String> = None;
        for page in 0..MAX_TIMELINE_PAGES {
            if page > 0 {
                self.page_delay().await;
            }
            let mut query = vec![
                ("symbol", symbol.to_owned()),
                ("count", PAGE_SIZE.to_string()),
                ("source", "all".to_owned()),
            ];
            if let Some(cursor) = &max_id {
                query.push(("max_id", cursor.clone()));
            }
            let body = get_body(
                &self.client,
                Platform::Xueqiu,
                &url,
                &query,
                credential,
                Some(REFERER),
            )
            .await?;
            let response: ListResponse = parse_body(&body, "xueqiu stock timeline")?;
            if response.list.is_empty() {
                break;
            }
            max_id = response.list.last().and_then(|s| json_id(&s.id));
            if Self::collect(
                &response.list,
                target,
                Some(symbol.to_owned()),
                None,
                window,
                items,
            ) {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn fetch_keyword(
        &self,
        credential: &Credential,
        target: &WatchTarget,
        keyword: &str,
        window: &CrawlWindow,
        items: &mut Vec<RawItem>,
    ) -> Result<(), CrawlError> {
        let url = format!("{}/query/v1/search/status.json", self.api_base);
        for page in 1..=MAX_SEARCH_PAGES {
            if page > 1 {
                self.page_delay().await;
            }
            let query = [
                ("q", keyword.to_owned()),
                ("count", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            let body = get_body(
                &self.client,
                Platform::Xueqiu,
                &url,
                &query,
                credential,
                Some(REFERER),
            )
            .await?;
            let response: ListResponse = parse_body(&body, "xueqiu search")?;
            if response.list.is_empty() {
                break;
            }
            // Search results are not reliably ordered; never stop early.
            for status in &response.list {
                if let Some(item) =
                    Self::build_item(status, target, None, Some(keyword), window)
                {
                    items.push(item);
                }
            }
        }
        Ok(())
    }

    /// Append in-window statuses to `items`. Returns `true` when a status
    /// older than the window was seen, which ends a newest-first walk.
    fn collect(
        statuses: &[Status],
        target: &WatchTarget,
        symbol: Option<String>,
        topic: Option<&str>,
        window: &CrawlWindow,
        items: &mut Vec<RawItem>,
    ) -> bool {
        for status in statuses {
            let posted_at = posted_at(status);
            if let Some(ts) = posted_at {
                if ts < window.start {
                    return true;
                }
            }
            if let Some(item) = Self::build_item(status, target, symbol.clone(), topic, window) {
                items.push(item);
            }
        }
        false
    }

    fn build_item(
        status: &Status,
        target: &WatchTarget,
        symbol: Option<String>,
        topic: Option<&str>,
        window: &CrawlWindow,
    ) -> Option<RawItem> {
        let id = json_id(&status.id)?;
        let posted_at = posted_at(status)?;
        if !window.contains(posted_at) {
            return None;
        }

        let content = if status.text.is_empty() {
            status.description.clone()
        } else {
            status.text.clone()
        };

        let mut item = RawItem::new(Platform::Xueqiu, id);
        item.target_id = Some(target.id);
        item.symbol = symbol;
        item.author_id = status.user.as_ref().and_then(|u| json_id(&u.id));
        item.author_name = status
            .user
            .as_ref()
            .map(|u| u.screen_name.clone())
            .filter(|s| !s.is_empty());
        item.content = Some(content);
        item.url = Some(format!("https://xueqiu.com{}", status.target));
        item.posted_at = Some(posted_at);
        item.heat_score = Some(heat_score(
            status.like_count,
            status.reply_count,
            status.retweet_count,
        ));
        item.topic = topic.map(str::to_owned);
        if !status.symbols.is_empty() {
            let symbols: Vec<&str> = status.symbols.iter().map(|s| s.symbol.as_str()).collect();
            item.extra = Some(serde_json::json!({ "symbols": symbols }));
        }
        Some(item)
    }
}

fn posted_at(status: &Status) -> Option<DateTime<Utc>> {
    if status.created_at == 0 {
        return None;
    }
    DateTime::from_timestamp_millis(status.created_at)
}

#[async_trait]
impl PlatformAdapter for XueqiuAdapter {
    fn platform(&self) -> Platform {
        Platform::Xueqiu
    }

    async fn fetch(
        &self,
        credential: &Credential,
        targets: &[WatchTarget],
        window: &CrawlWindow,
    ) -> Result<Vec<RawItem>, CrawlError> {
        let mut items = Vec::new();
        for target in targets {
            match target.kind {
                TargetKind::Account => {
                    self.fetch_user_timeline(credential, target, window, &mut items)
                        .await?;
                }
                TargetKind::Symbol => {
                    self.fetch_stock_timeline(credential, target, window, &mut items)
                        .await?;
                }
                TargetKind::Keyword => {
                    let Some(keyword) = target.keyword.as_deref() else {
                        tracing::warn!(target = %target.display_name, "xueqiu keyword target has no keyword, skipping");
                        continue;
                    };
                    self.fetch_keyword(credential, target, keyword, window, &mut items)
                        .await?;
                }
            }
            tracing::info!(
                platform = "xueqiu",
                target = %target.display_name,
                total = items.len(),
                "target fetched"
            );
        }
        Ok(items)
    }
}
