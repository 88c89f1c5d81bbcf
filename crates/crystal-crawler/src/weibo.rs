//! Weibo adapter, built on the m.weibo.cn mobile JSON API.
//!
//! Account targets read the user timeline container; keyword targets go
//! through container search. Timelines are newest-first, so paging stops
//! early once a post falls before the window.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crystal_core::{CrawlWindow, Credential, Platform, TargetKind, WatchTarget};

use crate::adapter::PlatformAdapter;
use crate::error::CrawlError;
use crate::http::{build_client, get_body, parse_body};
use crate::parse::{heat_score, json_id, parse_weibo_time};
use crate::types::RawItem;

const DEFAULT_API_BASE: &str = "https://m.weibo.cn/api";
const MAX_TIMELINE_PAGES: u32 = 10;
const MAX_SEARCH_PAGES: u32 = 5;
const WEIBO_CARD_TYPE: i64 = 9;

pub struct WeiboAdapter {
    client: Client,
    api_base: String,
    inter_page_delay_ms: u64,
}

#[derive(Debug, Deserialize, Default)]
struct ContainerResponse {
    #[serde(default)]
    data: ContainerData,
}

#[derive(Debug, Deserialize, Default)]
struct ContainerData {
    #[serde(default)]
    cards: Vec<Card>,
}

#[derive(Debug, Deserialize, Default)]
struct Card {
    #[serde(default)]
    card_type: i64,
    mblog: Option<Mblog>,
    #[serde(default)]
    card_group: Vec<Card>,
}

#[derive(Debug, Deserialize, Default)]
struct Mblog {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    text: String,
    user: Option<MblogUser>,
    #[serde(default)]
    attitudes_count: i64,
    #[serde(default)]
    comments_count: i64,
    #[serde(default)]
    reposts_count: i64,
    #[serde(default)]
    source: String,
}

#[derive(Debug, Deserialize, Default)]
struct MblogUser {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    screen_name: String,
}

impl WeiboAdapter {
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
        let Some(uid) = target.external_id.as_deref() else {
            tracing::warn!(target = %target.display_name, "weibo account target has no external_id, skipping");
            return Ok(());
        };

        let url = format!("{}/container/getIndex", self.api_base);
        let now = Utc::now();

        for page in 1..=MAX_TIMELINE_PAGES {
            if page > 1 {
                self.page_delay().await;
            }
            let query = [
                ("type", "uid".to_owned()),
                ("value", uid.to_owned()),
                ("containerid", format!("107603{uid}")),
                ("page", page.to_string()),
            ];
            let body = get_body(&self.client, Platform::Weibo, &url, &query, credential, None).await?;
            let response: ContainerResponse = parse_body(&body, "weibo user timeline")?;
            if response.data.cards.is_empty() {
                break;
            }

            for card in &response.data.cards {
                if card.card_type != WEIBO_CARD_TYPE {
                    continue;
                }
                let Some(mblog) = &card.mblog else { continue };
                match Self::build_item(mblog, target, None, window, now) {
                    ItemInWindow::Keep(item) => items.push(item),
                    ItemInWindow::Skip => {}
                    // Timeline is newest-first; everything after this is older.
                    ItemInWindow::BeforeWindow => return Ok(()),
                }
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
        let url = format!("{}/container/getIndex", self.api_base);
        let now = Utc::now();

        for page in 1..=MAX_SEARCH_PAGES {
            if page > 1 {
                self.page_delay().await;
            }
            let query = [
                ("containerid", format!("100103type=1&q={keyword}")),
                ("page_type", "searchall".to_owned()),
                ("page", page.to_string()),
            ];
            let body = get_body(&self.client, Platform::Weibo, &url, &query, credential, None).await?;
            let response: ContainerResponse = parse_body(&body, "weibo search")?;
            if response.data.cards.is_empty() {
                break;
            }

            for card in &response.data.cards {
                for sub_card in &card.card_group {
                    if sub_card.card_type != WEIBO_CARD_TYPE {
                        continue;
                    }
                    let Some(mblog) = &sub_card.mblog else { continue };
                    // Search results are not strictly ordered; out-of-window
                    // posts are skipped instead of stopping the page walk.
                    if let ItemInWindow::Keep(item) =
                        Self::build_item(mblog, target, Some(keyword), window, now)
                    {
                        items.push(item);
                    }
                }
            }
        }
        Ok(())
    }

    fn build_item(
        mblog: &Mblog,
        target: &WatchTarget,
        topic: Option<&str>,
        window: &CrawlWindow,
        now: chrono::DateTime<Utc>,
    ) -> ItemInWindow {
        let Some(id) = json_id(&mblog.id) else {
            tracing::debug!("weibo card without an mblog id, skipping");
            return ItemInWindow::Skip;
        };
        let posted_at = parse_weibo_time(&mblog.created_at, now);
        match posted_at {
            Some(ts) if ts < window.start => return ItemInWindow::BeforeWindow,
            Some(ts) if !window.contains(ts) => return ItemInWindow::Skip,
            // Undatable posts cannot be windowed; drop them.
            None => return ItemInWindow::Skip,
            Some(_) => {}
        }

        let mut item = RawItem::new(Platform::Weibo, id.clone());
        item.target_id = Some(target.id);
        item.symbol = target.symbol.clone();
        item.author_id = mblog.user.as_ref().and_then(|u| json_id(&u.id));
        item.author_name = mblog
            .user
            .as_ref()
            .map(|u| u.screen_name.clone())
            .filter(|s| !s.is_empty());
        item.content = Some(mblog.text.clone());
        item.url = Some(format!("https://m.weibo.cn/status/{id}"));
        item.posted_at = posted_at;
        item.heat_score = Some(heat_score(
            mblog.attitudes_count,
            mblog.comments_count,
            mblog.reposts_count,
        ));
        item.topic = topic.map(str::to_owned);
        if !mblog.source.is_empty() {
            item.extra = Some(serde_json::json!({ "source": mblog.source }));
        }
        ItemInWindow::Keep(item)
    }
}

enum ItemInWindow {
    Keep(RawItem),
    Skip,
    BeforeWindow,
}

#[async_trait]
impl PlatformAdapter for WeiboAdapter {
    fn platform(&self) -> Platform {
        Platform::Weibo
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
                TargetKind::Keyword => {
                    let Some(keyword) = target.keyword.as_deref() else {
                        tracing::warn!(target = %target.display_name, "weibo keyword target has no keyword, skipping");
                        continue;
                    };
                    self.fetch_keyword(credential, target, keyword, window, &mut items)
                        .await?;
                }
                TargetKind::Symbol => {
                    tracing::warn!(target = %target.display_name, "weibo has no symbol timeline, skipping");
                }
            }
            tracing::info!(
                platform = "weibo",
                target = %target.display_name,
                total = items.len(),
                "target fetched"
            );
        }
        Ok(items)
    }
}
