//! Zhihu adapter: member answers and articles via the v4 API, plus
//! `search_v3` for keyword targets. Answer/article content is HTML; it is
//! stripped and truncated before storage. Zhihu has no reposts, so heat is
//! votes and comments only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crystal_core::{CrawlWindow, Credential, Platform, TargetKind, WatchTarget};

use crate::adapter::PlatformAdapter;
use crate::error::CrawlError;
use crate::http::{build_client, get_body, parse_body};
use crate::parse::{heat_score, json_id, strip_html, truncate_chars};
use crate::types::RawItem;

const DEFAULT_API_BASE: &str = "https://www.zhihu.com/api/v4";
const PAGE_SIZE: u32 = 20;
const MAX_MEMBER_OFFSET: u32 = 100;
const MAX_SEARCH_OFFSET: u32 = 60;
const CONTENT_MAX_CHARS: usize = 500;

pub struct ZhihuAdapter {
    client: Client,
    api_base: String,
    inter_page_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default = "default_true")]
    is_end: bool,
}

impl Default for Paging {
    // A missing paging block means there is nothing further to page.
    fn default() -> Self {
        Self { is_end: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct MemberResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    paging: Paging,
}

#[derive(Debug, Deserialize, Default)]
struct Answer {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    content: String,
    #[serde(default)]
    created_time: i64,
    #[serde(default)]
    voteup_count: i64,
    #[serde(default)]
    comment_count: i64,
    #[serde(default)]
    question: Question,
}

#[derive(Debug, Deserialize, Default)]
struct Question {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize, Default)]
struct Article {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    voteup_count: i64,
    #[serde(default)]
    comment_count: i64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchResult>,
    #[serde(default)]
    paging: Paging,
}

#[derive(Debug, Deserialize, Default)]
struct SearchResult {
    object: Option<SearchObject>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchObject {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    content: String,
    #[serde(default)]
    excerpt: String,
    #[serde(default)]
    created_time: i64,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    voteup_count: i64,
    #[serde(default)]
    comment_count: i64,
    #[serde(default)]
    url: String,
    author: Option<SearchAuthor>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchAuthor {
    #[serde(default)]
    url_token: String,
    #[serde(default)]
    name: String,
}

impl ZhihuAdapter {
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

    async fn fetch_answers(
        &self,
        credential: &Credential,
        target: &WatchTarget,
        url_token: &str,
        window: &CrawlWindow,
        items: &mut Vec<RawItem>,
    ) -> Result<(), CrawlError> {
        let url = format!("{}/members/{url_token}/answers", self.api_base);
        let referer = format!("https://www.zhihu.com/people/{url_token}");
        let mut offset = 0u32;

        while offset < MAX_MEMBER_OFFSET {
            if offset > 0 {
                self.page_delay().await;
            }
            let query = [
                (
                    "include",
                    "data[*].content,created_time,voteup_count,comment_count".to_owned(),
                ),
                ("offset", offset.to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("sort_by", "created".to_owned()),
            ];
            let body = get_body(
                &self.client,
                Platform::Zhihu,
                &url,
                &query,
                credential,
                Some(&referer),
            )
            .await?;
            let response: MemberResponse<Answer> = parse_body(&body, "zhihu answers")?;
            if response.data.is_empty() {
                break;
            }

            for answer in &response.data {
                let Some(posted_at) = timestamp(answer.created_time) else {
                    continue;
                };
                // Newest-first; everything after this is older.
                if posted_at < window.start {
                    return Ok(());
                }
                if !window.contains(posted_at) {
                    continue;
                }
                let Some(answer_id) = json_id(&answer.id) else {
                    tracing::debug!("zhihu answer without an id, skipping");
                    continue;
                };

                let text = truncate_chars(&strip_html(&answer.content), CONTENT_MAX_CHARS);
                let mut item = RawItem::new(Platform::Zhihu, answer_id.clone());
                item.target_id = Some(target.id);
                item.symbol = target.symbol.clone();
                item.author_id = Some(url_token.to_owned());
                item.author_name = Some(target.display_name.clone());
                item.content = Some(format!("【{}】{text}", answer.question.title));
                item.url = json_id(&answer.question.id).map(|qid| {
                    format!("https://www.zhihu.com/question/{qid}/answer/{answer_id}")
                });
                item.posted_at = Some(posted_at);
                item.heat_score = Some(heat_score(answer.voteup_count, answer.comment_count, 0));
                item.topic = Some(answer.question.title.clone());
                items.push(item);
            }

            if response.paging.is_end {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(())
    }

    async fn fetch_articles(
        &self,
        credential: &Credential,
        target: &WatchTarget,
        url_token: &str,
        window: &CrawlWindow,
        items: &mut Vec<RawItem>,
    ) -> Result<(), CrawlError> {
        let url = format!("{}/members/{url_token}/articles", self.api_base);
        let referer = format!("https://www.zhihu.com/people/{url_token}");
        let mut offset = 0u32;

        while offset < MAX_MEMBER_OFFSET {
            if offset > 0 {
                self.page_delay().await;
            }
            let query = [
                (
                    "include",
                    "data[*].content,created,voteup_count,comment_count".to_owned(),
                ),
                ("offset", offset.to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("sort_by", "created".to_owned()),
            ];
            let body = get_body(
                &self.client,
                Platform::Zhihu,
                &url,
                &query,
                credential,
                Some(&referer),
            )
            .await?;
            let response: MemberResponse<Article> = parse_body(&body, "zhihu articles")?;
            if response.data.is_empty() {
                break;
            }

            for article in &response.data {
                let Some(posted_at) = timestamp(article.created) else {
                    continue;
                };
                if posted_at < window.start {
                    return Ok(());
                }
                if !window.contains(posted_at) {
                    continue;
                }
                let Some(article_id) = json_id(&article.id) else {
                    tracing::debug!("zhihu article without an id, skipping");
                    continue;
                };

                let text = truncate_chars(&strip_html(&article.content), CONTENT_MAX_CHARS);
                let mut item = RawItem::new(Platform::Zhihu, format!("article_{article_id}"));
                item.target_id = Some(target.id);
                item.symbol = target.symbol.clone();
                item.author_id = Some(url_token.to_owned());
                item.author_name = Some(target.display_name.clone());
                item.content = Some(format!("【专栏】{}: {text}", article.title));
                item.url = Some(format!("https://zhuanlan.zhihu.com/p/{article_id}"));
                item.posted_at = Some(posted_at);
                item.heat_score = Some(heat_score(article.voteup_count, article.comment_count, 0));
                item.topic = Some(article.title.clone());
                items.push(item);
            }

            if response.paging.is_end {
                break;
            }
            offset += PAGE_SIZE;
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
        let url = format!("{}/search_v3", self.api_base);
        let mut offset = 0u32;

        while offset < MAX_SEARCH_OFFSET {
            if offset > 0 {
                self.page_delay().await;
            }
            let query = [
                ("t", "general".to_owned()),
                ("q", keyword.to_owned()),
                ("correction", "1".to_owned()),
                ("offset", offset.to_string()),
                ("limit", PAGE_SIZE.to_string()),
            ];
            let body =
                get_body(&self.client, Platform::Zhihu, &url, &query, credential, None).await?;
            let response: SearchResponse = parse_body(&body, "zhihu search")?;
            if response.data.is_empty() {
                break;
            }

            for result in &response.data {
                let Some(object) = &result.object else { continue };
                let created = if object.created_time != 0 {
                    object.created_time
                } else {
                    object.created
                };
                let Some(posted_at) = timestamp(created) else {
                    continue;
                };
                // Mixed result types are not ordered; skip, never stop.
                if !window.contains(posted_at) {
                    continue;
                }
                let Some(object_id) = json_id(&object.id) else {
                    continue;
                };

                let raw_content = if object.content.is_empty() {
                    object.excerpt.clone()
                } else {
                    object.content.clone()
                };
                let text = truncate_chars(&strip_html(&raw_content), CONTENT_MAX_CHARS);

                let mut item =
                    RawItem::new(Platform::Zhihu, format!("{}_{object_id}", object.kind));
                item.target_id = Some(target.id);
                item.author_id = object
                    .author
                    .as_ref()
                    .map(|a| a.url_token.clone())
                    .filter(|s| !s.is_empty());
                item.author_name = object
                    .author
                    .as_ref()
                    .map(|a| a.name.clone())
                    .filter(|s| !s.is_empty());
                item.content = Some(text);
                item.url = Some(object.url.clone()).filter(|s| !s.is_empty());
                item.posted_at = Some(posted_at);
                item.heat_score = Some(heat_score(object.voteup_count, object.comment_count, 0));
                item.topic = Some(keyword.to_owned());
                items.push(item);
            }

            if response.paging.is_end {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(())
    }
}

fn timestamp(epoch_secs: i64) -> Option<DateTime<Utc>> {
    if epoch_secs == 0 {
        return None;
    }
    DateTime::from_timestamp(epoch_secs, 0)
}

#[async_trait]
impl PlatformAdapter for ZhihuAdapter {
    fn platform(&self) -> Platform {
        Platform::Zhihu
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
                    let Some(url_token) = target.external_id.as_deref() else {
                        tracing::warn!(target = %target.display_name, "zhihu account target has no external_id, skipping");
                        continue;
                    };
                    self.fetch_answers(credential, target, url_token, window, &mut items)
                        .await?;
                    self.fetch_articles(credential, target, url_token, window, &mut items)
                        .await?;
                }
                TargetKind::Keyword => {
                    let Some(keyword) = target.keyword.as_deref() else {
                        tracing::warn!(target = %target.display_name, "zhihu keyword target has no keyword, skipping");
                        continue;
                    };
                    self.fetch_keyword(credential, target, keyword, window, &mut items)
                        .await?;
                }
                TargetKind::Symbol => {
                    tracing::warn!(target = %target.display_name, "zhihu has no symbol timeline, skipping");
                }
            }
            tracing::info!(
                platform = "zhihu",
                target = %target.display_name,
                total = items.len(),
                "target fetched"
            );
        }
        Ok(items)
    }
}
