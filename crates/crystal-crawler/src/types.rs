use chrono::{DateTime, Utc};
use crystal_core::Platform;
use serde_json::Value;

/// One normalized observation of a platform post, ready for the store.
///
/// `external_id` is the platform-native id; together with `platform` it is
/// the dedup identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub platform: Platform,
    pub external_id: String,
    pub target_id: Option<i64>,
    pub symbol: Option<String>,
    pub root_post_id: Option<String>,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub heat_score: Option<f64>,
    pub topic: Option<String>,
    pub extra: Option<Value>,
}

impl RawItem {
    /// A bare item for `platform`/`external_id` with every optional field
    /// unset. Adapters fill in what the platform payload actually carried.
    #[must_use]
    pub fn new(platform: Platform, external_id: String) -> Self {
        Self {
            platform,
            external_id,
            target_id: None,
            symbol: None,
            root_post_id: None,
            author_id: None,
            author_name: None,
            content: None,
            url: None,
            posted_at: None,
            heat_score: None,
            topic: None,
            extra: None,
        }
    }
}
