//! Platform crawlers for weibo, zhihu, and xueqiu.
//!
//! Each adapter hits its platform's public JSON endpoints with a borrowed
//! cookie credential, filters to the requested date window, and normalizes
//! posts into [`RawItem`]s. Auth rejections and rate limits surface as typed
//! errors so the scheduler can decide whether to retry or re-authenticate.

pub mod adapter;
pub mod error;
mod http;
pub mod parse;
pub mod retry;
pub mod types;
pub mod weibo;
pub mod xueqiu;
pub mod zhihu;

pub use adapter::PlatformAdapter;
pub use error::CrawlError;
pub use retry::{is_retriable, retry_with_backoff};
pub use types::RawItem;
pub use weibo::WeiboAdapter;
pub use xueqiu::XueqiuAdapter;
pub use zhihu::ZhihuAdapter;
