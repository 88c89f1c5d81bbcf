use async_trait::async_trait;
use crystal_core::{CrawlWindow, Credential, Platform, WatchTarget};

use crate::error::CrawlError;
use crate::types::RawItem;

/// A crawler for one platform.
///
/// `fetch` takes a full snapshot of the platform's enabled watch targets and
/// returns every in-window item it observed. Malformed platform records are
/// skipped and logged inside the adapter; only session rejection, rate
/// limiting, and transport failures are fatal to the fetch.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch(
        &self,
        credential: &Credential,
        targets: &[WatchTarget],
        window: &CrawlWindow,
    ) -> Result<Vec<RawItem>, CrawlError>;
}
