use crystal_core::Platform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// The platform rejected the session credential (HTTP 401/403).
    /// Never retried in-run; the session manager handles re-authentication.
    #[error("{platform} rejected the session credential (HTTP {status})")]
    AuthExpired { platform: Platform, status: u16 },

    /// HTTP 429 from the platform.
    #[error("rate limited by {platform} (retry after {retry_after_secs}s)")]
    RateLimited {
        platform: Platform,
        retry_after_secs: u64,
    },

    /// Network, TLS, or non-2xx failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be deserialized into the expected shape.
    #[error("malformed response for {context}: {source}")]
    Malformed {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
