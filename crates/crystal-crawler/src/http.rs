//! Shared HTTP plumbing for the platform adapters.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};

use crystal_core::{Credential, Platform};

use crate::error::CrawlError;

/// Builds the adapter's `reqwest` client with timeout and `User-Agent`.
///
/// # Errors
///
/// Returns [`CrawlError::Transport`] if the client cannot be constructed
/// (e.g. invalid TLS config).
pub(crate) fn build_client(timeout_secs: u64, user_agent: &str) -> Result<Client, CrawlError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// Sends a GET request with the credential's cookie header and returns the
/// response body.
///
/// Status mapping: 401/403 → [`CrawlError::AuthExpired`], 429 →
/// [`CrawlError::RateLimited`] (honouring `Retry-After`), any other non-2xx
/// → [`CrawlError::Transport`].
pub(crate) async fn get_body(
    client: &Client,
    platform: Platform,
    url: &str,
    query: &[(&str, String)],
    credential: &Credential,
    referer: Option<&str>,
) -> Result<String, CrawlError> {
    let mut request = client
        .get(url)
        .query(query)
        .header(header::ACCEPT, "application/json");
    if !credential.is_empty() {
        request = request.header(header::COOKIE, credential.cookie_header());
    }
    if let Some(referer) = referer {
        request = request.header(header::REFERER, referer);
    }

    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(CrawlError::AuthExpired {
            platform,
            status: status.as_u16(),
        });
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(CrawlError::RateLimited {
            platform,
            retry_after_secs,
        });
    }

    let response = response.error_for_status()?;
    Ok(response.text().await?)
}

/// Deserializes a response body, tagging failures with a request context.
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(
    body: &str,
    context: &str,
) -> Result<T, CrawlError> {
    serde_json::from_str(body).map_err(|e| CrawlError::Malformed {
        context: context.to_owned(),
        source: e,
    })
}
