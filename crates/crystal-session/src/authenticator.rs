//! Credential acquisition.
//!
//! Actual logins run in an external browser-automation bridge (the platforms
//! gate logins behind QR codes and SMS challenges, so a headless reqwest
//! flow cannot complete them). [`HttpAuthenticator`] calls that bridge;
//! [`NullAuthenticator`] stands in when no bridge is configured.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crystal_core::{Credential, Platform};

use crate::error::SessionError;

/// Cookies a login must produce before it counts as successful, per platform.
#[must_use]
pub fn required_cookie_keys(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Weibo => &["SUB", "SUBP"],
        Platform::Zhihu => &["z_c0"],
        Platform::Xueqiu => &["xq_a_token"],
    }
}

/// A completed login: who logged in and the cookie jar they got.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub username: String,
    pub credential: Credential,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, platform: Platform) -> Result<LoginOutcome, SessionError>;
}

/// Talks to the external login bridge over HTTP.
///
/// `POST {bridge_url}/login` with `{"platform": ..., "headless": ...}`;
/// the bridge drives the browser (or waits for a manual login) and replies
/// with the captured username and cookies.
pub struct HttpAuthenticator {
    client: reqwest::Client,
    bridge_url: String,
    headless: bool,
}

#[derive(Debug, Deserialize)]
struct BridgeLoginResponse {
    #[serde(default)]
    username: String,
    #[serde(default)]
    cookies: BTreeMap<String, String>,
}

impl HttpAuthenticator {
    /// # Errors
    ///
    /// Returns the underlying error if the HTTP client cannot be constructed.
    pub fn new(bridge_url: impl Into<String>, headless: bool) -> Result<Self, reqwest::Error> {
        // No request timeout here; the caller bounds the whole login with
        // tokio::time::timeout, and manual logins legitimately take minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            bridge_url: bridge_url.into(),
            headless,
        })
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, platform: Platform) -> Result<LoginOutcome, SessionError> {
        let url = format!("{}/login", self.bridge_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "platform": platform.as_str(),
                "headless": self.headless,
            }))
            .send()
            .await
            .map_err(|e| SessionError::LoginFailed {
                platform,
                reason: format!("bridge unreachable: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::LoginFailed {
                platform,
                reason: format!("bridge returned HTTP {status}: {body}"),
            });
        }

        let parsed: BridgeLoginResponse =
            response
                .json()
                .await
                .map_err(|e| SessionError::LoginFailed {
                    platform,
                    reason: format!("malformed bridge response: {e}"),
                })?;

        for key in required_cookie_keys(platform) {
            if !parsed.cookies.contains_key(*key) {
                return Err(SessionError::LoginFailed {
                    platform,
                    reason: format!("login did not produce required cookie {key}"),
                });
            }
        }

        Ok(LoginOutcome {
            username: parsed.username,
            credential: Credential {
                cookies: parsed.cookies,
            },
        })
    }
}

/// Used when `CRYSTAL_AUTH_BRIDGE_URL` is unset: every automatic login
/// fails fast and sessions can only be fed by an operator-side bridge.
pub struct NullAuthenticator;

#[async_trait]
impl Authenticator for NullAuthenticator {
    async fn authenticate(&self, platform: Platform) -> Result<LoginOutcome, SessionError> {
        Err(SessionError::AutomationUnavailable { platform })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_authenticator_returns_cookie_jar() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_partial_json(serde_json::json!({"platform": "zhihu"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "zhihu_user",
                "cookies": { "z_c0": "tok", "d_c0": "extra" }
            })))
            .mount(&server)
            .await;

        let auth = HttpAuthenticator::new(server.uri(), true).expect("client");
        let outcome = auth.authenticate(Platform::Zhihu).await.expect("login");
        assert_eq!(outcome.username, "zhihu_user");
        assert!(outcome.credential.has_cookie("z_c0"));
        assert_eq!(outcome.credential.cookies.len(), 2);
    }

    #[tokio::test]
    async fn http_authenticator_rejects_missing_required_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "weibo_user",
                "cookies": { "SUB": "only-half" }
            })))
            .mount(&server)
            .await;

        let auth = HttpAuthenticator::new(server.uri(), true).expect("client");
        let err = auth
            .authenticate(Platform::Weibo)
            .await
            .expect_err("missing SUBP must fail");
        assert!(
            matches!(err, SessionError::LoginFailed { reason, .. } if reason.contains("SUBP")),
            "unexpected error"
        );
    }

    #[tokio::test]
    async fn http_authenticator_surfaces_bridge_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(500).set_body_string("browser crashed"))
            .mount(&server)
            .await;

        let auth = HttpAuthenticator::new(server.uri(), true).expect("client");
        let err = auth
            .authenticate(Platform::Xueqiu)
            .await
            .expect_err("500 must fail");
        assert!(matches!(err, SessionError::LoginFailed { .. }));
    }

    #[tokio::test]
    async fn null_authenticator_is_always_unavailable() {
        let err = NullAuthenticator
            .authenticate(Platform::Weibo)
            .await
            .expect_err("null authenticator never succeeds");
        assert!(matches!(
            err,
            SessionError::AutomationUnavailable {
                platform: Platform::Weibo
            }
        ));
    }
}
