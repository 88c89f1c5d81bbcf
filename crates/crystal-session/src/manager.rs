//! The session state machine.
//!
//! `platform_sessions` is the source of truth; the manager adds the one
//! piece of process state the table cannot hold: a per-platform `tokio`
//! mutex so at most one login per platform runs at a time. Waiters re-read
//! the row after acquiring the mutex, so a login completed by a concurrent
//! caller is reused instead of repeated.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crystal_core::{Credential, Platform};
use crystal_db::sessions::{self, status};

use crate::authenticator::Authenticator;
use crate::error::SessionError;

/// A borrowed, usable credential for one platform.
#[derive(Debug, Clone)]
pub struct Session {
    pub platform: Platform,
    pub username: Option<String>,
    pub credential: Credential,
}

/// Point-in-time health report for one platform's session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionHealth {
    pub platform: Platform,
    pub status: String,
    pub is_healthy: bool,
    pub username: Option<String>,
    pub consecutive_failures: i32,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

pub struct SessionManager {
    pool: PgPool,
    authenticator: Arc<dyn Authenticator>,
    auth_timeout: Duration,
    max_failures: i32,
    login_locks: [Mutex<()>; Platform::ALL.len()],
}

fn lock_index(platform: Platform) -> usize {
    match platform {
        Platform::Weibo => 0,
        Platform::Zhihu => 1,
        Platform::Xueqiu => 2,
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(
        pool: PgPool,
        authenticator: Arc<dyn Authenticator>,
        auth_timeout_secs: u64,
        max_failures: i32,
    ) -> Self {
        Self {
            pool,
            authenticator,
            auth_timeout: Duration::from_secs(auth_timeout_secs),
            max_failures,
            login_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
        }
    }

    /// Returns a usable credential for `platform`, re-authenticating if the
    /// stored session is absent, expired, or empty.
    ///
    /// # Errors
    ///
    /// [`SessionError::LoginTimeout`] / [`SessionError::LoginFailed`] /
    /// [`SessionError::AutomationUnavailable`] when re-authentication was
    /// needed and did not produce a credential; [`SessionError::Db`] on
    /// persistence failures.
    pub async fn get_session(&self, platform: Platform) -> Result<Session, SessionError> {
        if let Some(session) = self.usable_session(platform).await? {
            return Ok(session);
        }

        let _guard = self.login_locks[lock_index(platform)].lock().await;
        // A concurrent caller may have logged in while we waited.
        if let Some(session) = self.usable_session(platform).await? {
            return Ok(session);
        }
        self.authenticate_locked(platform, self.auth_timeout).await
    }

    /// Record a mid-fetch auth rejection. After `max_failures` consecutive
    /// rejections the session is expired, forcing a fresh login on the next
    /// [`Self::get_session`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Db`] if the update fails.
    pub async fn mark_unhealthy(&self, platform: Platform, error: &str) -> Result<(), SessionError> {
        let row =
            sessions::record_use_failure(&self.pool, platform.as_str(), error, self.max_failures)
                .await?;
        if row.status == status::EXPIRED {
            tracing::warn!(
                %platform,
                failures = row.consecutive_failures,
                "session expired after repeated auth rejections"
            );
        } else {
            tracing::debug!(%platform, failures = row.consecutive_failures, "session degraded");
        }
        Ok(())
    }

    /// Clear the failure counter after a successful use of the credential.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Db`] if the update fails.
    pub async fn mark_healthy(&self, platform: Platform) -> Result<(), SessionError> {
        match sessions::reset_session_health(&self.pool, platform.as_str()).await {
            Ok(()) => Ok(()),
            // Nothing to reset if the platform never authenticated.
            Err(crystal_db::DbError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Force a login with the caller's timeout, regardless of current
    /// health. A timed-out or failed attempt leaves the stored status
    /// untouched, so a still-working credential survives a botched re-login.
    ///
    /// # Errors
    ///
    /// As for [`Self::get_session`].
    pub async fn manual_login(
        &self,
        platform: Platform,
        timeout_secs: u64,
    ) -> Result<Session, SessionError> {
        let _guard = self.login_locks[lock_index(platform)].lock().await;
        self.authenticate_locked(platform, Duration::from_secs(timeout_secs))
            .await
    }

    /// Health report for every platform.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Db`] if a row read fails.
    pub async fn status(&self) -> Result<Vec<SessionHealth>, SessionError> {
        let mut out = Vec::with_capacity(Platform::ALL.len());
        for platform in Platform::ALL {
            out.push(self.status_for(platform).await?);
        }
        Ok(out)
    }

    /// Health report for one platform.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Db`] if the row read fails.
    pub async fn status_for(&self, platform: Platform) -> Result<SessionHealth, SessionError> {
        let checked_at = Utc::now();
        let row = sessions::get_session_row(&self.pool, platform.as_str()).await?;
        Ok(match row {
            Some(row) => SessionHealth {
                platform,
                is_healthy: row.status == status::HEALTHY,
                status: row.status,
                username: row.username,
                consecutive_failures: row.consecutive_failures,
                last_login_at: row.last_login_at,
                last_error: row.last_error,
                checked_at,
            },
            None => SessionHealth {
                platform,
                status: status::UNAUTHENTICATED.to_owned(),
                is_healthy: false,
                username: None,
                consecutive_failures: 0,
                last_login_at: None,
                last_error: None,
                checked_at,
            },
        })
    }

    async fn usable_session(&self, platform: Platform) -> Result<Option<Session>, SessionError> {
        let Some(row) = sessions::get_session_row(&self.pool, platform.as_str()).await? else {
            return Ok(None);
        };
        if row.status != status::HEALTHY && row.status != status::DEGRADED {
            return Ok(None);
        }
        let credential = row
            .credential
            .as_ref()
            .and_then(|v| serde_json::from_value::<Credential>(v.clone()).ok())
            .filter(|c| !c.is_empty());
        Ok(credential.map(|credential| Session {
            platform,
            username: row.username,
            credential,
        }))
    }

    /// Runs one authentication attempt. Caller must hold the platform lock.
    async fn authenticate_locked(
        &self,
        platform: Platform,
        timeout: Duration,
    ) -> Result<Session, SessionError> {
        tracing::info!(%platform, timeout_secs = timeout.as_secs(), "authenticating");
        match tokio::time::timeout(timeout, self.authenticator.authenticate(platform)).await {
            Err(_) => {
                let timeout_secs = timeout.as_secs();
                let reason = format!("login timed out after {timeout_secs}s");
                sessions::record_login_failure(&self.pool, platform.as_str(), &reason).await?;
                Err(SessionError::LoginTimeout {
                    platform,
                    timeout_secs,
                })
            }
            Ok(Err(err)) => {
                sessions::record_login_failure(&self.pool, platform.as_str(), &err.to_string())
                    .await?;
                Err(err)
            }
            Ok(Ok(outcome)) => {
                if outcome.credential.is_empty() {
                    let reason = "login produced an empty cookie jar";
                    sessions::record_login_failure(&self.pool, platform.as_str(), reason).await?;
                    return Err(SessionError::NoCredentials { platform });
                }
                let value = serde_json::to_value(&outcome.credential).map_err(|e| {
                    SessionError::LoginFailed {
                        platform,
                        reason: format!("credential serialization: {e}"),
                    }
                })?;
                sessions::record_login_success(
                    &self.pool,
                    platform.as_str(),
                    &outcome.username,
                    &value,
                )
                .await?;
                tracing::info!(%platform, username = %outcome.username, "login succeeded");
                Ok(Session {
                    platform,
                    username: Some(outcome.username),
                    credential: outcome.credential,
                })
            }
        }
    }
}
