//! SessionManager behaviour against a live Postgres and fake authenticators.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crystal_core::{Credential, Platform};
use crystal_db::sessions::status;
use crystal_session::{
    Authenticator, LoginOutcome, NullAuthenticator, SessionError, SessionManager,
};

fn credential_with(key: &str) -> Credential {
    let mut cred = Credential::default();
    cred.cookies.insert(key.to_owned(), "tok".to_owned());
    cred
}

/// Succeeds after a short delay, counting invocations.
struct CountingAuthenticator {
    calls: AtomicU32,
    delay: Duration,
}

#[async_trait]
impl Authenticator for CountingAuthenticator {
    async fn authenticate(&self, platform: Platform) -> Result<LoginOutcome, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(LoginOutcome {
            username: format!("{platform}_user"),
            credential: credential_with("SUB"),
        })
    }
}

/// Never completes; used to exercise login timeouts.
struct HangingAuthenticator;

#[async_trait]
impl Authenticator for HangingAuthenticator {
    async fn authenticate(&self, _platform: Platform) -> Result<LoginOutcome, SessionError> {
        std::future::pending().await
    }
}

/// Always reports a failed login.
struct FailingAuthenticator;

#[async_trait]
impl Authenticator for FailingAuthenticator {
    async fn authenticate(&self, platform: Platform) -> Result<LoginOutcome, SessionError> {
        Err(SessionError::LoginFailed {
            platform,
            reason: "captcha wall".to_owned(),
        })
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn get_session_reuses_stored_credential(pool: sqlx::PgPool) {
    let auth = Arc::new(CountingAuthenticator {
        calls: AtomicU32::new(0),
        delay: Duration::ZERO,
    });
    let manager = SessionManager::new(pool, Arc::clone(&auth) as Arc<dyn Authenticator>, 5, 3);

    let first = manager.get_session(Platform::Weibo).await.expect("login");
    assert!(first.credential.has_cookie("SUB"));
    assert_eq!(auth.calls.load(Ordering::SeqCst), 1);

    let second = manager.get_session(Platform::Weibo).await.expect("reuse");
    assert_eq!(second.username.as_deref(), Some("weibo_user"));
    assert_eq!(
        auth.calls.load(Ordering::SeqCst),
        1,
        "a healthy stored session must not trigger another login"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_callers_share_one_login(pool: sqlx::PgPool) {
    let auth = Arc::new(CountingAuthenticator {
        calls: AtomicU32::new(0),
        delay: Duration::from_millis(100),
    });
    let manager = Arc::new(SessionManager::new(
        pool,
        Arc::clone(&auth) as Arc<dyn Authenticator>,
        5,
        3,
    ));

    let a = tokio::spawn({
        let m = Arc::clone(&manager);
        async move { m.get_session(Platform::Zhihu).await }
    });
    let b = tokio::spawn({
        let m = Arc::clone(&manager);
        async move { m.get_session(Platform::Zhihu).await }
    });

    a.await.expect("task").expect("session");
    b.await.expect("task").expect("session");
    assert_eq!(
        auth.calls.load(Ordering::SeqCst),
        1,
        "the second caller must observe the first caller's login"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn repeated_failures_expire_the_session(pool: sqlx::PgPool) {
    let manager = SessionManager::new(pool, Arc::new(FailingAuthenticator), 5, 3);

    for _ in 0..3 {
        manager
            .mark_unhealthy(Platform::Xueqiu, "403 from timeline")
            .await
            .expect("mark unhealthy");
    }

    let health = manager
        .status_for(Platform::Xueqiu)
        .await
        .expect("status");
    assert_eq!(health.status, status::EXPIRED);
    assert!(!health.is_healthy);
    assert_eq!(health.consecutive_failures, 3);

    // An expired session forces a login, which this authenticator fails.
    let err = manager
        .get_session(Platform::Xueqiu)
        .await
        .expect_err("login must be attempted and fail");
    assert!(matches!(err, SessionError::LoginFailed { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn manual_login_timeout_preserves_prior_session(pool: sqlx::PgPool) {
    let good = SessionManager::new(
        pool.clone(),
        Arc::new(CountingAuthenticator {
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        }),
        5,
        3,
    );
    good.get_session(Platform::Weibo).await.expect("seed login");

    let hanging = SessionManager::new(pool, Arc::new(HangingAuthenticator), 5, 3);
    let err = hanging
        .manual_login(Platform::Weibo, 0)
        .await
        .expect_err("hanging login must time out");
    assert!(matches!(
        err,
        SessionError::LoginTimeout {
            platform: Platform::Weibo,
            ..
        }
    ));

    let health = hanging.status_for(Platform::Weibo).await.expect("status");
    assert_eq!(
        health.status,
        status::HEALTHY,
        "a timed-out manual login must not invalidate the working credential"
    );
    assert!(health.last_error.as_deref().is_some_and(|e| e.contains("timed out")));

    // The stored credential is still served.
    let session = hanging
        .get_session(Platform::Weibo)
        .await
        .expect("stored session survives");
    assert!(session.credential.has_cookie("SUB"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn null_authenticator_reports_automation_unavailable(pool: sqlx::PgPool) {
    let manager = SessionManager::new(pool, Arc::new(NullAuthenticator), 5, 3);
    let err = manager
        .get_session(Platform::Zhihu)
        .await
        .expect_err("no bridge, no login");
    assert!(matches!(
        err,
        SessionError::AutomationUnavailable {
            platform: Platform::Zhihu
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn status_reports_unauthenticated_for_fresh_platforms(pool: sqlx::PgPool) {
    let manager = SessionManager::new(pool, Arc::new(NullAuthenticator), 5, 3);
    let report = manager.status().await.expect("status");
    assert_eq!(report.len(), Platform::ALL.len());
    assert!(report.iter().all(|h| h.status == status::UNAUTHENTICATED));
    assert!(report.iter().all(|h| !h.is_healthy));
}
