use crystal_core::Platform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// A login completed but produced no usable cookie jar.
    #[error("{platform} session has no usable credential")]
    NoCredentials { platform: Platform },

    /// The authenticator did not complete within the allowed time.
    #[error("{platform} login timed out after {timeout_secs}s")]
    LoginTimeout {
        platform: Platform,
        timeout_secs: u64,
    },

    /// The authenticator ran and reported failure.
    #[error("{platform} login failed: {reason}")]
    LoginFailed { platform: Platform, reason: String },

    /// No browser-automation bridge is configured for this deployment.
    #[error("no automation bridge is configured for {platform}")]
    AutomationUnavailable { platform: Platform },

    #[error(transparent)]
    Db(#[from] crystal_db::DbError),
}
