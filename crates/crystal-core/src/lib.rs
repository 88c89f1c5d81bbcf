use thiserror::Error;

mod app_config;
mod config;
mod platform;
mod window;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use platform::{Credential, Platform, PlatformSelector, TargetKind, WatchTarget};
pub use window::{day_window, previous_day_window, CrawlWindow, PLATFORM_TZ_OFFSET_HOURS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
