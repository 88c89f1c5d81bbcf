//! Per-platform session lifecycle: credential acquisition, health tracking,
//! and serialized re-authentication.
//!
//! The manager persists everything in `platform_sessions`; the process holds
//! no credential state of its own beyond the per-platform re-auth mutex, so
//! a restart picks up exactly where the table says it left off.

pub mod authenticator;
pub mod error;
pub mod manager;

pub use authenticator::{
    required_cookie_keys, Authenticator, HttpAuthenticator, LoginOutcome, NullAuthenticator,
};
pub use error::SessionError;
pub use manager::{Session, SessionHealth, SessionManager};
