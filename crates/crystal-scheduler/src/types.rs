use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crystal_core::{CrawlWindow, Platform};

/// What started a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Timer,
    Manual,
}

impl TriggerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Timer => "timer",
            TriggerKind::Manual => "manual",
        }
    }
}

/// Terminal status of one platform worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformStatus {
    Completed,
    Failed,
    Cancelled,
}

impl PlatformStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PlatformStatus::Completed => "completed",
            PlatformStatus::Failed => "failed",
            PlatformStatus::Cancelled => "cancelled",
        }
    }
}

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

/// What one platform worker did. Cloned to every trigger attached to the
/// worker's shared future.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformOutcome {
    pub platform: Platform,
    pub status: PlatformStatus,
    pub items_seen: i32,
    pub items_saved: i32,
    pub error: Option<String>,
}

/// The result one trigger observed.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub public_id: Uuid,
    pub status: RunStatus,
    #[serde(skip)]
    pub window: CrawlWindow,
    pub platforms: Vec<PlatformOutcome>,
}

/// Identifier pair returned by a detached trigger.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunHandle {
    pub run_id: i64,
    pub public_id: Uuid,
}

/// Cooperative cancellation, checked between item saves.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
