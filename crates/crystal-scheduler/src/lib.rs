//! The crawl orchestrator.
//!
//! One worker per platform at a time: triggers that land while a platform is
//! already being crawled attach to the in-flight worker's shared future and
//! observe the same outcome. Across platforms, workers run in parallel.
//! Every trigger gets its own `crawl_runs` row, finalized from the outcomes
//! it observed.

pub mod error;
pub mod scheduler;
pub mod types;

pub use error::SchedulerError;
pub use scheduler::CrawlScheduler;
pub use types::{CancelFlag, PlatformOutcome, PlatformStatus, RunHandle, RunStatus, RunSummary, TriggerKind};
