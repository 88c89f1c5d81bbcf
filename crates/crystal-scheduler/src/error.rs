use crystal_core::Platform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A detached trigger overlaps platforms that are already being crawled.
    #[error("a crawl is already running for {platforms:?}")]
    AlreadyRunning { platforms: Vec<Platform> },

    #[error(transparent)]
    Db(#[from] crystal_db::DbError),
}
