use std::net::SocketAddr;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Hour of day (platform timezone) the daily crawl fires.
    pub daily_job_hour: u8,
    /// Base URL of the external browser-automation bridge, if deployed.
    pub auth_bridge_url: Option<String>,
    pub headless: bool,
    pub auth_timeout_secs: u64,
    pub session_max_failures: u32,
    pub crawler_max_retries: u32,
    pub crawler_backoff_base_ms: u64,
    pub crawler_request_timeout_secs: u64,
    pub crawler_user_agent: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[redacted]")
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("daily_job_hour", &self.daily_job_hour)
            .field("auth_bridge_url", &self.auth_bridge_url)
            .field("headless", &self.headless)
            .field("auth_timeout_secs", &self.auth_timeout_secs)
            .field("session_max_failures", &self.session_max_failures)
            .field("crawler_max_retries", &self.crawler_max_retries)
            .field("crawler_backoff_base_ms", &self.crawler_backoff_base_ms)
            .field(
                "crawler_request_timeout_secs",
                &self.crawler_request_timeout_secs,
            )
            .field("crawler_user_agent", &self.crawler_user_agent)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
