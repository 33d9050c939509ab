// Global configuration constants - single source of truth

pub struct Config;

impl Config {
    // Scheduling
    pub const DEFAULT_INTERVAL_MINS: u64 = 1;
    pub const MIN_INTERVAL_MINS: u64 = 1;
    pub const DEFAULT_MAX_WORKERS: usize = 8;

    // HTTP/Network
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024; // 10MB
    pub const MAX_RETRIES: u32 = 2;
    pub const RETRY_BACKOFF_MS: u64 = 500;
    pub const POOL_IDLE_PER_HOST: usize = 16;
    pub const POOL_IDLE_TIMEOUT_SECS: u64 = 30;

    // Identity
    pub const DEFAULT_USER_AGENT: &'static str = "SeoWatch/1.0";

    // Persistence
    pub const DEFAULT_DB_NAME: &'static str = "seo_data.db";
}
