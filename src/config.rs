use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://letterboxd.com";
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_SESSION_REFRESH: usize = 5;
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 2;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DELAY_MS: u64 = 500;

/// Path of the downstream cache-invalidation endpoint, relative to `BACKEND_URL`.
pub const CACHE_INVALIDATION_PATH: &str = "/api/admin/clear-movie-data-cache";

/// Scheduling, connection and politeness limits for a run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub base_url: String,
    pub batch_size: usize,
    /// Batches per session window, and batches running concurrently within it.
    pub session_refresh: usize,
    pub max_connections: usize,
    pub max_connections_per_host: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Pause before every request.
    pub request_delay: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            session_refresh: DEFAULT_SESSION_REFRESH,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_delay: Duration::from_millis(DEFAULT_DELAY_MS),
        }
    }
}

/// Which queue entries a run targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    First(usize),
    Single(String),
}

/// Credentials for the post-run cache invalidation call.
#[derive(Debug, Clone)]
pub struct Downstream {
    pub backend_url: String,
    pub admin_secret: String,
}

impl Downstream {
    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.backend_url.trim_end_matches('/'),
            CACHE_INVALIDATION_PATH
        )
    }
}

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub scope: Scope,
    pub persist: bool,
    pub show_objects: bool,
    /// `Some` when post-run cache invalidation is requested and configured.
    pub invalidate: Option<Downstream>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            scope: Scope::All,
            persist: false,
            show_objects: false,
            invalidate: None,
        }
    }
}

/// `--num-movies` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    All,
    First(usize),
}

/// clap value parser for `--num-movies`: a positive integer or `all`.
pub fn parse_limit(value: &str) -> Result<Limit, String> {
    const MSG: &str = "must be a positive integer or \"all\"";
    if value == "all" {
        return Ok(Limit::All);
    }
    match value.parse::<usize>() {
        Ok(0) | Err(_) => Err(MSG.to_string()),
        Ok(n) => Ok(Limit::First(n)),
    }
}
