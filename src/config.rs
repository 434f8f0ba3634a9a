use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Settings shared by the fetcher, the orchestrators and the storage.
///
/// Built once at start-up (from the command line or the environment) and
/// passed down by reference.
#[derive(Debug, Clone, clap::Args)]
pub struct Config {
    /// User-Agent header sent with every request
    #[arg(long, env = "CRAWLER_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "CRAWLER_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per URL before giving up
    #[arg(
        long,
        env = "CRAWLER_MAX_RETRIES",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_retries: u32,

    /// Base delay between requests in milliseconds
    #[arg(long, env = "CRAWLER_REQUEST_DELAY_MS", default_value_t = 1000)]
    pub request_delay_ms: u64,

    /// SQLite database name, stored as `<name>.db`
    #[arg(long, env = "CRAWLER_DATABASE", default_value = "naver")]
    pub database: String,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            max_retries: 3,
            request_delay_ms: 1000,
            database: "naver".to_string(),
        }
    }
}
