//! Client configuration.

use std::env;
use std::time::Duration;

/// GitLab rejects `per_page` values outside this range.
pub const MAX_PER_PAGE: u32 = 100;
pub const DEFAULT_PER_PAGE: u32 = 20;
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api/v4";

/// Settings shared by every resource client built from one `GitLabClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, e.g. `https://gitlab.example.com/api/v4`. Stored without a
    /// trailing slash.
    pub base_url: String,
    /// Page size requested by every list operation.
    pub per_page: u32,
    /// Per-request deadline forwarded to the transport.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            per_page: DEFAULT_PER_PAGE,
            request_timeout: None,
        }
    }

    /// Read `GITLAB_URL`, `GITLAB_PER_PAGE` and `GITLAB_TIMEOUT_SECS`,
    /// falling back to defaults for missing or unparsable values.
    pub fn from_env() -> Self {
        let base_url = env::var("GITLAB_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(&base_url);
        if let Some(per_page) = env::var("GITLAB_PER_PAGE").ok().and_then(|v| v.parse().ok()) {
            config = config.with_per_page(per_page);
        }
        if let Some(secs) = env::var("GITLAB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Clamped to `1..=MAX_PER_PAGE`.
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
