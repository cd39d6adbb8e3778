use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Environment
    pub environment: String,

    // GitHub
    pub github_token: String,
    pub github_api_url: String,
    pub github_web_url: String,

    // Translation service
    pub deepl_api_key: String,
    pub deepl_api_url: String,

    // Project registry
    pub projects_file: String,

    // Access control
    pub admin_users: Vec<String>,
    pub api_key: Option<String>,

    // Server
    pub port: u16,

    // Remote call policy
    pub request_timeout_secs: u64,
    pub rate_limit_warning_threshold: u64,
    pub fork_settle_delay_secs: u64,

    // Limits
    pub max_content_bytes: usize,
    pub init_rate_limit_per_hour: u32,
    pub metadata_write_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),

            // GitHub - elevated credential for metadata writes and initialization
            github_token: std::env::var("GITHUB_TOKEN").context("GITHUB_TOKEN not set")?,
            github_api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            github_web_url: std::env::var("GITHUB_WEB_URL")
                .unwrap_or_else(|_| "https://github.com".to_string()),

            // DeepL
            deepl_api_key: std::env::var("DEEPL_API_KEY").context("DEEPL_API_KEY not set")?,
            deepl_api_url: std::env::var("DEEPL_API_URL")
                .unwrap_or_else(|_| "https://api-free.deepl.com".to_string()),

            projects_file: std::env::var("PROJECTS_FILE")
                .unwrap_or_else(|_| "config/projects.json".to_string()),

            admin_users: std::env::var("ADMIN_USERS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            api_key: std::env::var("API_KEY").ok().filter(|v| !v.is_empty()),

            port: env_or("PORT", 8080),

            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            rate_limit_warning_threshold: env_or("RATE_LIMIT_WARNING_THRESHOLD", 100),
            fork_settle_delay_secs: env_or("FORK_SETTLE_DELAY_SECS", 3),

            max_content_bytes: env_or("MAX_CONTENT_BYTES", 1_048_576),
            init_rate_limit_per_hour: env_or("INIT_RATE_LIMIT_PER_HOUR", 5),
            metadata_write_attempts: env_or("METADATA_WRITE_ATTEMPTS", 5),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fork_settle_delay(&self) -> Duration {
        Duration::from_secs(self.fork_settle_delay_secs)
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
