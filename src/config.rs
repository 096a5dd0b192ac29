use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use sprintify_core::quota::{QuotaLimits, QuotaPolicy};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Runtime settings. Every flag falls back to a `SPRINTIFY_*` environment variable.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Address to bind the HTTP API to
    #[arg(long, env = "SPRINTIFY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the HTTP API
    #[arg(short, long, env = "SPRINTIFY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// SQLite database file (defaults to the platform data directory)
    #[arg(long, env = "SPRINTIFY_DATABASE")]
    pub database: Option<PathBuf>,

    /// Shared secret used to sign and verify bearer tokens
    #[arg(long, env = "SPRINTIFY_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "SPRINTIFY_GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,

    #[arg(long, env = "SPRINTIFY_GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_BASE_URL)]
    pub gemini_base_url: String,

    /// Webhook that receives push notifications for device tokens
    #[arg(long, env = "SPRINTIFY_PUSH_WEBHOOK")]
    pub push_webhook: Option<String>,

    /// Origins allowed by CORS (comma separated). Empty allows any origin.
    #[arg(long, env = "SPRINTIFY_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "SPRINTIFY_RATE_LIMIT", default_value_t = 100)]
    pub rate_limit: u32,

    #[arg(long, env = "SPRINTIFY_RATE_WINDOW_SECS", default_value_t = 60)]
    pub rate_window_secs: u64,

    #[arg(long, env = "SPRINTIFY_AI_RATE_LIMIT", default_value_t = 10)]
    pub ai_rate_limit: u32,

    #[arg(long, env = "SPRINTIFY_AI_RATE_WINDOW_SECS", default_value_t = 60)]
    pub ai_rate_window_secs: u64,

    #[arg(long, env = "SPRINTIFY_NORMAL_DAILY_QUOTA", default_value_t = 5)]
    pub normal_daily_quota: u32,

    #[arg(long, env = "SPRINTIFY_NORMAL_MONTHLY_QUOTA", default_value_t = 50)]
    pub normal_monthly_quota: u32,

    #[arg(long, env = "SPRINTIFY_PREMIUM_DAILY_QUOTA", default_value_t = 50)]
    pub premium_daily_quota: u32,

    #[arg(long, env = "SPRINTIFY_PREMIUM_MONTHLY_QUOTA", default_value_t = 1000)]
    pub premium_monthly_quota: u32,

    /// Open sprints (draft, active or paused) a normal user may hold at once
    #[arg(long, env = "SPRINTIFY_MAX_OPEN_SPRINTS", default_value_t = 3)]
    pub max_open_sprints: u32,

    /// Do not start the daily and hourly maintenance jobs
    #[arg(long, env = "SPRINTIFY_NO_JOBS")]
    pub no_jobs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            database: None,
            jwt_secret: None,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.into(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.into(),
            push_webhook: None,
            cors_origins: Vec::new(),
            rate_limit: 100,
            rate_window_secs: 60,
            ai_rate_limit: 10,
            ai_rate_window_secs: 60,
            normal_daily_quota: 5,
            normal_monthly_quota: 50,
            premium_daily_quota: 50,
            premium_monthly_quota: 1000,
            max_open_sprints: 3,
            no_jobs: false,
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            normal: QuotaLimits::new(self.normal_daily_quota, self.normal_monthly_quota),
            premium: QuotaLimits::new(self.premium_daily_quota, self.premium_monthly_quota),
            admin: QuotaLimits::UNLIMITED,
        }
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs.max(1))
    }

    pub fn ai_rate_window(&self) -> Duration {
        Duration::from_secs(self.ai_rate_window_secs.max(1))
    }

    /// The signing secret, if one is configured and non-empty.
    pub fn secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref().filter(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprintify_core::models::Role;

    #[test]
    fn default_policy_matches_flag_defaults() {
        let policy = Config::default().quota_policy();
        assert_eq!(policy.limits_for(Role::Normal), QuotaLimits::new(5, 50));
        assert_eq!(policy.limits_for(Role::Premium), QuotaLimits::new(50, 1000));
        assert_eq!(policy.limits_for(Role::Admin), QuotaLimits::UNLIMITED);
    }

    #[test]
    fn blank_secret_is_ignored() {
        let config = Config {
            jwt_secret: Some("  ".into()),
            ..Config::default()
        };
        assert!(config.secret().is_none());
    }
}
