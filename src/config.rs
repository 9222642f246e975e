//! Application-level configuration loading for the court authority.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::state::{
    authority::AuthoritySettings, court::CourtMode, match_machine::DisputePolicy,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/court.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COURT_QUEUE_CONFIG_PATH";
/// Environment variable that overrides the configured admin token.
const ADMIN_TOKEN_ENV: &str = "COURT_QUEUE_ADMIN_TOKEN";
/// Smallest queue able to produce a match.
const MIN_QUEUE_CAPACITY: usize = 2;

/// Per-connection action budget.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Actions accepted per window.
    pub max_actions: u32,
    /// Window length.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "window_secs")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_actions: 20,
            window: Duration::from_secs(10),
        }
    }
}

/// Immutable runtime configuration shared across the application.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Maximum number of waiting teams.
    pub queue_capacity: usize,
    /// Score that ends a match.
    pub target_score: u32,
    /// Time teams get to confirm a result.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "confirmation_window_secs")]
    pub confirmation_window: Duration,
    /// Pause between matches.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "court_cooldown_secs")]
    pub court_cooldown: Duration,
    /// Rest before a team re-enters the queue.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "team_cooldown_secs")]
    pub team_cooldown: Duration,
    /// Handling of conflicting confirmations.
    pub dispute_policy: DisputePolicy,
    /// Start matches without admin intervention.
    pub auto_start: bool,
    /// Whether the court accepts teams at startup.
    pub court_open: bool,
    /// Court mode at startup.
    pub court_mode: CourtMode,
    /// Display timezone reported in court status.
    pub timezone: String,
    /// Finished matches kept for history.
    pub archive_limit: usize,
    /// Period of the timer sweep.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "tick_interval_ms")]
    pub tick_interval: Duration,
    /// Per-connection action budget.
    pub rate_limit: RateLimitConfig,
    /// Token guarding admin routes and the admin room; `None` leaves them open.
    pub admin_token: Option<String>,
    /// Capacity of each room broadcast channel.
    pub room_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            target_score: 21,
            confirmation_window: Duration::from_secs(60),
            court_cooldown: Duration::ZERO,
            team_cooldown: Duration::from_secs(120),
            dispute_policy: DisputePolicy::Park,
            auto_start: true,
            court_open: true,
            court_mode: CourtMode::Regular,
            timezone: "UTC".into(),
            archive_limit: 50,
            tick_interval: Duration::from_millis(500),
            rate_limit: RateLimitConfig::default(),
            admin_token: None,
            room_capacity: 64,
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        capacity = config.queue_capacity,
                        target_score = config.target_score,
                        "loaded court configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_env_overrides()
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<Self>(contents).map(Self::sanitized)
    }

    /// Runtime tunables handed to the authority.
    pub fn authority_settings(&self) -> AuthoritySettings {
        AuthoritySettings {
            queue_capacity: self.queue_capacity,
            target_score: self.target_score,
            confirmation_window: self.confirmation_window,
            court_cooldown: self.court_cooldown,
            team_cooldown: self.team_cooldown,
            dispute_policy: self.dispute_policy,
            auto_start: self.auto_start,
            court_open: self.court_open,
            court_mode: self.court_mode,
            archive_limit: self.archive_limit,
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(token) = env::var(ADMIN_TOKEN_ENV).ok().filter(|token| !token.is_empty()) {
            info!("admin token provided through environment");
            self.admin_token = Some(token);
        }
        if self.admin_token.is_none() {
            warn!("no admin token configured; admin routes and room are open");
        }
        self
    }

    fn sanitized(mut self) -> Self {
        if self.queue_capacity < MIN_QUEUE_CAPACITY {
            warn!(
                configured = self.queue_capacity,
                "queue capacity too small to start a match; raising it"
            );
            self.queue_capacity = MIN_QUEUE_CAPACITY;
        }
        if self.target_score == 0 {
            warn!("target score of 0 would end matches immediately; using 21");
            self.target_score = 21;
        }
        if self.tick_interval.is_zero() {
            self.tick_interval = Duration::from_millis(500);
        }
        if self.room_capacity == 0 {
            self.room_capacity = 64;
        }
        self.admin_token = self.admin_token.filter(|token| !token.is_empty());
        self
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.confirmation_window, Duration::from_secs(60));
        assert_eq!(config.dispute_policy, DisputePolicy::Park);
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn durations_are_read_in_seconds_and_millis() {
        let config = AppConfig::from_json(
            r#"{
                "confirmation_window_secs": 45,
                "team_cooldown_secs": 0,
                "tick_interval_ms": 250,
                "dispute_policy": "hold",
                "court_mode": "champion-return",
                "rate_limit": { "max_actions": 5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.confirmation_window, Duration::from_secs(45));
        assert!(config.team_cooldown.is_zero());
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.dispute_policy, DisputePolicy::Hold);
        assert_eq!(config.court_mode, CourtMode::ChampionReturn);
        assert_eq!(config.rate_limit.max_actions, 5);
        assert_eq!(config.rate_limit.window, Duration::from_secs(10));

        let settings = config.authority_settings();
        assert_eq!(settings.confirmation_window, Duration::from_secs(45));
    }

    #[test]
    fn nonsensical_values_are_corrected() {
        let config =
            AppConfig::from_json(r#"{ "queue_capacity": 1, "target_score": 0, "admin_token": "" }"#)
                .unwrap();
        assert_eq!(config.queue_capacity, 2);
        assert_eq!(config.target_score, 21);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(AppConfig::from_json(r#"{ "queue_capacity": "ten" }"#).is_err());
    }
}
