//! Postcast configuration system.
//!
//! TOML file at `~/.postcast/config.toml`, every field defaulted so a partial
//! file works. Bot token and admin id may also come from the environment
//! (`POSTCAST_BOT_TOKEN`, `POSTCAST_ADMIN_ID`), which wins over the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PostcastError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostcastConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub admin_id: i64,
    /// IANA timezone all operator-facing times are expressed in. Storage and
    /// scheduling are always UTC; this is display/input only.
    #[serde(default = "default_display_timezone")]
    pub display_timezone: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

fn default_display_timezone() -> String {
    "Asia/Kolkata".into()
}

impl Default for PostcastConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            admin_id: 0,
            display_timezone: default_display_timezone(),
            scheduler: SchedulerConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl PostcastConfig {
    /// Load config from the default path, falling back to defaults if the
    /// file does not exist. Environment overrides are applied either way.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path (env overrides still apply).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PostcastError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PostcastError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("POSTCAST_BOT_TOKEN")
            && !token.is_empty()
        {
            self.bot_token = token;
        }
        if let Ok(id) = std::env::var("POSTCAST_ADMIN_ID")
            && let Ok(id) = id.trim().parse()
        {
            self.admin_id = id;
        }
    }

    /// Check the fields without which the process cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            return Err(PostcastError::Config(
                "bot_token is required (config file or POSTCAST_BOT_TOKEN)".into(),
            ));
        }
        if self.admin_id == 0 {
            return Err(PostcastError::Config(
                "admin_id is required (config file or POSTCAST_ADMIN_ID)".into(),
            ));
        }
        self.timezone()?;
        if self.scheduler.poll_interval_secs == 0 {
            return Err(PostcastError::Config(
                "scheduler.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.scheduler.due_limit == 0 {
            return Err(PostcastError::Config("scheduler.due_limit must be at least 1".into()));
        }
        if self.scheduler.retention_minutes < 0 {
            return Err(PostcastError::Config(
                "scheduler.retention_minutes must not be negative".into(),
            ));
        }
        if self.delivery.batch_size == 0 {
            return Err(PostcastError::Config("delivery.batch_size must be at least 1".into()));
        }
        if self.delivery.max_attempts == 0 {
            return Err(PostcastError::Config("delivery.max_attempts must be at least 1".into()));
        }
        if self.delivery.send_timeout_secs == 0 {
            return Err(PostcastError::Config(
                "delivery.send_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Parse the configured display timezone.
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.display_timezone.parse().map_err(|_| {
            PostcastError::Config(format!("unknown timezone: {}", self.display_timezone))
        })
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Postcast home directory (~/.postcast).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".postcast")
    }

    /// Default database path (~/.postcast/posts.db).
    pub fn default_db_path() -> PathBuf {
        Self::home_dir().join("posts.db")
    }
}

/// Poller and retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-post poll cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Max due posts selected per cycle.
    #[serde(default = "default_due_limit")]
    pub due_limit: u32,
    /// Seconds to pause between posts within one cycle.
    #[serde(default = "default_inter_post_delay")]
    pub inter_post_delay_secs: u64,
    /// Run retention cleanup every N poll cycles.
    #[serde(default = "default_cleanup_every")]
    pub cleanup_every_cycles: u32,
    /// Minutes a delivered post is kept before purge.
    #[serde(default = "default_retention")]
    pub retention_minutes: i64,
}

fn default_poll_interval() -> u64 {
    15
}
fn default_due_limit() -> u32 {
    200
}
fn default_inter_post_delay() -> u64 {
    1
}
fn default_cleanup_every() -> u32 {
    2
}
fn default_retention() -> i64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            due_limit: default_due_limit(),
            inter_post_delay_secs: default_inter_post_delay(),
            cleanup_every_cycles: default_cleanup_every(),
            retention_minutes: default_retention(),
        }
    }
}

/// Fan-out delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Destinations dispatched concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seconds to sleep between batches (rate limiting).
    #[serde(default = "default_batch_delay")]
    pub batch_delay_secs: u64,
    /// Total attempts per destination, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff unit: wait = attempt * unit.
    #[serde(default = "default_backoff_unit")]
    pub backoff_unit_secs: u64,
    /// Per-request send timeout.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    20
}
fn default_batch_delay() -> u64 {
    2
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_unit() -> u64 {
    3
}
fn default_send_timeout() -> u64 {
    60
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_secs: default_batch_delay(),
            max_attempts: default_max_attempts(),
            backoff_unit_secs: default_backoff_unit(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PostcastConfig::default();
        assert_eq!(config.display_timezone, "Asia/Kolkata");
        assert_eq!(config.scheduler.poll_interval_secs, 15);
        assert_eq!(config.delivery.batch_size, 20);
        assert_eq!(config.delivery.max_attempts, 5);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            bot_token = "123:abc"
            admin_id = 42
            display_timezone = "UTC"

            [scheduler]
            poll_interval_secs = 5

            [delivery]
            batch_size = 10
        "#;
        let config: PostcastConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.admin_id, 42);
        assert_eq!(config.scheduler.poll_interval_secs, 5);
        assert_eq!(config.delivery.batch_size, 10);
        // Unspecified fields keep defaults
        assert_eq!(config.scheduler.retention_minutes, 30);
        assert_eq!(config.delivery.batch_delay_secs, 2);
    }

    #[test]
    fn test_validate_requires_token_and_admin() {
        let mut config = PostcastConfig::default();
        assert!(config.validate().is_err());
        config.bot_token = "123:abc".into();
        assert!(config.validate().is_err());
        config.admin_id = 42;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_tuning_values_rejected() {
        let mut config = PostcastConfig::default();
        config.bot_token = "123:abc".into();
        config.admin_id = 42;

        config.scheduler.poll_interval_secs = 0;
        assert!(config.validate().is_err());
        config.scheduler.poll_interval_secs = 15;

        config.delivery.batch_size = 0;
        assert!(config.validate().is_err());
        config.delivery.batch_size = 20;

        config.scheduler.retention_minutes = -5;
        assert!(config.validate().is_err());
        config.scheduler.retention_minutes = 30;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_timezone_rejected() {
        let mut config = PostcastConfig::default();
        config.bot_token = "t".into();
        config.admin_id = 1;
        config.display_timezone = "Mars/Olympus".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_home_dir() {
        assert!(
            PostcastConfig::home_dir()
                .to_string_lossy()
                .contains("postcast")
        );
    }
}
