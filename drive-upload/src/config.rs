use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
const STATE_DIR_NAME: &str = "drive-upload";
const STATE_DB_NAME: &str = "state.db";
pub const DEFAULT_INITIAL_CONCURRENCY: usize = 3;
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
const DEFAULT_SPEED_SAMPLE_MS: u64 = 800;

/// Knobs for the adaptive scheduler. The limit is not persisted: every run,
/// resumed or fresh, starts from `initial_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    pub initial_limit: usize,
    pub max_limit: usize,
    pub speed_sample_interval: Duration,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            initial_limit: DEFAULT_INITIAL_CONCURRENCY,
            max_limit: DEFAULT_MAX_CONCURRENCY,
            speed_sample_interval: Duration::from_millis(DEFAULT_SPEED_SAMPLE_MS),
        }
    }
}

impl ConcurrencyConfig {
    /// Caps `max_limit` at [`DEFAULT_MAX_CONCURRENCY`] and keeps
    /// `initial_limit` within `1..=max_limit`.
    pub fn new(initial_limit: usize, max_limit: usize, speed_sample_interval: Duration) -> Self {
        let max_limit = max_limit.clamp(1, DEFAULT_MAX_CONCURRENCY);
        Self {
            initial_limit: initial_limit.clamp(1, max_limit),
            max_limit,
            speed_sample_interval,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            read_usize_env("DRIVE_INITIAL_CONCURRENCY", DEFAULT_INITIAL_CONCURRENCY),
            read_usize_env("DRIVE_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY),
            Duration::from_millis(read_u64_env(
                "DRIVE_SPEED_SAMPLE_MS",
                DEFAULT_SPEED_SAMPLE_MS,
            )),
        )
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub state_dir: PathBuf,
    pub concurrency: ConcurrencyConfig,
}

impl UploadConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let state_dir = std::env::var("DRIVE_STATE_DIR")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(default_state_dir);
        let api_url = std::env::var("DRIVE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let token = std::env::var("DRIVE_TOKEN")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Ok(Self {
            api_url,
            token,
            state_dir,
            concurrency: ConcurrencyConfig::from_env(),
        })
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.state_dir.join(STATE_DB_NAME)
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STATE_DIR_NAME)
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_usize_env(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_tilde_to_home_state_dir() {
        let home = PathBuf::from("/tmp/home-user");
        assert_eq!(
            expand_with_home("~/.drive", &home),
            PathBuf::from("/tmp/home-user/.drive")
        );
        assert_eq!(expand_with_home("~", &home), home);
        assert_eq!(
            expand_with_home("/var/lib/drive", &home),
            PathBuf::from("/var/lib/drive")
        );
    }

    #[test]
    fn reads_numbers_from_env_or_default() {
        assert_eq!(read_u64_env("NO_SUCH_DRIVE_ENV_FOR_TEST", 42), 42);
        assert_eq!(read_usize_env("NO_SUCH_DRIVE_ENV_FOR_TEST", 7), 7);
    }

    #[test]
    fn default_concurrency_matches_aimd_bounds() {
        let config = ConcurrencyConfig::default();
        assert_eq!(config.initial_limit, 3);
        assert_eq!(config.max_limit, 10);
        assert_eq!(config.speed_sample_interval, Duration::from_millis(800));
    }

    #[test]
    fn configured_limits_are_capped_at_ten() {
        let tick = Duration::from_millis(100);
        let config = ConcurrencyConfig::new(3, 50, tick);
        assert_eq!(config.max_limit, 10);
        assert_eq!(config.initial_limit, 3);

        let config = ConcurrencyConfig::new(40, 50, tick);
        assert_eq!(config.initial_limit, 10);

        let config = ConcurrencyConfig::new(6, 4, tick);
        assert_eq!((config.initial_limit, config.max_limit), (4, 4));
    }
}
