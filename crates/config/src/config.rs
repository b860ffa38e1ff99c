//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Subdirectory of the work path holding relocated HDR10+ metadata sidecars.
pub const QUEUE_EXTRAS_DIR: &str = "queue_extras";

/// Subdirectory of the work path holding relocated cover attachments.
pub const COVERS_DIR: &str = "covers";

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Queue file locking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockConfig {
    /// Maximum time to wait for the lock file (default 30s)
    #[serde(default = "default_lock_timeout_secs")]
    pub timeout_secs: f64,
    /// Age after which an existing lock file is presumed abandoned (default 60s)
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: f64,
    /// Sleep between acquisition attempts (default 100ms)
    #[serde(default = "default_lock_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_lock_timeout_secs() -> f64 {
    30.0
}

fn default_stale_after_secs() -> f64 {
    60.0
}

fn default_lock_poll_interval_ms() -> u64 {
    100
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_lock_timeout_secs(),
            stale_after_secs: default_stale_after_secs(),
            poll_interval_ms: default_lock_poll_interval_ms(),
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        secs_to_duration(self.timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        secs_to_duration(self.stale_after_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        millis_to_poll_interval(self.poll_interval_ms)
    }
}

/// Background save worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaverConfig {
    /// Bounded poll interval of the worker loop (default 500ms)
    #[serde(default = "default_saver_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long shutdown waits for queued saves (default 5s)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: f64,
    /// How long a flush waits for queued saves (default 10s)
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: f64,
}

fn default_saver_poll_interval_ms() -> u64 {
    500
}

fn default_shutdown_timeout_secs() -> f64 {
    5.0
}

fn default_flush_timeout_secs() -> f64 {
    10.0
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_saver_poll_interval_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            flush_timeout_secs: default_flush_timeout_secs(),
        }
    }
}

impl SaverConfig {
    pub fn poll_interval(&self) -> Duration {
        millis_to_poll_interval(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        secs_to_duration(self.shutdown_timeout_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        secs_to_duration(self.flush_timeout_secs)
    }
}

/// Where externally referenced queue resources get copied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationConfig {
    pub work_path: PathBuf,
}

impl RelocationConfig {
    pub fn new(work_path: impl Into<PathBuf>) -> Self {
        Self {
            work_path: work_path.into(),
        }
    }

    /// Directory for relocated HDR10+ metadata sidecars.
    pub fn extras_dir(&self) -> PathBuf {
        self.work_path.join(QUEUE_EXTRAS_DIR)
    }

    /// Directory for relocated cover attachments.
    pub fn covers_dir(&self) -> PathBuf {
        self.work_path.join(COVERS_DIR)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Managed work directory used for resource relocation
    #[serde(default)]
    pub work_path: Option<PathBuf>,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub saver: SaverConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - ENCODE_QUEUE_LOCK_TIMEOUT_SECS -> lock.timeout_secs
    /// - ENCODE_QUEUE_STALE_LOCK_SECS -> lock.stale_after_secs
    /// - ENCODE_QUEUE_SAVER_POLL_MS -> saver.poll_interval_ms
    /// - ENCODE_QUEUE_WORKDIR -> work_path
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("ENCODE_QUEUE_LOCK_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<f64>() {
                self.lock.timeout_secs = secs;
            }
        }

        if let Ok(val) = env::var("ENCODE_QUEUE_STALE_LOCK_SECS") {
            if let Ok(secs) = val.parse::<f64>() {
                self.lock.stale_after_secs = secs;
            }
        }

        if let Ok(val) = env::var("ENCODE_QUEUE_SAVER_POLL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.saver.poll_interval_ms = ms;
            }
        }

        if let Ok(val) = env::var("ENCODE_QUEUE_WORKDIR") {
            if !val.trim().is_empty() {
                self.work_path = Some(PathBuf::from(val));
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Relocation target derived from `work_path`, if one is configured.
    pub fn relocation(&self) -> Option<RelocationConfig> {
        self.work_path.as_ref().map(RelocationConfig::new)
    }
}

/// Negative and NaN values collapse to zero, values too large for a
/// `Duration` saturate to `Duration::MAX`.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Poll intervals never go below 1ms so waiting loops sleep instead of spinning.
fn millis_to_poll_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("ENCODE_QUEUE_LOCK_TIMEOUT_SECS");
        env::remove_var("ENCODE_QUEUE_STALE_LOCK_SECS");
        env::remove_var("ENCODE_QUEUE_SAVER_POLL_MS");
        env::remove_var("ENCODE_QUEUE_WORKDIR");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            timeout in 0.0f64..600.0,
            stale in 1.0f64..3600.0,
            lock_poll in 1u64..1000,
            saver_poll in 1u64..5000,
        ) {
            let toml_str = format!(
                r#"
work_path = "/var/tmp/encode-work"

[lock]
timeout_secs = {:?}
stale_after_secs = {:?}
poll_interval_ms = {}

[saver]
poll_interval_ms = {}
"#,
                timeout, stale, lock_poll, saver_poll
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert!((config.lock.timeout_secs - timeout).abs() < 1e-9);
            prop_assert!((config.lock.stale_after_secs - stale).abs() < 1e-9);
            prop_assert_eq!(config.lock.poll_interval_ms, lock_poll);
            prop_assert_eq!(config.saver.poll_interval_ms, saver_poll);
            prop_assert_eq!(config.work_path, Some(PathBuf::from("/var/tmp/encode-work")));
        }

        #[test]
        fn prop_env_overrides_stale_threshold(
            initial in 1.0f64..600.0,
            override_secs in 1u32..600,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[lock]\nstale_after_secs = {:?}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("ENCODE_QUEUE_STALE_LOCK_SECS", override_secs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert!((config.lock.stale_after_secs - override_secs as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.work_path, None);
        assert_eq!(config.lock.timeout(), Duration::from_secs(30));
        assert_eq!(config.lock.stale_after(), Duration::from_secs(60));
        assert_eq!(config.lock.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.saver.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.saver.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.saver.flush_timeout(), Duration::from_secs(10));
        assert!(config.relocation().is_none());
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[lock]
timeout_secs = 2.5
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.lock.timeout(), Duration::from_millis(2500));
        assert_eq!(config.lock.stale_after(), Duration::from_secs(60)); // default
        assert_eq!(config.saver, SaverConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Config::parse_toml("[lock\ntimeout_secs = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_workdir_and_invalid_values() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("ENCODE_QUEUE_WORKDIR", "/srv/queue-work");
        env::set_var("ENCODE_QUEUE_LOCK_TIMEOUT_SECS", "not-a-number");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.work_path, Some(PathBuf::from("/srv/queue-work")));
        // Invalid value, keep existing
        assert_eq!(config.lock.timeout_secs, 30.0);
    }

    #[test]
    fn test_relocation_dirs() {
        let config = Config {
            work_path: Some(PathBuf::from("/work")),
            ..Config::default()
        };
        let relocation = config.relocation().expect("work_path is set");

        assert_eq!(relocation.extras_dir(), PathBuf::from("/work/queue_extras"));
        assert_eq!(relocation.covers_dir(), PathBuf::from("/work/covers"));
    }

    #[test]
    fn test_negative_durations_clamp_to_zero() {
        let lock = LockConfig {
            timeout_secs: -3.0,
            stale_after_secs: f64::NAN,
            poll_interval_ms: 0,
        };
        assert_eq!(lock.timeout(), Duration::ZERO);
        assert_eq!(lock.stale_after(), Duration::ZERO);
    }

    #[test]
    fn test_huge_durations_saturate() {
        let config = Config::parse_toml(
            "[lock]\ntimeout_secs = 1e300\nstale_after_secs = 1e300\n\n[saver]\nshutdown_timeout_secs = 1e300\n",
        )
        .expect("Valid TOML");

        assert_eq!(config.lock.timeout(), Duration::MAX);
        assert_eq!(config.lock.stale_after(), Duration::MAX);
        assert_eq!(config.saver.shutdown_timeout(), Duration::MAX);

        let lock = LockConfig {
            timeout_secs: f64::INFINITY,
            ..LockConfig::default()
        };
        assert_eq!(lock.timeout(), Duration::MAX);
    }

    #[test]
    fn test_huge_env_timeout_saturates() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("ENCODE_QUEUE_LOCK_TIMEOUT_SECS", "1e300");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.lock.timeout(), Duration::MAX);
    }

    #[test]
    fn test_zero_poll_intervals_clamp_to_one_millisecond() {
        let config = Config::parse_toml("[lock]\npoll_interval_ms = 0\n\n[saver]\npoll_interval_ms = 0\n")
            .expect("Valid TOML");

        assert_eq!(config.lock.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.saver.poll_interval(), Duration::from_millis(1));
    }
}
