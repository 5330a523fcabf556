use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RetryPolicy;
use crate::layout::LayoutConfig;
use crate::logs::LogStreamConfig;
use crate::runtime::RuntimeSettings;
use crate::watch::WatchConfig;

/// Everything the YAML file can tune, with defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub source: Option<PathBuf>,
    pub layout: LayoutConfig,
    pub logs: LogStreamConfig,
    pub watch: WatchConfig,
    pub retry: RetryPolicy,
    pub sequence_timeout: Duration,
    pub batch_size: usize,
    pub max_batch_age: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_file(None, ConfigFile::default())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    layout: LayoutConfig,
    logs: LogsSection,
    watch: WatchSection,
    keys: KeysSection,
    retry: RetrySection,
    messages: MessagesSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct LogsSection {
    capacity: usize,
    batch_size: usize,
    #[serde(alias = "flush_interval_ms")]
    flush_ms: u64,
    tail_lines: i64,
}

impl Default for LogsSection {
    fn default() -> Self {
        let defaults = LogStreamConfig::default();
        Self {
            capacity: defaults.capacity,
            batch_size: defaults.batch_size,
            flush_ms: defaults.flush_interval.as_millis() as u64,
            tail_lines: defaults.tail_lines,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct WatchSection {
    #[serde(alias = "poll_interval_ms")]
    poll_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            poll_ms: WatchConfig::default().poll_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct KeysSection {
    sequence_timeout_ms: u64,
}

impl Default for KeysSection {
    fn default() -> Self {
        Self {
            sequence_timeout_ms: crate::navigation::DEFAULT_SEQUENCE_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RetrySection {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
    max_attempts: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            multiplier: defaults.multiplier,
            max_attempts: defaults.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct MessagesSection {
    batch_size: usize,
    max_batch_age_ms: u64,
}

impl Default for MessagesSection {
    fn default() -> Self {
        Self {
            batch_size: crate::message::DEFAULT_BATCH_SIZE,
            max_batch_age_ms: crate::message::DEFAULT_MAX_BATCH_AGE.as_millis() as u64,
        }
    }
}

impl Settings {
    /// Loads the first config file found, or defaults when there is none.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match discover_config_path(explicit) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&raw, Some(path.to_path_buf()))
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    fn parse(raw: &str, source: Option<PathBuf>) -> Result<Self> {
        let parsed: ConfigFile = if raw.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        Ok(Self::from_file(source, parsed))
    }

    fn from_file(source: Option<PathBuf>, file: ConfigFile) -> Self {
        let retry = RetryPolicy {
            initial_delay: Duration::from_millis(file.retry.initial_delay_ms),
            max_delay: Duration::from_millis(file.retry.max_delay_ms),
            multiplier: file.retry.multiplier,
            max_attempts: file.retry.max_attempts.max(1),
        };
        let logs_defaults = LogStreamConfig::default();

        Self {
            source,
            layout: file.layout,
            logs: LogStreamConfig {
                capacity: file.logs.capacity.max(1),
                batch_size: file.logs.batch_size.max(1),
                flush_interval: Duration::from_millis(file.logs.flush_ms.max(1)),
                tail_lines: file.logs.tail_lines,
                queue_capacity: logs_defaults.queue_capacity,
            },
            watch: WatchConfig {
                poll_interval: Duration::from_millis(file.watch.poll_ms.max(100)),
                retry: retry.clone(),
                ..WatchConfig::default()
            },
            retry,
            sequence_timeout: Duration::from_millis(file.keys.sequence_timeout_ms),
            batch_size: file.messages.batch_size.max(1),
            max_batch_age: Duration::from_millis(file.messages.max_batch_age_ms),
        }
    }

    pub fn runtime_settings(&self, refresh_interval: Duration) -> RuntimeSettings {
        RuntimeSettings {
            layout: self.layout,
            refresh_interval,
            sequence_timeout: self.sequence_timeout,
            batch_size: self.batch_size,
            max_batch_age: self.max_batch_age,
            retry: self.retry.clone(),
            ..RuntimeSettings::default()
        }
    }
}

fn discover_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("KUBEDECK_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [PathBuf::from("kubedeck.yaml"), PathBuf::from(".kubedeck.yaml")];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let candidate = PathBuf::from(home).join(".config/kubedeck/config.yaml");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{Settings, discover_config_path};
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::parse("", None).expect("parse");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.logs.capacity, 1000);
        assert_eq!(settings.logs.batch_size, 10);
        assert_eq!(settings.logs.flush_interval, Duration::from_millis(100));
        assert_eq!(settings.watch.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.sequence_timeout, Duration::from_millis(500));
        assert_eq!(settings.batch_size, 5);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let raw = "\
layout:
  detail_width_percent: 40
logs:
  capacity: 50
retry:
  max_attempts: 2
keys:
  sequence_timeout_ms: 300
";
        let settings = Settings::parse(raw, None).expect("parse");
        assert_eq!(settings.layout.detail_width_percent, 40);
        assert_eq!(settings.layout.log_height_percent, 25);
        assert_eq!(settings.logs.capacity, 50);
        assert_eq!(settings.logs.batch_size, 10);
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.watch.retry.max_attempts, 2);
        assert_eq!(settings.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(settings.sequence_timeout, Duration::from_millis(300));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(Settings::parse("logs: [1, 2", None).is_err());
        assert!(Settings::parse("logs:\n  capacity: lots\n", None).is_err());
    }

    #[test]
    fn runtime_settings_carry_refresh_interval() {
        let runtime = Settings::default().runtime_settings(Duration::from_millis(750));
        assert_eq!(runtime.refresh_interval, Duration::from_millis(750));
        assert_eq!(runtime.list_timeout, Duration::from_secs(4));
    }

    #[test]
    fn explicit_path_wins_discovery() {
        let path = Path::new("/tmp/custom-kubedeck.yaml");
        assert_eq!(discover_config_path(Some(path)), Some(path.to_path_buf()));
    }
}
