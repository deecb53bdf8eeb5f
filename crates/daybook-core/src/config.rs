//! Configuration module for the Daybook sync engine.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, defaults, and the sync-window and retry constants
//! the engine runs on.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub timing: TimingConfig,
    pub windows: WindowConfig,
    pub detection: DetectionConfig,
    pub limits: LimitConfig,
}

/// Timer cadence for the three schedules driving the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds between steady fetch/apply cycles.
    pub cycle_interval_secs: u64,
    /// Seconds between integrity-check ticks.
    pub integrity_interval_secs: u64,
    /// Seconds to delay the one-shot first cycle after start.
    pub first_cycle_delay_secs: u64,
    /// Minimum seconds between two cycles regardless of trigger source.
    pub min_cycle_spacing_secs: u64,
}

/// Remote fetch window selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Days into the future covered by the first full-window fetch.
    pub first_run_horizon_days: i64,
    /// Days on either side of now for the steady-state rolling window.
    pub rolling_window_days: i64,
}

/// Change-detection and conflict-pairing thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Timestamp deltas at or below this many seconds are clock jitter,
    /// not real changes.
    pub time_jitter_secs: i64,
    /// Local/remote actions within this many seconds of each other pair
    /// into a conflict.
    pub conflict_window_secs: i64,
    /// Seconds an entity stays in the recently-touched set.
    pub touched_ttl_secs: i64,
    /// Seconds after a touch during which a missing remote event is not
    /// treated as a deletion.
    pub deletion_touch_guard_secs: i64,
    /// Seconds a local edit lease suppresses remote-origin writes.
    pub edit_lease_secs: i64,
}

/// Bounded-resource and audit limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum tombstones kept before FIFO eviction.
    pub tombstone_cap: usize,
    /// Entities examined per integrity-audit invocation.
    pub audit_batch_size: usize,
    /// Milliseconds of work allowed per integrity-audit invocation.
    pub audit_batch_budget_ms: u64,
    /// Incremental index updates that force the next full audit scan.
    pub full_scan_after_updates: u32,
    /// Seconds the user must be idle before an audit may run.
    pub audit_idle_secs: i64,
    /// Minimum seconds between two audit runs.
    pub audit_spacing_secs: i64,
    /// Seconds the action queue must be stable before an audit may run.
    pub audit_queue_stable_secs: i64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 20,
            integrity_interval_secs: 30,
            first_cycle_delay_secs: 5,
            min_cycle_spacing_secs: 5,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            first_run_horizon_days: 90,
            rolling_window_days: 45,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            time_jitter_secs: 120,
            conflict_window_secs: 60,
            touched_ttl_secs: 60,
            deletion_touch_guard_secs: 30,
            edit_lease_secs: 30,
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            tombstone_cap: 1000,
            audit_batch_size: 20,
            audit_batch_budget_ms: 10,
            full_scan_after_updates: 30,
            audit_idle_secs: 60,
            audit_spacing_secs: 30,
            audit_queue_stable_secs: 2,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`SyncConfig::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/daybook/sync.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("daybook")
            .join("sync.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_constants() {
        let config = SyncConfig::default();
        assert_eq!(config.timing.cycle_interval_secs, 20);
        assert_eq!(config.timing.first_cycle_delay_secs, 5);
        assert_eq!(config.timing.min_cycle_spacing_secs, 5);
        assert_eq!(config.windows.first_run_horizon_days, 90);
        assert_eq!(config.windows.rolling_window_days, 45);
        assert_eq!(config.detection.time_jitter_secs, 120);
        assert_eq!(config.detection.conflict_window_secs, 60);
        assert_eq!(config.limits.tombstone_cap, 1000);
        assert_eq!(config.limits.audit_batch_size, 20);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "timing:\n  cycle_interval_secs: 60\n";
        let config: SyncConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timing.cycle_interval_secs, 60);
        assert_eq!(config.timing.integrity_interval_secs, 30);
        assert_eq!(config.windows, WindowConfig::default());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = SyncConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: SyncConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = SyncConfig::load_or_default(Path::new("/nonexistent/sync.yaml"));
        assert_eq!(config, SyncConfig::default());
    }
}
