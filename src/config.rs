//! # Simulator Configuration
//!
//! Controller timing, queue policy and joint layout are read from a TOML file.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [controller]
//! joint_names = ["shoulder", "upper_arm", "forearm", "wrist_1", "wrist_2", "wrist_3"]
//! external_axis = "track"
//! update_rate_hz = 200.0
//! queue_capacity = 2000
//! overflow = "reject"
//!
//! [publisher]
//! pub_rate_hz = 50.0
//! ```
//!
//! Every field is optional; missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
}

/// What `add_waypoint` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    #[default]
    Block,
    Reject,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    #[serde(default = "default_joint_names")]
    pub joint_names: Vec<String>,
    /// Auxiliary axis appended after the main joints.
    #[serde(default)]
    pub external_axis: Option<String>,
    #[serde(default = "default_update_rate_hz")]
    pub update_rate_hz: f64,
    /// Zero means unbounded.
    #[serde(default)]
    pub queue_capacity: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_subdivision_factor")]
    pub subdivision_factor: usize,
    #[serde(default = "default_settling_repeats")]
    pub settling_repeats: usize,
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: i64,
    #[serde(default = "default_connection_poll_ms")]
    pub connection_poll_ms: u64,
    #[serde(default)]
    pub initial_joint_state: Option<Vec<f64>>,
    #[serde(default)]
    pub start_connected: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            joint_names: default_joint_names(),
            external_axis: None,
            update_rate_hz: default_update_rate_hz(),
            queue_capacity: 0,
            overflow: OverflowPolicy::default(),
            subdivision_factor: default_subdivision_factor(),
            settling_repeats: default_settling_repeats(),
            high_water_mark: default_high_water_mark(),
            connection_poll_ms: default_connection_poll_ms(),
            initial_joint_state: None,
            start_connected: false,
        }
    }
}

impl ControllerConfig {
    /// Controller joint order: main joints followed by the external axis, if any.
    pub fn controller_joint_names(&self) -> Vec<String> {
        let mut names = self.joint_names.clone();
        if let Some(axis) = &self.external_axis {
            names.push(axis.clone());
        }
        names
    }

    pub fn dof(&self) -> usize {
        self.joint_names.len() + usize::from(self.external_axis.is_some())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_rate_hz)
    }

    pub fn connection_poll_interval(&self) -> Duration {
        Duration::from_millis(self.connection_poll_ms)
    }

    pub fn queue_capacity(&self) -> Option<usize> {
        (self.queue_capacity > 0).then_some(self.queue_capacity)
    }

    pub fn initial_positions(&self) -> Vec<f64> {
        self.initial_joint_state
            .clone()
            .unwrap_or_else(|| vec![0.0; self.dof()])
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.joint_names.is_empty() {
            return Err("joint_names must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for name in self.controller_joint_names() {
            if !seen.insert(name.clone()) {
                return Err(format!("Duplicate joint name '{}'", name));
            }
        }
        if rate_period(self.update_rate_hz).is_none() {
            return Err(format!(
                "update_rate_hz {} does not give a usable tick period",
                self.update_rate_hz
            ));
        }
        if self.connection_poll_ms == 0 {
            return Err("connection_poll_ms must be at least 1".to_string());
        }
        if self.subdivision_factor == 0 {
            return Err("subdivision_factor must be at least 1".to_string());
        }
        if self.external_axis.is_some() && self.subdivision_factor > self.dof() {
            return Err(format!(
                "subdivision_factor {} exceeds the {} sample slots available for the external axis",
                self.subdivision_factor,
                self.dof()
            ));
        }
        if self.high_water_mark < 0 {
            return Err("high_water_mark must be >= 0".to_string());
        }
        if let Some(initial) = &self.initial_joint_state {
            if initial.len() != self.dof() {
                return Err(format!(
                    "initial_joint_state has {} values, expected {}",
                    initial.len(),
                    self.dof()
                ));
            }
            if initial.iter().any(|v| !v.is_finite()) {
                return Err("initial_joint_state must be finite".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublisherConfig {
    #[serde(default = "default_pub_rate_hz")]
    pub pub_rate_hz: f64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            pub_rate_hz: default_pub_rate_hz(),
        }
    }
}

impl PublisherConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.pub_rate_hz)
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate().map_err(ConfigError::Invalid)?;
        if rate_period(self.publisher.pub_rate_hz).is_none() {
            return Err(ConfigError::Invalid(format!(
                "pub_rate_hz {} does not give a usable publish period",
                self.publisher.pub_rate_hz
            )));
        }
        Ok(())
    }
}

/// Period of a rate in Hz, or `None` unless it is a finite, non-zero duration.
fn rate_period(rate_hz: f64) -> Option<Duration> {
    if rate_hz <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .ok()
        .filter(|period| !period.is_zero())
}

fn default_joint_names() -> Vec<String> {
    (1..=6).map(|i| format!("joint_{}", i)).collect()
}
fn default_update_rate_hz() -> f64 { 200.0 }
fn default_subdivision_factor() -> usize { 5 }
fn default_settling_repeats() -> usize { 3 }
fn default_high_water_mark() -> i64 { 800 }
fn default_connection_poll_ms() -> u64 { 500 }
fn default_pub_rate_hz() -> f64 { 50.0 }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.controller.joint_names.len(), 6);
        assert_eq!(config.controller.joint_names[0], "joint_1");
        assert_eq!(config.controller.update_rate_hz, 200.0);
        assert_eq!(config.controller.subdivision_factor, 5);
        assert_eq!(config.controller.settling_repeats, 3);
        assert_eq!(config.controller.high_water_mark, 800);
        assert_eq!(config.controller.queue_capacity(), None);
        assert_eq!(config.controller.overflow, OverflowPolicy::Block);
        assert_eq!(config.publisher.pub_rate_hz, 50.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("robot.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "[controller]\nexternal_axis = 'track'\nqueue_capacity = 16\noverflow = 'reject'"
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.controller.external_axis.as_deref(), Some("track"));
        assert_eq!(config.controller.queue_capacity(), Some(16));
        assert_eq!(config.controller.overflow, OverflowPolicy::Reject);
        assert_eq!(config.controller.dof(), 7);
        assert_eq!(config.controller.controller_joint_names()[6], "track");
        // Defaults for missing fields
        assert_eq!(config.controller.update_rate_hz, 200.0);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_robot.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validation_rejects_bad_layouts() {
        let mut config = Config::default();
        config.controller.joint_names.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.controller.joint_names[1] = "joint_1".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.controller.update_rate_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.controller.subdivision_factor = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.controller.external_axis = Some("track".to_string());
        config.controller.subdivision_factor = 8;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.controller.initial_joint_state = Some(vec![0.0; 3]);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.publisher.pub_rate_hz = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unusable_rates() {
        for rate in [1e-300, f64::NAN, f64::INFINITY, 1e300, -0.0] {
            let mut config = Config::default();
            config.controller.update_rate_hz = rate;
            assert!(config.validate().is_err(), "update_rate_hz {}", rate);

            let mut config = Config::default();
            config.publisher.pub_rate_hz = rate;
            assert!(config.validate().is_err(), "pub_rate_hz {}", rate);
        }

        let mut config = Config::default();
        config.controller.connection_poll_ms = 0;
        assert!(config.validate().is_err());

        // Slow but representable rates are fine
        let mut config = Config::default();
        config.controller.update_rate_hz = 0.5;
        config.publisher.pub_rate_hz = 0.5;
        assert!(config.validate().is_ok());
        assert_eq!(config.controller.tick(), Duration::from_secs(2));
        assert_eq!(config.publisher.period(), Duration::from_secs(2));
    }

    #[test]
    fn test_timing_helpers() {
        let config = ControllerConfig::default();
        assert_eq!(config.tick(), Duration::from_millis(5));
        assert_eq!(config.connection_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.initial_positions(), vec![0.0; 6]);
    }
}
