//! Engine configuration registry.
//!
//! All tunables of the optimizer are collected in [`SchedulerConfig`],
//! loaded once at startup (optionally from a TOML file) and passed by
//! reference into every run. Defaults follow the documented values; every
//! field can be overridden per deployment or per request.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Weights of the objective terms. The weighted cost is
/// `makespan*wM + idle*wI + overtime*wO + sdst*wS + priority*wP +
/// unplaced*wU`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    #[serde(default = "default_weight_makespan")]
    pub makespan: f64,
    #[serde(default = "default_weight_idle")]
    pub idle: f64,
    #[serde(default = "default_weight_overtime")]
    pub overtime: f64,
    #[serde(default = "default_weight_sdst")]
    pub sdst: f64,
    #[serde(default = "default_weight_priority")]
    pub priority: f64,
    #[serde(default = "default_weight_unplaced")]
    pub unplaced: f64,
}

fn default_weight_makespan() -> f64 {
    1.0
}
fn default_weight_idle() -> f64 {
    0.5
}
fn default_weight_overtime() -> f64 {
    2.0
}
fn default_weight_sdst() -> f64 {
    1.0
}
fn default_weight_priority() -> f64 {
    0.1
}
fn default_weight_unplaced() -> f64 {
    1.0
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            makespan: default_weight_makespan(),
            idle: default_weight_idle(),
            overtime: default_weight_overtime(),
            sdst: default_weight_sdst(),
            priority: default_weight_priority(),
            unplaced: default_weight_unplaced(),
        }
    }
}

/// Tabu search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabuSettings {
    /// Bounded size of the tabu memory.
    #[serde(default = "default_tabu_size")]
    pub size: usize,
    #[serde(default = "default_tabu_max_iterations")]
    pub max_iterations: u32,
    /// Stop after this many iterations without improving the best cost.
    #[serde(default = "default_tabu_max_no_improvement")]
    pub max_no_improvement: u32,
    /// Iterations a fingerprint stays prohibited. Defaults to `size`.
    #[serde(default = "default_tabu_tenure")]
    pub tenure: u32,
}

fn default_tabu_size() -> usize {
    10
}
fn default_tabu_max_iterations() -> u32 {
    100
}
fn default_tabu_max_no_improvement() -> u32 {
    20
}
fn default_tabu_tenure() -> u32 {
    10
}

impl Default for TabuSettings {
    fn default() -> Self {
        Self {
            size: default_tabu_size(),
            max_iterations: default_tabu_max_iterations(),
            max_no_improvement: default_tabu_max_no_improvement(),
            tenure: default_tabu_tenure(),
        }
    }
}

/// Emergency insertion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergencySettings {
    /// Max wait per urgency, minutes.
    #[serde(default = "default_max_wait_immediate")]
    pub max_wait_immediate: i64,
    #[serde(default = "default_max_wait_urgent")]
    pub max_wait_urgent: i64,
    #[serde(default = "default_max_wait_semi_urgent")]
    pub max_wait_semi_urgent: i64,
    #[serde(default = "default_max_wait_scheduled")]
    pub max_wait_scheduled: i64,
    /// Disruption score weights; must sum to 1.
    #[serde(default = "default_disruption_bumped")]
    pub disruption_weight_bumped: f64,
    #[serde(default = "default_disruption_overtime")]
    pub disruption_weight_overtime: f64,
    #[serde(default = "default_disruption_wait")]
    pub disruption_weight_wait: f64,
}

fn default_max_wait_immediate() -> i64 {
    crate::models::Urgency::Immediate.default_max_wait_minutes()
}
fn default_max_wait_urgent() -> i64 {
    crate::models::Urgency::Urgent.default_max_wait_minutes()
}
fn default_max_wait_semi_urgent() -> i64 {
    crate::models::Urgency::SemiUrgent.default_max_wait_minutes()
}
fn default_max_wait_scheduled() -> i64 {
    crate::models::Urgency::Scheduled.default_max_wait_minutes()
}
fn default_disruption_bumped() -> f64 {
    0.4
}
fn default_disruption_overtime() -> f64 {
    0.3
}
fn default_disruption_wait() -> f64 {
    0.3
}

impl Default for EmergencySettings {
    fn default() -> Self {
        Self {
            max_wait_immediate: default_max_wait_immediate(),
            max_wait_urgent: default_max_wait_urgent(),
            max_wait_semi_urgent: default_max_wait_semi_urgent(),
            max_wait_scheduled: default_max_wait_scheduled(),
            disruption_weight_bumped: default_disruption_bumped(),
            disruption_weight_overtime: default_disruption_overtime(),
            disruption_weight_wait: default_disruption_wait(),
        }
    }
}

impl EmergencySettings {
    pub fn max_wait_minutes(&self, urgency: crate::models::Urgency) -> i64 {
        use crate::models::Urgency;
        match urgency {
            Urgency::Immediate => self.max_wait_immediate,
            Urgency::Urgent => self.max_wait_urgent,
            Urgency::SemiUrgent => self.max_wait_semi_urgent,
            Urgency::Scheduled => self.max_wait_scheduled,
        }
    }
}

/// Run budget limits, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Soft budget: the optimizer finishes its current iteration and stops
    /// cleanly.
    #[serde(default = "default_soft_secs")]
    pub soft_secs: u64,
    /// Hard cap: treated exactly like cancellation.
    #[serde(default = "default_hard_secs")]
    pub hard_secs: u64,
    /// Budget for emergency insertion.
    #[serde(default = "default_emergency_secs")]
    pub emergency_secs: u64,
}

fn default_soft_secs() -> u64 {
    30
}
fn default_hard_secs() -> u64 {
    120
}
fn default_emergency_secs() -> u64 {
    5
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            soft_secs: default_soft_secs(),
            hard_secs: default_hard_secs(),
            emergency_secs: default_emergency_secs(),
        }
    }
}

/// Complete configuration surface of the scheduling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub weights: CostWeights,
    #[serde(default)]
    pub tabu: TabuSettings,
    #[serde(default)]
    pub emergency: EmergencySettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub defaults: DefaultSettings,
    #[serde(default)]
    pub concurrency: ConcurrencySettings,
}

/// Fallback values and policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSettings {
    /// Minutes used when the setup matrix has no entry for a transition.
    #[serde(default)]
    pub missing_sdst_minutes: i64,
    /// Whether equipment contention covers the setup interval as well as the
    /// operative interval.
    #[serde(default = "default_true")]
    pub equipment_contention_includes_setup: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            missing_sdst_minutes: 0,
            equipment_contention_includes_setup: true,
        }
    }
}

/// Request admission settings for the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencySettings {
    /// Bounded admission queue; requests beyond this are rejected as busy.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How many times a persist is retried after a version conflict.
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,
}

fn default_queue_capacity() -> usize {
    4
}
fn default_persist_retries() -> u32 {
    1
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            persist_retries: default_persist_retries(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a TOML file. Missing sections and fields fall
    /// back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity checks beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tabu.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "tabu.max_iterations must be positive".to_string(),
            ));
        }
        if self.defaults.missing_sdst_minutes < 0 {
            return Err(ConfigError::Invalid(
                "defaults.missing_sdst_minutes must not be negative".to_string(),
            ));
        }
        let disruption_sum = self.emergency.disruption_weight_bumped
            + self.emergency.disruption_weight_overtime
            + self.emergency.disruption_weight_wait;
        if (disruption_sum - 1.0).abs() > 1e-9 {
            return Err(ConfigError::Invalid(format!(
                "emergency disruption weights must sum to 1, got {disruption_sum}"
            )));
        }
        Ok(())
    }
}
