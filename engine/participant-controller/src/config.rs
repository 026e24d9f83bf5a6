//! Configuration for a ParticipantController

use crate::error::ConfigError;
use crate::metrics::saturating_nanos;
use crate::strategy::TimeStepStrategy;
use crate::{DEFAULT_PERFORMANCE_LOG_INTERVAL_STEPS, DEFAULT_PERIOD_NS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a single participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Participant name, unique within a simulation
    pub name: String,

    /// How simulation time is advanced
    pub time_step: TimeStepStrategy,

    /// When step-completion messages are sent
    pub sync_policy: SyncPolicy,

    /// Quantum length requested per cycle in nanoseconds (default: 1ms)
    pub period_ns: u64,

    /// Step performance monitoring
    pub performance: PerformanceConfig,
}

/// Delivery discipline for `TickDone` and `QuantumRequest`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPolicy {
    /// Send as soon as the step completes
    #[default]
    Loose,
    /// Send once every earlier outbound message has been delivered
    Strict,
}

/// Performance-related configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Warn when a single step exceeds this many milliseconds
    pub exec_time_limit_soft_ms: Option<u64>,

    /// Log step statistics every N steps (0 disables)
    pub log_interval_steps: u64,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            time_step: TimeStepStrategy::default(),
            sync_policy: SyncPolicy::default(),
            period_ns: DEFAULT_PERIOD_NS,
            performance: PerformanceConfig {
                exec_time_limit_soft_ms: None,
                log_interval_steps: DEFAULT_PERFORMANCE_LOG_INTERVAL_STEPS,
            },
        }
    }
}

impl ParticipantConfig {
    pub fn new(name: impl Into<String>, time_step: TimeStepStrategy) -> Self {
        Self { name: name.into(), time_step, ..Default::default() }
    }

    pub fn with_sync_policy(mut self, sync_policy: SyncPolicy) -> Self {
        self.sync_policy = sync_policy;
        self
    }

    /// Periods beyond `u64::MAX` nanoseconds are clamped
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period_ns = saturating_nanos(period);
        self
    }

    /// Get period as Duration
    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns)
    }

    /// Get soft execution time limit as Duration
    pub fn exec_time_limit_soft(&self) -> Option<Duration> {
        self.performance.exec_time_limit_soft_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("participant name must not be empty".to_string()));
        }
        if self.time_step.requests_steps() && self.period_ns == 0 {
            return Err(ConfigError::Invalid(format!(
                "participant {} requests quanta but has a zero period",
                self.name
            )));
        }
        Ok(())
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ParticipantConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
