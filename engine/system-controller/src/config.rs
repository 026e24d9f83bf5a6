// Configuration structures for the coordinator

use crate::error::ControllerError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the coordinator side of a simulation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Participants whose states gate the system state
    pub required_participants: Vec<String>,

    /// Configuration for the tick barrier
    pub tick_master: TickMasterConfig,

    /// Configuration for quantum arbitration
    pub arbiter: ArbiterConfig,
}

/// Configuration for the TickMaster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickMasterConfig {
    /// Stop broadcasting after this many ticks
    pub tick_limit: Option<u64>,

    /// Simulation time covered by one tick
    pub period: Duration,
}

impl Default for TickMasterConfig {
    fn default() -> Self {
        Self {
            tick_limit: None,
            period: Duration::from_millis(1), // 1ms per tick
        }
    }
}

/// Configuration for the QuantumArbiter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Reject requests whose quantum would end beyond this point
    pub horizon: Option<Duration>,
}

impl CoordinatorConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ControllerError> {
        let content = std::fs::read_to_string(path)?;
        let config: CoordinatorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ControllerError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.tick_master.period.is_zero() {
            return Err(ControllerError::Config("tick period must be greater than zero".to_string()));
        }
        if self.tick_master.tick_limit == Some(0) {
            return Err(ControllerError::Config("tick limit must be greater than zero".to_string()));
        }
        Ok(())
    }
}
