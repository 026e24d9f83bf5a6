//! Unit tests for configuration, errors and performance collection

use std::time::Duration;

use orchestration_types::ParticipantState;

use crate::config::PerformanceConfig;
use crate::metrics::{IntervalMonitor, StepPerformance};
use crate::{
    ConfigError, ParticipantConfig, ParticipantError, SyncPolicy, TimeStepStrategy,
    DEFAULT_PERIOD_NS,
};

fn create_test_config() -> ParticipantConfig {
    ParticipantConfig {
        name: "Sensor".to_string(),
        time_step: TimeStepStrategy::QuantumDriven,
        sync_policy: SyncPolicy::Strict,
        period_ns: 5_000_000,
        performance: PerformanceConfig { exec_time_limit_soft_ms: Some(20), log_interval_steps: 100 },
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_participant_config_default() {
        let config = ParticipantConfig::default();
        assert_eq!(config.period_ns, DEFAULT_PERIOD_NS);
        assert_eq!(config.time_step, TimeStepStrategy::TickDriven);
        assert_eq!(config.sync_policy, SyncPolicy::Loose);
        assert!(config.performance.exec_time_limit_soft_ms.is_none());
    }

    #[test]
    fn test_participant_config_duration_conversion() {
        let config = create_test_config();
        assert_eq!(config.period(), Duration::from_millis(5));
        assert_eq!(config.exec_time_limit_soft(), Some(Duration::from_millis(20)));

        let config = ParticipantConfig::default().with_period(Duration::from_micros(250));
        assert_eq!(config.period_ns, 250_000);
    }

    #[test]
    fn test_oversized_period_is_clamped() {
        let config = ParticipantConfig::default().with_period(Duration::MAX);
        assert_eq!(config.period_ns, u64::MAX);
        assert_eq!(config.period(), Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_builder_helpers() {
        let config = ParticipantConfig::new("Ecu", TimeStepStrategy::QuantumPassive)
            .with_sync_policy(SyncPolicy::Strict);
        assert_eq!(config.name, "Ecu");
        assert_eq!(config.time_step, TimeStepStrategy::QuantumPassive);
        assert_eq!(config.sync_policy, SyncPolicy::Strict);
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let config = ParticipantConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_quantum() {
        let config = ParticipantConfig { period_ns: 0, ..create_test_config() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        // Tick-driven participants take their step length from the tick
        let config = ParticipantConfig {
            period_ns: 0,
            time_step: TimeStepStrategy::TickDriven,
            ..create_test_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("participant.toml");

        let config = create_test_config();
        config.to_file(&path).unwrap();
        let loaded = ParticipantConfig::from_file(&path).unwrap();

        assert_eq!(loaded.name, config.name);
        assert_eq!(loaded.time_step, config.time_step);
        assert_eq!(loaded.sync_policy, config.sync_policy);
        assert_eq!(loaded.period_ns, config.period_ns);
        assert_eq!(loaded.performance.exec_time_limit_soft_ms, Some(20));
    }

    #[test]
    fn test_config_from_toml_text() {
        let text = r#"
            name = "Controller"
            time_step = "TickDriven"
            sync_policy = "Loose"
            period_ns = 1000000

            [performance]
            log_interval_steps = 0
        "#;
        let config: ParticipantConfig = toml::from_str(text).unwrap();
        assert_eq!(config.name, "Controller");
        assert_eq!(config.performance.exec_time_limit_soft_ms, None);
    }

    #[test]
    fn test_config_from_missing_file() {
        let result = ParticipantConfig::from_file("/nonexistent/participant.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_participant_error_display() {
        let error = ParticipantError::MissingSimulationStep { participant: "A".to_string() };
        assert_eq!(error.to_string(), "Cannot start participant A: no simulation step was set");

        let error = ParticipantError::InvalidPause { state: ParticipantState::ReadyToRun };
        assert_eq!(error.to_string(), "pause() was called in state ParticipantState::ReadyToRun");

        let error = ParticipantError::InvalidContinue { state: ParticipantState::Running };
        assert_eq!(
            error.to_string(),
            "continue_simulation() was called in state ParticipantState::Running"
        );
    }

    #[test]
    fn test_config_error_conversion() {
        let error: ParticipantError = ConfigError::Invalid("bad".to_string()).into();
        assert_eq!(error.to_string(), "Configuration error: Invalid configuration: bad");
    }
}

#[cfg(test)]
mod strategy_tests {
    use super::*;

    #[test]
    fn test_strategy_capabilities() {
        let tick = TimeStepStrategy::TickDriven;
        assert!(tick.accepts_ticks());
        assert!(!tick.accepts_grants());
        assert!(!tick.requests_steps());

        let quantum = TimeStepStrategy::QuantumDriven;
        assert!(!quantum.accepts_ticks());
        assert!(quantum.accepts_grants());
        assert!(quantum.requests_steps());

        let passive = TimeStepStrategy::QuantumPassive;
        assert!(passive.accepts_ticks());
        assert!(!passive.accepts_grants());
        assert!(!passive.requests_steps());
    }
}

#[cfg(test)]
mod metrics_tests {
    use super::*;

    #[test]
    fn test_interval_monitor_statistics() {
        let mut monitor = IntervalMonitor::default();
        assert_eq!(monitor.average(), Duration::ZERO);
        assert_eq!(monitor.min(), Duration::ZERO);

        monitor.record(Duration::from_millis(2));
        monitor.record(Duration::from_millis(4));
        monitor.record(Duration::from_millis(6));

        assert_eq!(monitor.sample_count(), 3);
        assert_eq!(monitor.min(), Duration::from_millis(2));
        assert_eq!(monitor.max(), Duration::from_millis(6));
        assert_eq!(monitor.average(), Duration::from_millis(4));
    }

    #[test]
    fn test_interval_monitor_stop_without_start() {
        let mut monitor = IntervalMonitor::default();
        assert!(monitor.stop_measurement().is_none());
        assert_eq!(monitor.sample_count(), 0);

        monitor.start_measurement();
        assert!(monitor.stop_measurement().is_some());
    }

    #[test]
    fn test_step_performance_counts_steps() {
        let mut performance = StepPerformance::new(Some(Duration::from_secs(3600)));
        performance.begin_wait();
        for _ in 0..5 {
            performance.begin_step();
            let (_, exceeded) = performance.end_step();
            assert!(!exceeded);
        }

        let stats = performance.stats();
        assert_eq!(stats.total_steps, 5);
        assert_eq!(stats.soft_limit_violations, 0);
        assert!(stats.exec_min_ns <= stats.exec_max_ns);
        assert!(stats.exec_p99_ns <= stats.exec_max_ns);
    }

    #[test]
    fn test_step_performance_soft_limit() {
        let mut performance = StepPerformance::new(Some(Duration::from_nanos(1)));
        performance.begin_step();
        std::thread::sleep(Duration::from_millis(1));
        let (elapsed, exceeded) = performance.end_step();

        assert!(elapsed >= Duration::from_millis(1));
        assert!(exceeded);
        assert_eq!(performance.stats().soft_limit_violations, 1);
    }
}
