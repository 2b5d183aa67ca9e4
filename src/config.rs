use crate::constants::{
    DEFAULT_HOST, DEFAULT_REGISTER_PAUSE_MS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RUN_TIME_SECS,
    DEFAULT_SPAWN_RATE, DEFAULT_USERS, MAX_REQUEST_TIMEOUT_SECS, MAX_RUN_TIME_SECS,
    MAX_WAIT_SECS, MIN_SPAWN_RATE,
};
use crate::error::LoadError;
use crate::scenario::{Scenario, ScenarioKind, WaitTime};
use std::time::Duration;

/// Configuration for one load test run
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    /// Base URL of the API under test
    pub host: String,
    pub scenario: ScenarioKind,
    pub users: usize,
    /// Users started per second, 0 starts everyone at once
    pub spawn_rate: f64,
    pub run_time: Duration,
    pub request_timeout: Duration,
    pub register_pause: Duration,
    /// Replaces the scenario's own think time
    pub wait_time: Option<WaitTime>,
    /// Stop each user after this many tasks
    pub max_iterations: Option<u64>,
    /// Seed for reproducible task selection; emails stay random
    pub seed: Option<u64>,
    pub probe_root: bool,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            scenario: ScenarioKind::Profile,
            users: DEFAULT_USERS,
            spawn_rate: DEFAULT_SPAWN_RATE,
            run_time: Duration::from_secs(DEFAULT_RUN_TIME_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            register_pause: Duration::from_millis(DEFAULT_REGISTER_PAUSE_MS),
            wait_time: None,
            max_iterations: None,
            seed: None,
            probe_root: false,
        }
    }
}

impl LoadTestConfig {
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.users == 0 {
            return Err(LoadError::invalid_config("users must be greater than zero"));
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate < 0.0 {
            return Err(LoadError::invalid_config(format!(
                "spawn rate must be a non-negative number, got {}",
                self.spawn_rate
            )));
        }
        if self.spawn_rate > 0.0 && self.spawn_rate < MIN_SPAWN_RATE {
            return Err(LoadError::invalid_config(format!(
                "spawn rate must be 0 or at least {}, got {}",
                MIN_SPAWN_RATE, self.spawn_rate
            )));
        }
        if self.run_time.is_zero() {
            return Err(LoadError::invalid_config("run time must be greater than zero"));
        }
        if self.run_time > Duration::from_secs(MAX_RUN_TIME_SECS) {
            return Err(LoadError::invalid_config(format!(
                "run time must not exceed {}s",
                MAX_RUN_TIME_SECS
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(LoadError::invalid_config(
                "request timeout must be greater than zero",
            ));
        }
        if self.request_timeout > Duration::from_secs(MAX_REQUEST_TIMEOUT_SECS) {
            return Err(LoadError::invalid_config(format!(
                "request timeout must not exceed {}s",
                MAX_REQUEST_TIMEOUT_SECS
            )));
        }
        let max_wait = Duration::from_secs(MAX_WAIT_SECS);
        if self.register_pause > max_wait {
            return Err(LoadError::invalid_config(format!(
                "registration pause must not exceed {}s",
                MAX_WAIT_SECS
            )));
        }
        if self.wait_time.is_some_and(|w| w.max > max_wait) {
            return Err(LoadError::invalid_config(format!(
                "think time must not exceed {}s",
                MAX_WAIT_SECS
            )));
        }
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(LoadError::invalid_config(format!(
                "host must be an http(s) URL, got '{}'",
                self.host
            )));
        }
        Ok(())
    }

    /// Scenario definition with this run's overrides applied
    pub fn build_scenario(&self) -> Result<Scenario, LoadError> {
        let mut scenario = Scenario::new(self.scenario)?
            .with_register_pause(self.register_pause)
            .with_root_probe(self.probe_root);
        if let Some(wait) = self.wait_time {
            scenario = scenario.with_wait_time(wait);
        }
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LoadTestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.register_pause, Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_zero_users() {
        let config = LoadTestConfig {
            users: 0,
            ..LoadTestConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn test_rejects_bad_host_and_rate() {
        let config = LoadTestConfig {
            host: "localhost:8089".to_string(),
            ..LoadTestConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LoadTestConfig {
            spawn_rate: f64::NAN,
            ..LoadTestConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_values_the_runner_cannot_schedule() {
        let too_slow = LoadTestConfig {
            spawn_rate: 1e-30,
            ..LoadTestConfig::default()
        };
        assert!(matches!(
            too_slow.validate(),
            Err(LoadError::InvalidConfig { .. })
        ));

        let all_at_once = LoadTestConfig {
            spawn_rate: 0.0,
            ..LoadTestConfig::default()
        };
        assert!(all_at_once.validate().is_ok());

        let endless = LoadTestConfig {
            run_time: Duration::from_secs(u64::MAX),
            ..LoadTestConfig::default()
        };
        assert!(endless.validate().is_err());

        let huge_timeout = LoadTestConfig {
            request_timeout: Duration::MAX,
            ..LoadTestConfig::default()
        };
        assert!(huge_timeout.validate().is_err());

        let huge_wait = LoadTestConfig {
            wait_time: Some(WaitTime::between_millis(1, u64::MAX)),
            ..LoadTestConfig::default()
        };
        assert!(huge_wait.validate().is_err());

        let huge_pause = LoadTestConfig {
            register_pause: Duration::from_secs(MAX_WAIT_SECS + 1),
            ..LoadTestConfig::default()
        };
        assert!(huge_pause.validate().is_err());

        let longest = LoadTestConfig {
            run_time: Duration::from_secs(MAX_RUN_TIME_SECS),
            request_timeout: Duration::from_secs(MAX_REQUEST_TIMEOUT_SECS),
            spawn_rate: MIN_SPAWN_RATE,
            ..LoadTestConfig::default()
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_build_scenario_applies_overrides() {
        let config = LoadTestConfig {
            scenario: ScenarioKind::Auth,
            wait_time: Some(WaitTime::none()),
            register_pause: Duration::ZERO,
            probe_root: true,
            ..LoadTestConfig::default()
        };
        let scenario = config.build_scenario().unwrap();
        assert_eq!(scenario.kind, ScenarioKind::Auth);
        assert_eq!(scenario.wait_time, WaitTime::none());
        assert!(scenario.register.pause.is_zero());
        assert!(scenario.register.probe_root);
    }
}
