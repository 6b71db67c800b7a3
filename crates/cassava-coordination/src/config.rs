//! Coordination configuration
//!
//! Invalid values are rejected at validation time, never deferred to the
//! first tick or the first lock call.

use serde::{Deserialize, Serialize};

use cassava_common::error::CassavaError;

/// Configuration for the renewal timing wheel and lease derivation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalConfig {
    /// Global enable flag. Disabling makes scheduling calls fail
    /// immediately rather than silently degrade.
    pub enabled: bool,
    /// Duration of one wheel tick in milliseconds
    pub tick_duration_ms: u64,
    /// Number of buckets in the wheel
    pub wheel_size: usize,
    /// Lower bound of the auto-initialized lease base in milliseconds
    pub auto_init_base_ms: u64,
    /// Renew-threshold divisor: renew once remaining time drops below
    /// `ttl / renew_factor`
    pub renew_factor: u32,
    /// Emit step-by-step trace lines from atomic scripts
    pub verbose_scripts: bool,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_duration_ms: 100,
            wheel_size: 600,
            auto_init_base_ms: 10_000,
            renew_factor: cassava_common::DEFAULT_RENEW_FACTOR,
            verbose_scripts: false,
        }
    }
}

impl RenewalConfig {
    /// One full wheel revolution in milliseconds
    pub fn wheel_period_ms(&self) -> u64 {
        self.tick_duration_ms * self.wheel_size as u64
    }

    pub fn validate(&self) -> Result<(), CassavaError> {
        if self.tick_duration_ms == 0 {
            return Err(CassavaError::ConfigError(
                "tick_duration_ms must be positive".to_string(),
            ));
        }
        if self.wheel_size == 0 {
            return Err(CassavaError::ConfigError(
                "wheel_size must be positive".to_string(),
            ));
        }
        if self.renew_factor < 2 {
            return Err(CassavaError::ConfigError(
                "renew_factor must be at least 2".to_string(),
            ));
        }
        if self.auto_init_base_ms == 0 {
            return Err(CassavaError::ConfigError(
                "auto_init_base_ms must be positive".to_string(),
            ));
        }
        if self.auto_init_base_ms > self.wheel_period_ms() {
            return Err(CassavaError::ConfigError(format!(
                "auto_init_base_ms ({}) exceeds the wheel period ({})",
                self.auto_init_base_ms,
                self.wheel_period_ms()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RenewalConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let mut config = RenewalConfig::default();
        config.tick_duration_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RenewalConfig::default();
        config.wheel_size = 0;
        assert!(config.validate().is_err());

        let mut config = RenewalConfig::default();
        config.renew_factor = 1;
        assert!(config.validate().is_err());

        let mut config = RenewalConfig::default();
        config.auto_init_base_ms = config.wheel_period_ms() + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wheel_period() {
        let config = RenewalConfig {
            tick_duration_ms: 100,
            wheel_size: 8,
            auto_init_base_ms: 500,
            ..Default::default()
        };
        assert_eq!(config.wheel_period_ms(), 800);
        assert!(config.validate().is_ok());
    }
}
