//! Expiration auto-initializer
//!
//! Derives lease TTLs for callers that do not fix one. The base is drawn
//! uniformly from `[auto_init_base, wheel_size × tick_duration]`, which
//! spreads renewal load across a full wheel period instead of spiking
//! when many locks are taken at once. The TTL is then scaled so the
//! "renew once remaining time drops below ttl / factor" rule leaves
//! exactly `base` before the first renewal is due.

use rand::Rng;

use cassava_common::error::CassavaError;

use crate::config::RenewalConfig;

/// Draws randomized lease durations
#[derive(Debug, Clone)]
pub struct ExpiryInitializer {
    base_ms: u64,
    upper_ms: u64,
    factor: u32,
}

impl ExpiryInitializer {
    pub fn from_config(config: &RenewalConfig) -> Result<Self, CassavaError> {
        config.validate()?;
        Ok(Self {
            base_ms: config.auto_init_base_ms,
            upper_ms: config.wheel_period_ms(),
            factor: config.renew_factor,
        })
    }

    /// Draw an auto-initialized TTL in milliseconds.
    ///
    /// `ttl = base × factor / (factor − 1)` with base uniform over
    /// `[auto_init_base, wheel period]`.
    pub fn draw_ttl_ms(&self) -> u64 {
        let base = rand::rng().random_range(self.base_ms..=self.upper_ms);
        base * self.factor as u64 / (self.factor as u64 - 1)
    }

    /// Delay from lease issue until its renewal is due: the lease is
    /// renewed once remaining time drops below `ttl / factor`.
    pub fn renew_delay_ms(&self, ttl_ms: u64) -> u64 {
        renew_delay_ms(ttl_ms, self.factor)
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }
}

/// Delay from issue until renewal for a lease of `ttl_ms` under the
/// given renew-threshold divisor
pub fn renew_delay_ms(ttl_ms: u64, factor: u32) -> u64 {
    ttl_ms - ttl_ms / factor as u64
}
