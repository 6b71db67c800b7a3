//! Error types and outcome classification for Cassava
//!
//! This module defines:
//! - `CassavaError`: Application-specific error enum
//! - `AppError`: Wrapper for integration with calling frameworks
//! - `OutcomeKind`: Three-way classification for operations whose effect
//!   cannot always be confirmed client-side

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum CassavaError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("lease renewal is disabled")]
    RenewalDisabled,

    #[error("lease renewal scheduler is not running")]
    RenewalStopped,

    #[error("lock '{0}' is held by another owner")]
    LockHeld(String),

    #[error("not the owner of lock '{0}'")]
    NotLockOwner(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Wrapper for application errors
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl AppError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

/// Three-way outcome classification.
///
/// Replaces binary success/failure wherever a network round-trip's effect
/// cannot be confirmed client-side. `Failed` only ever means a confirmed
/// negative outcome; anything unconfirmed is `Unknown`, since
/// misclassifying an actually-successful operation as failed is a
/// correctness hazard while `Unknown` only defers resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Completed and confirmed
    Success,
    /// Confirmed negative outcome
    Failed,
    /// Outcome unconfirmed (timeout, connection loss, not attempted)
    Unknown,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Unknown => "unknown",
        }
    }
}

impl Display for OutcomeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OutcomeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(OutcomeKind::Success),
            "failed" => Ok(OutcomeKind::Failed),
            "unknown" => Ok(OutcomeKind::Unknown),
            _ => Err(format!("Invalid outcome kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cassava_error_display() {
        let err = CassavaError::IllegalArgument("invalid param".to_string());
        assert_eq!(format!("{}", err), "caused: invalid param");

        let err = CassavaError::LockHeld("orders".to_string());
        assert_eq!(format!("{}", err), "lock 'orders' is held by another owner");

        let err = CassavaError::RenewalDisabled;
        assert_eq!(format!("{}", err), "lease renewal is disabled");
    }

    #[test]
    fn test_outcome_kind_round_trip() {
        for kind in [
            OutcomeKind::Success,
            OutcomeKind::Failed,
            OutcomeKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<OutcomeKind>().unwrap(), kind);
        }
        assert!("maybe".parse::<OutcomeKind>().is_err());
    }

    #[test]
    fn test_app_error_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("test error");
        let app_err = AppError::from(anyhow_err);
        assert_eq!(format!("{}", app_err), "test error");
    }
}
