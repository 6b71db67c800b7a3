//! Lease renewal scheduling
//!
//! - Task model with cooperative lazy cancellation
//! - Timing wheel driving recurring renewals through the CAS engine

pub mod task;
pub mod wheel;

pub use task::{LeaseKey, RenewHandle, RenewOp, RenewTask};
pub use wheel::RenewalScheduler;
