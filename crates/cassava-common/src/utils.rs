//! Utility functions for Cassava
//!
//! Common helper functions used across the codebase.

/// Current wall-clock time in milliseconds since the Unix epoch
///
/// # Examples
///
/// ```
/// use cassava_common::now_millis;
///
/// let now = now_millis();
/// assert!(now > 0);
/// ```
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
