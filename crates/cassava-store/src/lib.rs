//! Cassava Store - Store operations abstraction
//!
//! This crate provides:
//! - `StoreOps`: the narrow async interface the coordination core consumes
//! - Typed script request/result model for the store's atomic scripting
//!   facility
//! - `MemoryStore`: a complete in-memory implementation with millisecond
//!   TTL expiry, usable as a test double and single-process fallback
//! - `FaultyStore`: a fault-injection wrapper for exercising ambiguous
//!   outcome classification

pub mod faulty;
pub mod memory;
pub mod ops;
pub mod script;

// Re-export commonly used types
pub use faulty::{FaultMode, FaultyStore};
pub use memory::MemoryStore;
pub use ops::{StoreError, StoreOps};
pub use script::{ScriptArg, ScriptArgType, ScriptKind, ScriptRequest, ScriptResultType, ScriptValue};
