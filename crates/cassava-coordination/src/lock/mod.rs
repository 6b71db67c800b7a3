//! Lock coordinators
//!
//! - Single-member value locks with renewal and owner-checked release
//! - Multi-member hash locks with three-way outcome classification and
//!   guaranteed cleanup
//! - Event listener registry

pub mod event;
pub mod model;
pub mod multi;
pub mod value;

pub use event::{LockCompletedEvent, LockEventListener, LockEventRegistry, RemoveFailedEvent};
pub use model::{
    LockOutcomes, LockReleaseResult, MemberOutcome, MultiLockRequest, MultiLockResult,
    RemoveFailure, ValueLockRequest, ValueLockResult, multi_lock_key, value_lock_key,
};
pub use multi::MultiLockService;
pub use value::ValueLockService;
