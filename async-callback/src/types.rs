//! Core types for the async callback library
//!
//! This module defines the error type, the opaque user data handle passed back
//! to every handler, and the fault routine used for contract violations that
//! the running process cannot safely continue past.

use std::any::Any;
use std::sync::Arc;

/// Result type for callback operations
pub type Result<T> = std::result::Result<T, CallbackError>;

/// Opaque subscriber data handed back on every callback
///
/// Handlers recover their concrete type with `downcast_ref`.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Errors that can occur while configuring allocators or registering callbacks
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Allocator configuration has no pools")]
    NoPools,

    #[error("Pool {index} has a zero block size")]
    ZeroBlockSize { index: usize },

    #[error("Pool {index} has zero capacity")]
    ZeroCapacity { index: usize },

    #[error("Pool block sizes must be strictly ascending: {previous} then {current}")]
    PoolsNotAscending { previous: usize, current: usize },

    #[error("Callback interface '{interface}' registration table is full ({capacity} slots)")]
    TableFull {
        interface: &'static str,
        capacity: usize,
    },

    #[error("Callback argument of {size} bytes exceeds the {limit} byte encoding limit")]
    ArgumentTooLarge { size: usize, limit: usize },
}

/// Report a non-recoverable contract violation
///
/// Misuse such as freeing a foreign block or exhausting transport memory under
/// the abort policy means the process state can no longer be trusted.
#[track_caller]
pub(crate) fn fault(message: std::fmt::Arguments<'_>) -> ! {
    log::error!("{}", message);
    panic!("async-callback fault: {}", message);
}
