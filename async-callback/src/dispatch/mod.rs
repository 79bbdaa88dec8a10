//! Callback registry and dispatch core
//!
//! A [`Multicast`] owns the fixed registration table of one callback interface.
//! Invoking it fans out to every registered handler: synchronous registrations
//! run on the caller's thread, asynchronous ones receive an [`Envelope`] with
//! their own copy of the argument bytes, handed to the registration's
//! destination context through the [`Dispatch`] capability.
//!
//! ```text
//! publisher ──invoke(bytes)──→ Multicast
//!                                ├─ slot 0: sync  ──→ handler(bytes, user_data)
//!                                ├─ slot 1: async ──→ Envelope{copy} ──→ Dispatch::dispatch
//!                                └─ slot 2: empty                              │
//!                                                                              ▼
//!                          destination context ──→ target_invoke(envelope) ──→ handler(copy, user_data)
//!                                                                              └─→ copy + envelope freed
//! ```

mod envelope;
mod handler;
mod multicast;

pub use envelope::Envelope;
pub use handler::{Handler, HandlerId, RawHandlerFn};
pub use multicast::{Multicast, RegistrationInfo};

use std::sync::Arc;

/// A destination execution context
///
/// Implementations accept an owned envelope without blocking indefinitely and
/// guarantee that [`target_invoke`] is eventually called with it exactly once,
/// on the destination's own context. The dispatch core does not care whether
/// that context is a worker thread, a pool or an async task.
pub trait Dispatch: Send + Sync {
    /// Take ownership of `envelope` for later invocation
    ///
    /// Returns `false` if the destination refused it. A refused envelope is
    /// dropped, which returns its transport memory.
    fn dispatch(&self, envelope: Envelope) -> bool;

    /// Name used in log output
    fn name(&self) -> &str {
        "destination"
    }
}

/// Shared handle to a destination context
///
/// Registrations compare dispatchers by identity: clones of the same handle
/// match, two separately created handles do not.
pub type Dispatcher = Arc<dyn Dispatch>;

/// Re-entry point for destination contexts
///
/// Calls the envelope's handler with its payload copy and user data, then
/// releases the payload and the envelope. Must run on the destination context.
pub fn target_invoke(envelope: Envelope) {
    log::trace!("Invoking {} on destination context", envelope.handler_id());
    envelope.deliver();
}

pub(crate) fn same_dispatcher(a: Option<&Dispatcher>, b: Option<&Dispatcher>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        _ => false,
    }
}
