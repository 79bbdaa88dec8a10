//! Type-erased callback handlers

use crate::types::UserData;
use std::fmt;
use std::sync::Arc;

/// Untyped handler signature: argument bytes plus optional user data
pub type RawHandlerFn = fn(&[u8], Option<&UserData>);

/// Identity of a handler function
///
/// Two registrations match only if their handler ids and dispatchers match, so
/// the id is the address of the subscriber's function, independent of the
/// typed adapter wrapped around it.
///
/// Function addresses are not guaranteed unique or stable. The compiler may
/// merge functions with identical bodies into one address, and the same
/// function may get distinct addresses in different codegen units. Give
/// handlers that must be told apart distinct bodies, and register and
/// unregister through the same path so both see the same address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

impl HandlerId {
    /// Id of an untyped handler function
    pub fn of(handler: RawHandlerFn) -> Self {
        Self(handler as usize)
    }

    pub(crate) fn from_addr(addr: usize) -> Self {
        Self(addr)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler@{:#x}", self.0)
    }
}

type ErasedFn = dyn Fn(&[u8], Option<&UserData>) + Send + Sync;

/// A callable handler with a stable identity
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    call: Arc<ErasedFn>,
}

impl Handler {
    /// Wrap an untyped handler function
    pub fn raw(handler: RawHandlerFn) -> Self {
        Self {
            id: HandlerId::of(handler),
            call: Arc::new(handler),
        }
    }

    /// Build a handler from an identity and an adapter that decodes the bytes
    pub(crate) fn from_parts<F>(id: HandlerId, call: F) -> Self
    where
        F: Fn(&[u8], Option<&UserData>) + Send + Sync + 'static,
    {
        Self {
            id,
            call: Arc::new(call),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Run the handler on the current thread
    pub fn call(&self, data: &[u8], user_data: Option<&UserData>) {
        (self.call)(data, user_data)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SUM: AtomicUsize = AtomicUsize::new(0);

    fn add_bytes(data: &[u8], _user_data: Option<&UserData>) {
        let total: usize = data.iter().map(|&b| b as usize).sum();
        SUM.fetch_add(total, Ordering::SeqCst);
    }

    fn other(_data: &[u8], _user_data: Option<&UserData>) {
        SUM.fetch_add(1000, Ordering::SeqCst);
    }

    #[test]
    fn test_raw_handler_identity() {
        let a = Handler::raw(add_bytes);
        let b = Handler::raw(add_bytes);
        let c = Handler::raw(other);

        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.id(), HandlerId::of(add_bytes));
    }

    #[test]
    fn test_raw_handler_call() {
        let handler = Handler::raw(add_bytes);
        handler.call(&[1, 2, 3], None);
        assert_eq!(SUM.load(Ordering::SeqCst), 6);
    }
}
