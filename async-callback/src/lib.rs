//! Async Callback Library
//!
//! Multicast callbacks with asynchronous delivery across execution contexts,
//! backed by a fixed-block allocator so that every in-flight call draws from a
//! bounded, preallocated memory budget.
//!
//! # Architecture
//!
//! - A callback interface owns a fixed table of registrations
//! - Invoking it calls synchronous handlers directly on the caller's thread
//! - Asynchronous handlers get a private copy of the argument, packaged in an
//!   [`Envelope`] and handed to their destination context through [`Dispatch`]
//! - The destination calls [`target_invoke`], which runs the handler and
//!   returns the copy to the [`TransportAllocator`]
//!
//! The library does NOT:
//! - Provide the destination contexts themselves (thread loops, queues)
//! - Order or prioritize deliveries across destinations
//! - Time out or cancel envelopes already handed off
//!
//! # Example Usage
//!
//! ```
//! use async_callback::{callback_interface, TransportAllocator, TransportConfig, UserData};
//! use std::sync::Arc;
//!
//! callback_interface! {
//!     /// Published whenever the console receives a line of text
//!     pub ConsoleCb: [u8], 4
//! }
//!
//! fn print_line(line: async_callback::Elements<'_, u8>, _user_data: Option<&UserData>) {
//!     println!("{}", line.as_str().unwrap_or("<binary>"));
//! }
//!
//! // Transport memory for asynchronous deliveries
//! let transport = Arc::new(TransportAllocator::new(&TransportConfig::default()).unwrap());
//!
//! // Define the interface and subscribe synchronously
//! let console = ConsoleCb::new(&transport);
//! console.register(print_line, None, None).unwrap();
//!
//! // Publish
//! assert!(console.invoke(b"Hello World!").unwrap());
//! ```

// Public modules
pub mod allocator;
pub mod config;
pub mod dispatch;
pub mod interface;
pub mod types;

// Re-export main types for convenience
pub use allocator::{Block, BlockAllocator, PoolStats, TransportAllocator, ENVELOPE_RECORD_SIZE};
pub use config::{AllocatorConfig, ExhaustionPolicy, PoolConfig, TransportConfig};
pub use dispatch::{
    target_invoke, Dispatch, Dispatcher, Envelope, Handler, HandlerId, Multicast,
    RawHandlerFn, RegistrationInfo,
};
pub use interface::{
    ArrayCallback, ArrayHandlerFn, Callback, CallbackArg, Elements, TypedHandlerFn, MAX_ARG_SIZE,
};
pub use types::{CallbackError, Result, UserData};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: default transport starts with every block free
        let transport = TransportAllocator::with_defaults().unwrap();
        assert_eq!(transport.outstanding_blocks(), 0);
        assert_eq!(transport.stats().len(), 2);
        assert!(!VERSION.is_empty());
    }
}
