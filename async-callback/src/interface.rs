//! Typed callback interfaces
//!
//! Thin adapters over [`Multicast`] that give each interface a fixed argument
//! type. Arguments are encoded to bytes at the invoke boundary and decoded
//! again just before the handler runs, so the dispatch core never sees a typed
//! value and a handler can only be registered on an interface whose argument
//! type it accepts.
//!
//! # Example
//!
//! ```
//! use async_callback::{callback_interface, TransportAllocator, UserData};
//! use std::sync::Arc;
//!
//! callback_interface! {
//!     /// Raised whenever a new temperature sample is read
//!     pub TemperatureCb: i32, 2
//! }
//!
//! fn on_temperature(value: &i32, _user_data: Option<&UserData>) {
//!     println!("temperature: {}", value);
//! }
//!
//! let transport = Arc::new(TransportAllocator::with_defaults().unwrap());
//! let cb = TemperatureCb::new(&transport);
//! cb.register(on_temperature, None, None).unwrap();
//! assert!(cb.invoke(&21));
//! ```

use crate::allocator::TransportAllocator;
use crate::dispatch::{Dispatcher, Handler, HandlerId, Multicast, RegistrationInfo};
use crate::types::{fault, CallbackError, Result, UserData};
use byteorder::{ByteOrder, NativeEndian};
use std::marker::PhantomData;
use std::sync::Arc;

/// Largest encoded argument a typed interface accepts in one invoke (bytes)
pub const MAX_ARG_SIZE: usize = 512;

/// A value that can travel through a callback as a fixed number of bytes
pub trait CallbackArg: Sized {
    /// Encoded size of one value
    const SIZE: usize;

    /// Write the value into `buf`, which is exactly `SIZE` bytes long
    fn encode(&self, buf: &mut [u8]);

    /// Read a value back from `buf`, which is exactly `SIZE` bytes long
    fn decode(buf: &[u8]) -> Self;
}

impl CallbackArg for () {
    const SIZE: usize = 0;

    fn encode(&self, _buf: &mut [u8]) {}

    fn decode(_buf: &[u8]) -> Self {}
}

impl CallbackArg for u8 {
    const SIZE: usize = 1;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = *self;
    }

    fn decode(buf: &[u8]) -> Self {
        buf[0]
    }
}

impl CallbackArg for i8 {
    const SIZE: usize = 1;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = *self as u8;
    }

    fn decode(buf: &[u8]) -> Self {
        buf[0] as i8
    }
}

impl CallbackArg for bool {
    const SIZE: usize = 1;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = u8::from(*self);
    }

    fn decode(buf: &[u8]) -> Self {
        buf[0] != 0
    }
}

macro_rules! impl_native_arg {
    ($($ty:ty => $read:ident, $write:ident;)*) => {
        $(
            impl CallbackArg for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn encode(&self, buf: &mut [u8]) {
                    NativeEndian::$write(buf, *self);
                }

                fn decode(buf: &[u8]) -> Self {
                    NativeEndian::$read(buf)
                }
            }
        )*
    };
}

impl_native_arg! {
    u16 => read_u16, write_u16;
    i16 => read_i16, write_i16;
    u32 => read_u32, write_u32;
    i32 => read_i32, write_i32;
    u64 => read_u64, write_u64;
    i64 => read_i64, write_i64;
    f32 => read_f32, write_f32;
    f64 => read_f64, write_f64;
}

/// Largest encoded argument `transport` can carry to a destination context
fn arg_limit(transport: &TransportAllocator) -> usize {
    MAX_ARG_SIZE.min(transport.max_block_size())
}

/// Handler signature of a single-value interface
pub type TypedHandlerFn<A> = fn(&A, Option<&UserData>);

/// Handler signature of an element-array interface
pub type ArrayHandlerFn<E> = fn(Elements<'_, E>, Option<&UserData>);

/// Borrowed view over an encoded element array
pub struct Elements<'a, E> {
    bytes: &'a [u8],
    _element: PhantomData<fn() -> E>,
}

impl<E> Clone for Elements<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Elements<'_, E> {}

impl<'a, E: CallbackArg + 'a> Elements<'a, E> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            _element: PhantomData,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.bytes.len() / E::SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode the element at `index`
    pub fn get(&self, index: usize) -> Option<E> {
        let start = index.checked_mul(E::SIZE)?;
        let end = start.checked_add(E::SIZE)?;
        self.bytes.get(start..end).map(E::decode)
    }

    /// Decode every element in order
    pub fn iter(&self) -> impl Iterator<Item = E> + 'a {
        self.bytes.chunks_exact(E::SIZE).map(E::decode)
    }

    /// The encoded bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The encoded bytes as UTF-8 text, if valid
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.bytes).ok()
    }
}

/// Single-value callback interface with room for `N` registrations
pub struct Callback<A, const N: usize> {
    core: Multicast,
    _arg: PhantomData<fn(&A)>,
}

impl<A: CallbackArg + 'static, const N: usize> Callback<A, N> {
    /// Define the interface
    ///
    /// This is the interface's one-time initialization; registrations are
    /// accepted from here until [`terminate`](Self::terminate) or drop.
    ///
    /// An argument larger than [`MAX_ARG_SIZE`] or than the largest transport
    /// block is a definition error and faults.
    pub fn new(name: &'static str, transport: &Arc<TransportAllocator>) -> Self {
        let limit = arg_limit(transport);
        if A::SIZE > limit {
            fault(format_args!(
                "callback interface '{}' argument of {} bytes exceeds {} bytes",
                name,
                A::SIZE,
                limit
            ));
        }

        Self {
            core: Multicast::new(name, N, Arc::clone(transport)),
            _arg: PhantomData,
        }
    }

    fn handler(handler: TypedHandlerFn<A>) -> Handler {
        Handler::from_parts(HandlerId::from_addr(handler as usize), move |bytes, user_data| {
            handler(&A::decode(bytes), user_data)
        })
    }

    /// Register `handler`, synchronously if `dispatcher` is `None`
    pub fn register(
        &self,
        handler: TypedHandlerFn<A>,
        dispatcher: Option<Dispatcher>,
        user_data: Option<UserData>,
    ) -> Result<()> {
        self.core.register(Self::handler(handler), dispatcher, user_data)
    }

    /// Remove one registration of `handler` on `dispatcher`
    pub fn unregister(&self, handler: TypedHandlerFn<A>, dispatcher: Option<&Dispatcher>) -> bool {
        self.core
            .unregister(HandlerId::from_addr(handler as usize), dispatcher)
    }

    pub fn is_registered(&self, handler: TypedHandlerFn<A>, dispatcher: Option<&Dispatcher>) -> bool {
        self.core
            .is_registered(HandlerId::from_addr(handler as usize), dispatcher)
    }

    /// Call every registered handler with `arg`
    ///
    /// Returns true if at least one handler was called or handed off.
    pub fn invoke(&self, arg: &A) -> bool {
        let mut buf = [0u8; MAX_ARG_SIZE];
        let encoded = &mut buf[..A::SIZE];
        arg.encode(encoded);
        self.core.invoke(encoded)
    }

    /// Identity under which `handler` is registered
    pub fn handler_id(handler: TypedHandlerFn<A>) -> HandlerId {
        HandlerId::from_addr(handler as usize)
    }

    pub fn registration(&self, index: usize) -> Option<RegistrationInfo> {
        self.core.registration(index)
    }

    pub fn registered_count(&self) -> usize {
        self.core.registered_count()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn name(&self) -> &'static str {
        self.core.name()
    }

    /// Remove every registration
    pub fn terminate(&self) {
        self.core.terminate()
    }
}

/// Element-array callback interface with room for `N` registrations
///
/// Publishers pass a slice; each handler receives an [`Elements`] view over
/// its own copy of the encoded elements.
pub struct ArrayCallback<E, const N: usize> {
    core: Multicast,
    _element: PhantomData<fn(&E)>,
}

impl<E: CallbackArg + 'static, const N: usize> ArrayCallback<E, N> {
    /// Define the interface
    ///
    /// Faults unless one element fits both [`MAX_ARG_SIZE`] and the largest
    /// transport block.
    pub fn new(name: &'static str, transport: &Arc<TransportAllocator>) -> Self {
        let limit = arg_limit(transport);
        if E::SIZE == 0 || E::SIZE > limit {
            fault(format_args!(
                "array callback interface '{}' element size {} is not in 1..={}",
                name,
                E::SIZE,
                limit
            ));
        }

        Self {
            core: Multicast::new(name, N, Arc::clone(transport)),
            _element: PhantomData,
        }
    }

    fn handler(handler: ArrayHandlerFn<E>) -> Handler {
        Handler::from_parts(HandlerId::from_addr(handler as usize), move |bytes, user_data| {
            handler(Elements::new(bytes), user_data)
        })
    }

    /// Register `handler`, synchronously if `dispatcher` is `None`
    pub fn register(
        &self,
        handler: ArrayHandlerFn<E>,
        dispatcher: Option<Dispatcher>,
        user_data: Option<UserData>,
    ) -> Result<()> {
        self.core.register(Self::handler(handler), dispatcher, user_data)
    }

    /// Remove one registration of `handler` on `dispatcher`
    pub fn unregister(&self, handler: ArrayHandlerFn<E>, dispatcher: Option<&Dispatcher>) -> bool {
        self.core
            .unregister(HandlerId::from_addr(handler as usize), dispatcher)
    }

    pub fn is_registered(&self, handler: ArrayHandlerFn<E>, dispatcher: Option<&Dispatcher>) -> bool {
        self.core
            .is_registered(HandlerId::from_addr(handler as usize), dispatcher)
    }

    /// Call every registered handler with `elements`
    ///
    /// Fails if the encoded array exceeds [`MAX_ARG_SIZE`] or the largest
    /// transport block.
    pub fn invoke(&self, elements: &[E]) -> Result<bool> {
        let limit = arg_limit(self.core.transport());
        let size = elements.len().saturating_mul(E::SIZE);
        if size > limit {
            return Err(CallbackError::ArgumentTooLarge { size, limit });
        }

        let mut buf = [0u8; MAX_ARG_SIZE];
        for (element, chunk) in elements.iter().zip(buf.chunks_exact_mut(E::SIZE)) {
            element.encode(chunk);
        }

        Ok(self.core.invoke_array(&buf, elements.len(), E::SIZE))
    }

    /// Identity under which `handler` is registered
    pub fn handler_id(handler: ArrayHandlerFn<E>) -> HandlerId {
        HandlerId::from_addr(handler as usize)
    }

    pub fn registration(&self, index: usize) -> Option<RegistrationInfo> {
        self.core.registration(index)
    }

    pub fn registered_count(&self) -> usize {
        self.core.registered_count()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn name(&self) -> &'static str {
        self.core.name()
    }

    /// Remove every registration
    pub fn terminate(&self) {
        self.core.terminate()
    }
}

/// Declare a named callback interface type
///
/// `Name: Type, MAX` declares a single-value interface, `Name: [Type], MAX` an
/// element-array interface. The generated type derefs to
/// [`Callback`] or [`ArrayCallback`] and is constructed with the transport
/// allocator its asynchronous deliveries draw from.
#[macro_export]
macro_rules! callback_interface {
    ($(#[$meta:meta])* $vis:vis $name:ident: [$elem:ty], $max:expr) => {
        $(#[$meta])*
        $vis struct $name($crate::ArrayCallback<$elem, { $max }>);

        impl $name {
            $vis fn new(transport: &::std::sync::Arc<$crate::TransportAllocator>) -> Self {
                Self($crate::ArrayCallback::new(stringify!($name), transport))
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = $crate::ArrayCallback<$elem, { $max }>;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
    ($(#[$meta:meta])* $vis:vis $name:ident: $arg:ty, $max:expr) => {
        $(#[$meta])*
        $vis struct $name($crate::Callback<$arg, { $max }>);

        impl $name {
            $vis fn new(transport: &::std::sync::Arc<$crate::TransportAllocator>) -> Self {
                Self($crate::Callback::new(stringify!($name), transport))
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = $crate::Callback<$arg, { $max }>;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}
