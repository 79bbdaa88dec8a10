//! Fixed-capacity registration table of one callback interface

use super::envelope::Envelope;
use super::handler::{Handler, HandlerId};
use super::{same_dispatcher, Dispatcher};
use crate::allocator::TransportAllocator;
use crate::config::ExhaustionPolicy;
use crate::types::{fault, CallbackError, Result, UserData};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One subscriber's entry in the table
#[derive(Clone)]
struct Registration {
    handler: Handler,
    /// `None` marks synchronous delivery
    dispatcher: Option<Dispatcher>,
    user_data: Option<UserData>,
}

impl Registration {
    fn matches(&self, handler: HandlerId, dispatcher: Option<&Dispatcher>) -> bool {
        self.handler.id() == handler && same_dispatcher(self.dispatcher.as_ref(), dispatcher)
    }
}

/// Read-only view of an occupied registration slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub handler: HandlerId,
    /// Name of the destination context, `None` for synchronous delivery
    pub destination: Option<String>,
    pub has_user_data: bool,
}

impl RegistrationInfo {
    pub fn is_async(&self) -> bool {
        self.destination.is_some()
    }
}

/// Untyped multicast callback interface
///
/// The table is guarded by one lock. The lock is held only while a slot is
/// read or written: `invoke` copies out one slot at a time and dispatches with
/// the lock released, so a synchronous handler may register, unregister or
/// invoke on the same interface. Slot changes made during an invoke affect the
/// slots not yet visited and every later invoke.
pub struct Multicast {
    name: &'static str,
    slots: Mutex<Box<[Option<Registration>]>>,
    transport: Arc<TransportAllocator>,
}

impl Multicast {
    /// Create an interface with room for `capacity` registrations
    ///
    /// A zero capacity is a definition error and faults.
    pub fn new(name: &'static str, capacity: usize, transport: Arc<TransportAllocator>) -> Self {
        if capacity == 0 {
            fault(format_args!("callback interface '{}' defined with zero capacity", name));
        }

        log::debug!("Callback interface '{}' created with {} slots", name, capacity);

        Self {
            name,
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
            transport,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum number of simultaneous registrations
    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// Number of occupied slots
    pub fn registered_count(&self) -> usize {
        self.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Transport allocator used for asynchronous deliveries
    pub fn transport(&self) -> &Arc<TransportAllocator> {
        &self.transport
    }

    fn lock(&self) -> MutexGuard<'_, Box<[Option<Registration>]>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handler
    ///
    /// # Arguments
    /// * `handler` - Function to call on every invoke
    /// * `dispatcher` - Destination context for asynchronous delivery, or `None`
    ///   to run the handler synchronously on the invoking thread
    /// * `user_data` - Optional data passed back on every call
    ///
    /// # Returns
    /// * `Err(CallbackError::TableFull)` if every slot is taken. Capacity is
    ///   fixed at definition time, so callers should treat this as fatal.
    pub fn register(
        &self,
        handler: Handler,
        dispatcher: Option<Dispatcher>,
        user_data: Option<UserData>,
    ) -> Result<()> {
        let mut slots = self.lock();

        // First empty slot wins
        let Some(index) = slots.iter().position(|s| s.is_none()) else {
            log::error!(
                "Callback interface '{}' is full, cannot register {}",
                self.name,
                handler.id()
            );
            return Err(CallbackError::TableFull {
                interface: self.name,
                capacity: slots.len(),
            });
        };

        log::debug!(
            "[{}] registered {} in slot {} ({})",
            self.name,
            handler.id(),
            index,
            dispatcher.as_ref().map_or("sync", |d| d.name())
        );

        slots[index] = Some(Registration {
            handler,
            dispatcher,
            user_data,
        });
        Ok(())
    }

    /// Remove the first registration matching both `handler` and `dispatcher`
    ///
    /// Returns `false` if nothing matched.
    pub fn unregister(&self, handler: HandlerId, dispatcher: Option<&Dispatcher>) -> bool {
        let mut slots = self.lock();

        let Some(index) = slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|r| r.matches(handler, dispatcher)))
        else {
            log::trace!("[{}] unregister of {} found no match", self.name, handler);
            return false;
        };

        slots[index] = None;
        log::debug!("[{}] unregistered {} from slot {}", self.name, handler, index);
        true
    }

    /// Check if a registration matching both `handler` and `dispatcher` exists
    pub fn is_registered(&self, handler: HandlerId, dispatcher: Option<&Dispatcher>) -> bool {
        self.lock()
            .iter()
            .flatten()
            .any(|r| r.matches(handler, dispatcher))
    }

    /// Inspect one slot
    ///
    /// Returns `None` for an empty slot or an index past capacity.
    pub fn registration(&self, index: usize) -> Option<RegistrationInfo> {
        let slots = self.lock();
        let registration = slots.get(index)?.as_ref()?;

        Some(RegistrationInfo {
            handler: registration.handler.id(),
            destination: registration.dispatcher.as_ref().map(|d| d.name().to_string()),
            has_user_data: registration.user_data.is_some(),
        })
    }

    /// Call every registered handler with `data`
    ///
    /// Slots are visited in table order. Each asynchronous registration gets
    /// its own copy of `data`. Returns true if at least one registration was
    /// called or successfully handed off.
    pub fn invoke(&self, data: &[u8]) -> bool {
        let mut invoked = false;
        let capacity = self.capacity();

        for index in 0..capacity {
            // Copy the slot out so the lock is not held across the handler
            let registration = match self.lock().get(index) {
                Some(Some(registration)) => registration.clone(),
                _ => continue,
            };

            if self.dispatch(&registration, data) {
                invoked = true;
            }
        }

        invoked
    }

    /// Call every registered handler with an array of `count` elements of
    /// `element_size` bytes each
    ///
    /// `data` must hold at least `count * element_size` bytes.
    pub fn invoke_array(&self, data: &[u8], count: usize, element_size: usize) -> bool {
        let size = match count.checked_mul(element_size) {
            Some(size) if size <= data.len() => size,
            _ => fault(format_args!(
                "[{}] array of {} x {} bytes does not fit the {} bytes supplied",
                self.name,
                count,
                element_size,
                data.len()
            )),
        };

        self.invoke(&data[..size])
    }

    /// Deliver one call to one registration
    fn dispatch(&self, registration: &Registration, data: &[u8]) -> bool {
        let Some(dispatcher) = &registration.dispatcher else {
            registration.handler.call(data, registration.user_data.as_ref());
            return true;
        };

        let payload = if data.is_empty() {
            None
        } else {
            match self.transport.allocate_copy(data) {
                Some(payload) => Some(payload),
                None => return self.exhausted(registration, "payload", data.len()),
            }
        };

        let Some(record) = self.transport.allocate_envelope() else {
            self.transport.free(payload);
            return self.exhausted(registration, "envelope", data.len());
        };

        let envelope = Envelope::new(
            registration.handler.clone(),
            payload,
            registration.user_data.clone(),
            record,
        );

        // Ownership of the envelope moves to the destination context
        if dispatcher.dispatch(envelope) {
            log::trace!(
                "[{}] {} dispatched to '{}' ({} bytes)",
                self.name,
                registration.handler.id(),
                dispatcher.name(),
                data.len()
            );
            true
        } else {
            log::warn!(
                "[{}] destination '{}' refused envelope for {}",
                self.name,
                dispatcher.name(),
                registration.handler.id()
            );
            false
        }
    }

    fn exhausted(&self, registration: &Registration, what: &str, size: usize) -> bool {
        match self.transport.exhaustion_policy() {
            ExhaustionPolicy::Abort => fault(format_args!(
                "[{}] transport memory exhausted allocating {} for {} ({} bytes)",
                self.name,
                what,
                registration.handler.id(),
                size
            )),
            ExhaustionPolicy::Report => {
                log::error!(
                    "[{}] transport memory exhausted allocating {} for {} ({} bytes), callback not dispatched",
                    self.name,
                    what,
                    registration.handler.id(),
                    size
                );
                false
            }
        }
    }

    /// Remove every registration
    ///
    /// Envelopes already handed to destination contexts are not affected.
    pub fn terminate(&self) {
        let cleared = clear_slots(&mut self.lock());

        log::info!(
            "Callback interface '{}' terminated ({} registrations cleared)",
            self.name,
            cleared
        );
    }
}

/// Release every registration with its dispatcher and user data references
fn clear_slots(slots: &mut [Option<Registration>]) -> usize {
    slots.iter_mut().filter_map(Option::take).count()
}

impl Drop for Multicast {
    fn drop(&mut self) {
        let slots = self.slots.get_mut().unwrap_or_else(PoisonError::into_inner);
        let cleared = clear_slots(slots);
        if cleared > 0 {
            log::info!(
                "Callback interface '{}' dropped ({} registrations cleared)",
                self.name,
                cleared
            );
        }
    }
}
