//! The packaged asynchronous call

use super::handler::{Handler, HandlerId};
use crate::allocator::Block;
use crate::types::UserData;
use std::fmt;

/// One asynchronous callback in transit to a destination context
///
/// Created by the dispatch core, then moved into the destination's queue. The
/// destination owns it from that point and must hand it to
/// [`target_invoke`](super::target_invoke) exactly once on its own execution
/// context. Invoking consumes the envelope and releases its payload copy and
/// its transport slot. An envelope dropped without being invoked still returns
/// its memory, but the callback is lost.
pub struct Envelope {
    handler: Handler,
    /// Bitwise copy of the argument bytes, `None` for an empty argument
    payload: Option<Block>,
    user_data: Option<UserData>,
    /// Transport slot held while the envelope is in flight, never written
    record: Option<Block>,
    delivered: bool,
}

impl Envelope {
    pub(crate) fn new(
        handler: Handler,
        payload: Option<Block>,
        user_data: Option<UserData>,
        record: Block,
    ) -> Self {
        Self {
            handler,
            payload,
            user_data,
            record: Some(record),
            delivered: false,
        }
    }

    /// Identity of the handler this envelope will call
    pub fn handler_id(&self) -> HandlerId {
        self.handler.id()
    }

    /// The copied argument bytes (empty if the call carried no data)
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or(&[])
    }

    /// Mutable access to this envelope's private argument copy
    pub fn payload_mut(&mut self) -> &mut [u8] {
        match self.payload.as_deref_mut() {
            Some(payload) => payload,
            None => &mut [],
        }
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    /// Call the handler, then release the payload and the envelope
    pub(crate) fn deliver(mut self) {
        self.handler.call(self.payload(), self.user_data.as_ref());
        self.delivered = true;
    }
}

impl Drop for Envelope {
    fn drop(&mut self) {
        if !self.delivered {
            log::warn!("Envelope for {} dropped without being invoked", self.handler.id());
        }

        // Payload first, then the envelope record itself
        drop(self.payload.take());
        drop(self.record.take());
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("handler", &self.handler.id())
            .field("payload_len", &self.payload().len())
            .field("has_user_data", &self.user_data.is_some())
            .field("delivered", &self.delivered)
            .finish()
    }
}
