//! Callback transport allocator
//!
//! The only memory source of the dispatch core. Envelope records and argument
//! copies that travel to a destination context are carved out of a
//! [`BlockAllocator`] with transport-tuned size classes.

use super::{Block, BlockAllocator, PoolStats};
use crate::config::{ExhaustionPolicy, TransportConfig};
use crate::types::Result;
use std::mem::size_of;

/// Transport footprint of one envelope record
///
/// Sized for the three references an envelope carries: the handler, the
/// payload copy and the subscriber's user data. The block is a capacity
/// reservation only and is never written; the envelope itself lives on the
/// heap. Holding it ties each in-flight envelope to one transport slot, so
/// pool exhaustion caps the number of queued envelopes.
pub const ENVELOPE_RECORD_SIZE: usize = 3 * size_of::<usize>();

const TRANSPORT_ALLOCATOR_NAME: &str = "callback-transport";

/// Fixed-block allocator dedicated to callback transport memory
pub struct TransportAllocator {
    allocator: BlockAllocator,
    policy: ExhaustionPolicy,
}

impl TransportAllocator {
    /// Create the transport allocator
    ///
    /// This is the allocator's one-time initialization: every pool is reserved
    /// here. Teardown happens on drop, after all destination contexts drained.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let allocator = BlockAllocator::new(TRANSPORT_ALLOCATOR_NAME, &config.allocator_config())?;

        if allocator.max_block_size() < ENVELOPE_RECORD_SIZE {
            log::warn!(
                "Largest transport block ({} bytes) cannot hold an envelope record ({} bytes)",
                allocator.max_block_size(),
                ENVELOPE_RECORD_SIZE
            );
        }

        Ok(Self {
            allocator,
            policy: config.on_exhaustion,
        })
    }

    /// Create the transport allocator with the default size classes
    pub fn with_defaults() -> Result<Self> {
        Self::new(&TransportConfig::default())
    }

    /// What dispatch does when this allocator runs dry
    pub fn exhaustion_policy(&self) -> ExhaustionPolicy {
        self.policy
    }

    /// Allocate a transport block of at least `size` bytes
    pub fn allocate(&self, size: usize) -> Option<Block> {
        self.allocator.allocate(size)
    }

    /// Return a transport block; `None` is a no-op
    pub fn free(&self, block: impl Into<Option<Block>>) {
        self.allocator.free(block)
    }

    /// Resize a transport block, handing the original back on failure
    pub fn reallocate(&self, block: Block, new_size: usize) -> std::result::Result<Block, Block> {
        self.allocator.reallocate(block, new_size)
    }

    /// Allocate a zero-filled transport block for `count` elements of `size` bytes
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> Option<Block> {
        self.allocator.allocate_zeroed(count, size)
    }

    /// Allocate a block holding a bitwise copy of `data`
    pub(crate) fn allocate_copy(&self, data: &[u8]) -> Option<Block> {
        let mut block = self.allocate(data.len())?;
        block.copy_from_slice(data);
        Some(block)
    }

    /// Reserve the transport slot of one envelope record
    pub(crate) fn allocate_envelope(&self) -> Option<Block> {
        self.allocate(ENVELOPE_RECORD_SIZE)
    }

    /// Check if `block` is transport memory from this allocator
    pub fn owns(&self, block: &Block) -> bool {
        self.allocator.owns(block)
    }

    /// Per-pool statistics, smallest block size first
    pub fn stats(&self) -> Vec<PoolStats> {
        self.allocator.stats()
    }

    /// Usable size of the largest transport block
    pub fn max_block_size(&self) -> usize {
        self.allocator.max_block_size()
    }

    /// Number of transport blocks currently in flight
    pub fn outstanding_blocks(&self) -> usize {
        self.allocator.outstanding_blocks()
    }
}
