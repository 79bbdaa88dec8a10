//! Owned handle to one allocated block

use super::AllocatorInner;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A block handed out by a [`BlockAllocator`](super::BlockAllocator)
///
/// The handle carries the ownership metadata (allocator, pool, slot) so a block
/// can be freed or resized without the caller supplying its size. Dropping the
/// handle returns the block to the pool it came from; moving the handle moves
/// ownership of the memory.
pub struct Block {
    /// Block storage, taken back by the pool on release
    storage: Option<Box<[u8]>>,
    /// Requested length (never more than the pool's block size)
    len: usize,
    pool: usize,
    slot: usize,
    owner: Arc<AllocatorInner>,
}

impl Block {
    pub(super) fn new(
        storage: Box<[u8]>,
        len: usize,
        pool: usize,
        slot: usize,
        owner: Arc<AllocatorInner>,
    ) -> Self {
        Self {
            storage: Some(storage),
            len,
            pool,
            slot,
            owner,
        }
    }

    /// Requested length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length view (only possible after a shrinking resize)
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Usable size of the underlying block
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.len())
    }

    /// Index of the owning pool (0 = smallest block size)
    pub fn pool_index(&self) -> usize {
        self.pool
    }

    /// Slot index within the owning pool
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub(super) fn owner(&self) -> &Arc<AllocatorInner> {
        &self.owner
    }

    /// Change the visible length within the current block
    pub(super) fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.capacity());
        self.len = len;
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.storage {
            Some(storage) => &storage[..self.len],
            None => &[],
        }
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Some(storage) => &mut storage[..self.len],
            None => &mut [],
        }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.owner.release(self.pool, self.slot, storage);
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("allocator", &self.owner.name)
            .field("pool", &self.pool)
            .field("slot", &self.slot)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
