//! Fixed-block size class

use serde::Serialize;

/// A pool of equally sized blocks
///
/// Every block is reserved when the pool is created. A block leaves the pool by
/// value (the caller takes its storage) and comes back by value, so the pool
/// never touches the system allocator after construction. The free list is a
/// stack of slot indices: the most recently released block is reused first.
#[derive(Debug)]
pub(crate) struct Pool {
    /// Usable bytes per block
    block_size: usize,
    /// Block storage; `None` while the block is handed out
    slots: Vec<Option<Box<[u8]>>>,
    /// Indices of free slots
    free_list: Vec<usize>,
    allocations: u64,
    frees: u64,
    failures: u64,
}

impl Pool {
    /// Create a pool with `capacity` zeroed blocks of `block_size` bytes
    pub(crate) fn new(block_size: usize, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Some(vec![0u8; block_size].into_boxed_slice()))
            .collect();

        // Reverse so that slot 0 is handed out first
        let free_list = (0..capacity).rev().collect();

        Self {
            block_size,
            slots,
            free_list,
            allocations: 0,
            frees: 0,
            failures: 0,
        }
    }

    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Check if a request of `size` bytes fits in this pool's blocks
    pub(crate) fn can_fit(&self, size: usize) -> bool {
        size <= self.block_size
    }

    /// Take a free block out of the pool
    ///
    /// Returns the slot index and the block storage, or `None` if every block
    /// is in use.
    pub(crate) fn take(&mut self) -> Option<(usize, Box<[u8]>)> {
        let Some(slot) = self.free_list.pop() else {
            self.failures += 1;
            return None;
        };

        match self.slots[slot].take() {
            Some(storage) => {
                self.allocations += 1;
                Some((slot, storage))
            }
            None => crate::types::fault(format_args!(
                "free list of {}-byte pool names slot {} which is in use",
                self.block_size, slot
            )),
        }
    }

    /// Return a block's storage to its slot
    pub(crate) fn restore(&mut self, slot: usize, storage: Box<[u8]>) {
        if storage.len() != self.block_size {
            crate::types::fault(format_args!(
                "{}-byte block returned to {}-byte pool",
                storage.len(),
                self.block_size
            ));
        }

        match self.slots.get_mut(slot) {
            Some(entry) if entry.is_none() => {
                *entry = Some(storage);
                self.free_list.push(slot);
                self.frees += 1;
            }
            Some(_) => crate::types::fault(format_args!(
                "slot {} of {}-byte pool released while already free",
                slot, self.block_size
            )),
            None => crate::types::fault(format_args!(
                "slot {} out of range for {}-byte pool of {} blocks",
                slot,
                self.block_size,
                self.slots.len()
            )),
        }
    }

    /// Snapshot of this pool's counters
    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            block_size: self.block_size,
            capacity: self.capacity(),
            free_blocks: self.free_count(),
            allocations: self.allocations,
            frees: self.frees,
            failures: self.failures,
        }
    }
}

/// Statistics for one size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Usable bytes per block
    pub block_size: usize,
    /// Total blocks in the pool
    pub capacity: usize,
    /// Blocks currently available
    pub free_blocks: usize,
    /// Successful allocations served by this pool
    pub allocations: u64,
    /// Blocks returned to this pool
    pub frees: u64,
    /// Requests that fit this pool but found it empty
    pub failures: u64,
}

impl PoolStats {
    /// Blocks currently handed out
    pub fn used_blocks(&self) -> usize {
        self.capacity - self.free_blocks
    }
}
