//! Fixed-block memory allocation
//!
//! Size-classed pools of pre-reserved blocks. Requests are routed to the
//! smallest pool whose block size fits; nothing falls back to the system heap
//! once an allocator has been built, so allocation latency and the memory
//! footprint stay bounded.
//!
//! # Architecture
//!
//! ```text
//! BlockAllocator ("callback-transport")
//!   ├─→ Pool(32B  x 20) → free: [19, 18, ... 0]
//!   └─→ Pool(128B x 10) → free: [9, 8, ... 0]
//!
//! Block { pool, slot, len } ──drop/free──→ back to Pool[pool].slots[slot]
//! ```
//!
//! All pools of one allocator share a single lock. Allocation is O(pool
//! count), release is O(1).

mod block;
mod pool;
mod transport;

pub use block::Block;
pub use pool::PoolStats;
pub use transport::{TransportAllocator, ENVELOPE_RECORD_SIZE};

use crate::config::AllocatorConfig;
use crate::types::{fault, Result};
use pool::Pool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared allocator state, kept alive by every outstanding block
pub(crate) struct AllocatorInner {
    name: String,
    pools: Mutex<Vec<Pool>>,
}

impl AllocatorInner {
    fn lock(&self) -> MutexGuard<'_, Vec<Pool>> {
        // A fault while holding the lock must not wedge blocks still in flight
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a block's storage to its pool
    fn release(&self, pool: usize, slot: usize, storage: Box<[u8]>) {
        let mut pools = self.lock();
        match pools.get_mut(pool) {
            Some(p) => p.restore(slot, storage),
            None => fault(format_args!(
                "allocator '{}' has no pool {} (block slot {})",
                self.name, pool, slot
            )),
        }
        log::trace!("[{}] released pool {} slot {}", self.name, pool, slot);
    }
}

/// Size-classed fixed-block allocator
pub struct BlockAllocator {
    inner: Arc<AllocatorInner>,
}

impl BlockAllocator {
    /// Create an allocator, reserving every block of every pool up front
    ///
    /// # Arguments
    /// * `name` - Label used in log output
    /// * `config` - Pool layout, smallest block size first
    pub fn new(name: impl Into<String>, config: &AllocatorConfig) -> Result<Self> {
        config.validate()?;
        let name = name.into();

        let pools = config
            .pools
            .iter()
            .map(|p| Pool::new(p.block_size, p.capacity))
            .collect();

        log::info!(
            "Initialized allocator '{}' with {} pools: {:?}",
            name,
            config.pools.len(),
            config
                .pools
                .iter()
                .map(|p| (p.block_size, p.capacity))
                .collect::<Vec<_>>()
        );

        Ok(Self {
            inner: Arc::new(AllocatorInner {
                name,
                pools: Mutex::new(pools),
            }),
        })
    }

    /// Allocator label
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Allocate a block of at least `size` bytes
    ///
    /// Pools are scanned smallest first; the first pool that fits and has a
    /// free block serves the request. Returns `None` for a zero-size request
    /// or when no fitting pool has a free block.
    pub fn allocate(&self, size: usize) -> Option<Block> {
        if size == 0 {
            log::trace!("[{}] zero-size allocation ignored", self.inner.name);
            return None;
        }

        let mut pools = self.inner.lock();
        for (index, pool) in pools.iter_mut().enumerate() {
            if !pool.can_fit(size) {
                continue;
            }
            if let Some((slot, storage)) = pool.take() {
                log::trace!(
                    "[{}] allocated {} bytes from pool {} slot {}",
                    self.inner.name,
                    size,
                    index,
                    slot
                );
                return Some(Block::new(storage, size, index, slot, Arc::clone(&self.inner)));
            }
        }

        log::debug!("[{}] no free block for {} bytes", self.inner.name, size);
        None
    }

    /// Allocate a zero-filled block for `count` elements of `size` bytes
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> Option<Block> {
        let total = count.checked_mul(size)?;
        let mut block = self.allocate(total)?;
        block.fill(0);
        Some(block)
    }

    /// Return a block to the pool it came from
    ///
    /// Passing `None` is a no-op. Freeing a block issued by a different
    /// allocator is a fault.
    pub fn free(&self, block: impl Into<Option<Block>>) {
        let Some(block) = block.into() else {
            return;
        };

        if !self.owns(&block) {
            fault(format_args!(
                "allocator '{}' asked to free a block owned by '{}'",
                self.inner.name,
                block.owner().name
            ));
        }

        drop(block);
    }

    /// Resize a block
    ///
    /// If the new size still fits the current block, the same block is
    /// returned. Otherwise a fitting block is allocated, `min(old, new)` bytes
    /// are copied and the old block is freed. On failure the original block is
    /// handed back untouched.
    pub fn reallocate(&self, mut block: Block, new_size: usize) -> std::result::Result<Block, Block> {
        if !self.owns(&block) {
            fault(format_args!(
                "allocator '{}' asked to resize a block owned by '{}'",
                self.inner.name,
                block.owner().name
            ));
        }

        if new_size == 0 {
            log::debug!("[{}] zero-size reallocation rejected", self.inner.name);
            return Err(block);
        }

        if new_size <= block.capacity() {
            block.set_len(new_size);
            return Ok(block);
        }

        let Some(mut grown) = self.allocate(new_size) else {
            return Err(block);
        };

        let keep = block.len().min(new_size);
        grown[..keep].copy_from_slice(&block[..keep]);
        self.free(block);
        Ok(grown)
    }

    /// Check if `block` was issued by this allocator
    pub fn owns(&self, block: &Block) -> bool {
        Arc::ptr_eq(block.owner(), &self.inner)
    }

    /// Largest request any pool can satisfy
    pub fn max_block_size(&self) -> usize {
        self.inner
            .lock()
            .iter()
            .map(|p| p.block_size())
            .max()
            .unwrap_or(0)
    }

    /// Per-pool statistics, smallest block size first
    pub fn stats(&self) -> Vec<PoolStats> {
        self.inner.lock().iter().map(|p| p.stats()).collect()
    }

    /// Number of blocks currently handed out across all pools
    pub fn outstanding_blocks(&self) -> usize {
        self.inner
            .lock()
            .iter()
            .map(|p| p.capacity() - p.free_count())
            .sum()
    }
}

impl Drop for BlockAllocator {
    fn drop(&mut self) {
        let outstanding = self.outstanding_blocks();
        if outstanding > 0 {
            log::warn!(
                "Allocator '{}' terminated with {} blocks outstanding",
                self.inner.name,
                outstanding
            );
        } else {
            log::info!("Allocator '{}' terminated", self.inner.name);
        }
    }
}
