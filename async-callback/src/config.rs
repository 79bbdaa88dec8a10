//! Allocator configuration types
//!
//! Pool layouts are fixed when an allocator is constructed. The transport
//! defaults mirror the two size classes the dispatch core was tuned for:
//! small blocks for envelope records and scalar arguments, larger blocks for
//! short strings and structs.

use crate::types::{CallbackError, Result};
use serde::{Deserialize, Serialize};

/// Default block size of the small transport class (bytes)
pub const SMALL_BLOCK_SIZE: usize = 32;
/// Default number of blocks in the small transport class
pub const SMALL_BLOCK_COUNT: usize = 20;
/// Default block size of the large transport class (bytes)
pub const LARGE_BLOCK_SIZE: usize = 128;
/// Default number of blocks in the large transport class
pub const LARGE_BLOCK_COUNT: usize = 10;

/// One fixed-block size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Usable bytes per block
    pub block_size: usize,
    /// Number of blocks reserved up front
    pub capacity: usize,
}

impl PoolConfig {
    /// Create a new pool configuration
    pub fn new(block_size: usize, capacity: usize) -> Self {
        Self {
            block_size,
            capacity,
        }
    }
}

/// Configuration for a [`BlockAllocator`](crate::BlockAllocator)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Size classes, smallest block first
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

impl AllocatorConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: append a size class
    pub fn add_pool(mut self, block_size: usize, capacity: usize) -> Self {
        self.pools.push(PoolConfig::new(block_size, capacity));
        self
    }

    /// Check that the pool layout can back an allocator
    ///
    /// Pools must be non-empty and strictly ascending by block size so the
    /// first fitting pool is also the smallest one.
    pub fn validate(&self) -> Result<()> {
        if self.pools.is_empty() {
            return Err(CallbackError::NoPools);
        }

        for (index, pool) in self.pools.iter().enumerate() {
            if pool.block_size == 0 {
                return Err(CallbackError::ZeroBlockSize { index });
            }
            if pool.capacity == 0 {
                return Err(CallbackError::ZeroCapacity { index });
            }
        }

        for pair in self.pools.windows(2) {
            if pair[1].block_size <= pair[0].block_size {
                return Err(CallbackError::PoolsNotAscending {
                    previous: pair[0].block_size,
                    current: pair[1].block_size,
                });
            }
        }

        Ok(())
    }

    /// Largest request any pool can satisfy
    pub fn max_block_size(&self) -> usize {
        self.pools.iter().map(|p| p.block_size).max().unwrap_or(0)
    }
}

/// What asynchronous dispatch does when transport memory runs out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Treat exhaustion as a fatal fault (a dropped callback is a silent bug)
    #[default]
    Abort,
    /// Log the failure and report the registration as not dispatched
    Report,
}

/// Configuration for the [`TransportAllocator`](crate::TransportAllocator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Size classes backing envelopes and payload copies
    #[serde(default = "default_transport_pools")]
    pub pools: Vec<PoolConfig>,

    /// Behaviour when dispatch cannot obtain transport memory
    #[serde(default)]
    pub on_exhaustion: ExhaustionPolicy,
}

fn default_transport_pools() -> Vec<PoolConfig> {
    vec![
        PoolConfig::new(SMALL_BLOCK_SIZE, SMALL_BLOCK_COUNT),
        PoolConfig::new(LARGE_BLOCK_SIZE, LARGE_BLOCK_COUNT),
    ]
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            pools: default_transport_pools(),
            on_exhaustion: ExhaustionPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Create a transport configuration with the default size classes
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: replace the size classes
    pub fn with_pools(mut self, pools: Vec<PoolConfig>) -> Self {
        self.pools = pools;
        self
    }

    /// Builder method: set the exhaustion policy
    pub fn with_exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_exhaustion = policy;
        self
    }

    /// Allocator layout for these size classes
    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            pools: self.pools.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_config_builder() {
        let config = AllocatorConfig::new().add_pool(16, 4).add_pool(64, 2);

        assert_eq!(config.pools.len(), 2);
        assert_eq!(config.pools[1], PoolConfig::new(64, 2));
        assert_eq!(config.max_block_size(), 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_layouts() {
        assert!(matches!(
            AllocatorConfig::new().validate(),
            Err(CallbackError::NoPools)
        ));
        assert!(matches!(
            AllocatorConfig::new().add_pool(0, 4).validate(),
            Err(CallbackError::ZeroBlockSize { index: 0 })
        ));
        assert!(matches!(
            AllocatorConfig::new().add_pool(16, 4).add_pool(32, 0).validate(),
            Err(CallbackError::ZeroCapacity { index: 1 })
        ));
        assert!(matches!(
            AllocatorConfig::new().add_pool(64, 4).add_pool(64, 4).validate(),
            Err(CallbackError::PoolsNotAscending {
                previous: 64,
                current: 64
            })
        ));
    }

    #[test]
    fn test_transport_defaults() {
        let config = TransportConfig::new();

        assert_eq!(config.pools, vec![PoolConfig::new(32, 20), PoolConfig::new(128, 10)]);
        assert_eq!(config.on_exhaustion, ExhaustionPolicy::Abort);
        assert!(config.allocator_config().validate().is_ok());
    }

    #[test]
    fn test_transport_config_deserialization() {
        let json = r#"{ "on_exhaustion": "report" }"#;
        let config: TransportConfig = serde_json::from_str(json).unwrap();

        // Missing pools fall back to the default classes
        assert_eq!(config.pools.len(), 2);
        assert_eq!(config.on_exhaustion, ExhaustionPolicy::Report);
    }
}
