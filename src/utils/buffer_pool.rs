//! # Buffer Pool
//!
//! Pool of reusable byte buffers backing packing archives.
//!
//! A buffer is handed out as a [`PooledBuffer`] and goes back to the pool when that
//! guard is dropped, so an archive abandoned halfway through a failed pack still
//! returns its buffer. Buffers that grew past the configured capacity ceiling are
//! released to the allocator instead.
//!
//! ## Usage
//! ```rust
//! use replica_archive::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(4);
//! {
//!     let mut buffer = pool.acquire();
//!     buffer.extend_from_slice(b"state");
//! }
//! assert_eq!(pool.available(), 4);
//! ```

use crate::config::PoolConfig;
use crate::utils::metrics::global_metrics;
use std::sync::{Arc, Mutex};

/// Largest capacity a buffer may have and still be pooled
pub const DEFAULT_MAX_POOLED_CAPACITY: usize = 64 * 1024;

/// Capacity of freshly allocated buffers
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// A pooled buffer that returns itself to the pool when dropped
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<Mutex<Vec<Vec<u8>>>>,
    max_pooled_capacity: usize,
}

impl PooledBuffer {
    /// Take the bytes out, leaving nothing to return to the pool
    pub fn into_inner(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let capacity = self.buffer.capacity();
        if capacity == 0 || capacity > self.max_pooled_capacity {
            return;
        }
        self.buffer.clear();
        if let Ok(mut pool) = self.pool.lock() {
            pool.push(std::mem::take(&mut self.buffer));
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buffer.len())
            .field("capacity", &self.buffer.capacity())
            .finish()
    }
}

/// Thread-safe pool of archive buffers
pub struct BufferPool {
    pool: Arc<Mutex<Vec<Vec<u8>>>>,
    initial_capacity: usize,
    max_pooled_capacity: usize,
}

impl BufferPool {
    /// Pool pre-filled with `pool_size` buffers of the default capacity
    pub fn new(pool_size: usize) -> Self {
        Self::with_capacity(pool_size, DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_POOLED_CAPACITY)
    }

    pub fn with_capacity(
        pool_size: usize,
        initial_capacity: usize,
        max_pooled_capacity: usize,
    ) -> Self {
        let mut pool = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            pool.push(Vec::with_capacity(initial_capacity));
        }

        Self {
            pool: Arc::new(Mutex::new(pool)),
            initial_capacity,
            max_pooled_capacity,
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::with_capacity(
            config.pool_size,
            config.initial_capacity,
            config.max_pooled_capacity,
        )
    }

    /// Take a buffer from the pool, allocating if it is empty
    pub fn acquire(&self) -> PooledBuffer {
        let pooled = self.pool.lock().ok().and_then(|mut pool| pool.pop());
        let buffer = match pooled {
            Some(buffer) => {
                global_metrics().pool_hit();
                buffer
            }
            None => {
                global_metrics().pool_miss();
                Vec::with_capacity(self.initial_capacity)
            }
        };

        PooledBuffer {
            buffer,
            pool: Arc::clone(&self.pool),
            max_pooled_capacity: self.max_pooled_capacity,
        }
    }

    /// Number of idle buffers
    pub fn available(&self) -> usize {
        self.pool.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn max_pooled_capacity(&self) -> usize {
        self.max_pooled_capacity
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(32)
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            initial_capacity: self.initial_capacity,
            max_pooled_capacity: self.max_pooled_capacity,
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("available", &self.available())
            .field("initial_capacity", &self.initial_capacity)
            .field("max_pooled_capacity", &self.max_pooled_capacity)
            .finish()
    }
}
