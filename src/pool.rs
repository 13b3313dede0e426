//! Injectable buffer allocation strategy.
//!
//! Overflow buffers for oversized frames are obtained from a
//! [`BufferSource`] so the reassembly logic never names an allocator. The
//! default [`HeapBuffers`] source allocates and frees on demand;
//! [`RecycledBuffers`] keeps released storage on a channel and hands it out
//! again. Either way a [`LeasedBuffer`] releases its storage in `Drop`, so
//! release is structural and happens on every exit path.

use std::{
    ops::{Deref, DerefMut},
    sync::{Mutex, mpsc},
};

/// Allocation strategy for overflow buffers.
pub trait BufferSource: Send + Sync + 'static {
    /// Obtain a zeroed buffer of exactly `capacity` bytes.
    fn acquire(&self, capacity: usize) -> LeasedBuffer;
}

/// A buffer on loan from a [`BufferSource`].
///
/// Dereferences to `capacity` bytes of storage. Dropping the lease returns
/// the storage to its source.
pub struct LeasedBuffer {
    storage: Option<Vec<u8>>,
    reclaim: Option<mpsc::Sender<Vec<u8>>>,
}

impl LeasedBuffer {
    fn new(storage: Vec<u8>, reclaim: Option<mpsc::Sender<Vec<u8>>>) -> Self {
        Self {
            storage: Some(storage),
            reclaim,
        }
    }
}

impl Deref for LeasedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.storage.as_deref().unwrap_or_default()
    }
}

impl DerefMut for LeasedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.storage.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for LeasedBuffer {
    fn drop(&mut self) {
        if let (Some(storage), Some(reclaim)) = (self.storage.take(), self.reclaim.as_ref()) {
            // A closed channel means the pool is gone; the storage just drops.
            let _ = reclaim.send(storage);
        }
    }
}

/// Plain heap allocation; released storage is freed immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapBuffers;

impl BufferSource for HeapBuffers {
    fn acquire(&self, capacity: usize) -> LeasedBuffer {
        LeasedBuffer::new(vec![0; capacity], None)
    }
}

/// Channel-backed recycling pool.
///
/// Released buffers queue up for reuse; a lease whose recycled storage is
/// too small is grown before being handed out.
pub struct RecycledBuffers {
    reclaim: mpsc::Sender<Vec<u8>>,
    idle: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl RecycledBuffers {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        let (reclaim, idle) = mpsc::channel();
        Self {
            reclaim,
            idle: Mutex::new(idle),
        }
    }

    /// Number of buffers currently idle in the pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool mutex is poisoned.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        let idle = self.idle.lock().expect("buffer pool mutex poisoned");
        let mut drained = Vec::new();
        while let Ok(buffer) = idle.try_recv() {
            drained.push(buffer);
        }
        let count = drained.len();
        for buffer in drained {
            let _ = self.reclaim.send(buffer);
        }
        count
    }
}

impl Default for RecycledBuffers {
    fn default() -> Self { Self::new() }
}

impl BufferSource for RecycledBuffers {
    fn acquire(&self, capacity: usize) -> LeasedBuffer {
        let recycled = self
            .idle
            .lock()
            .ok()
            .and_then(|idle| idle.try_recv().ok());
        let mut storage = recycled.unwrap_or_default();
        storage.clear();
        storage.resize(capacity, 0);
        LeasedBuffer::new(storage, Some(self.reclaim.clone()))
    }
}
