//! Per-read transfer buffers and the allocators that hand them out.
//!
//! Every buffer carries a lease on its allocator's live counter, released in
//! `Drop`, so the number of buffers still alive is observable at any time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{DeviceError, Result};

/// Largest single allocation the default allocator will attempt (4 MiB,
/// the usual `KMALLOC_MAX_SIZE` with 4 KiB pages).
pub const DEFAULT_MAX_ALLOCATION: usize = 4 * 1024 * 1024;

/// Scratch buffer owned by exactly one in-flight read.
pub struct TransferBuffer {
    bytes: Vec<u8>,
    live: Arc<AtomicUsize>,
}

impl TransferBuffer {
    fn new(bytes: Vec<u8>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self { bytes, live }
    }

    /// Bytes in the buffer, fixed at allocation.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for the buffer of a zero-length read.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Filled contents, ready to copy out.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Writable view handed to the random source.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for TransferBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for TransferBuffer {
    // Contents are never printed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Fallible source of transfer buffers.
pub trait BufferAllocator: Send + Sync {
    /// Allocate a zeroed buffer of exactly `len` bytes.
    fn allocate(&self, len: usize) -> Result<TransferBuffer>;

    /// Number of buffers from this allocator that have not been dropped yet.
    fn live_buffers(&self) -> usize;
}

/// Heap allocator with a per-allocation ceiling.
///
/// Requests above the ceiling, and requests the global allocator refuses,
/// fail with [`DeviceError::Allocation`] instead of aborting the process.
#[derive(Debug, Clone)]
pub struct HeapAllocator {
    max_allocation: usize,
    live: Arc<AtomicUsize>,
}

impl HeapAllocator {
    /// Allocator capped at [`DEFAULT_MAX_ALLOCATION`].
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_ALLOCATION)
    }

    /// Allocator that refuses requests larger than `max_allocation` bytes.
    pub fn with_limit(max_allocation: usize) -> Self {
        Self {
            max_allocation,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, len: usize) -> Result<TransferBuffer> {
        if len > self.max_allocation {
            return Err(DeviceError::Allocation { requested: len });
        }
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| DeviceError::Allocation { requested: len })?;
        bytes.resize(len, 0);
        Ok(TransferBuffer::new(bytes, Arc::clone(&self.live)))
    }

    fn live_buffers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_exact_length() {
        let alloc = HeapAllocator::new();
        for len in [0, 1, 4, 4096] {
            let buf = alloc.allocate(len).unwrap();
            assert_eq!(buf.len(), len);
            assert!(buf.as_slice().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_zero_length_buffer_is_empty() {
        let alloc = HeapAllocator::new();
        let buf = alloc.allocate(0).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_live_count_tracks_drops() {
        let alloc = HeapAllocator::new();
        let a = alloc.allocate(8).unwrap();
        let b = alloc.allocate(8).unwrap();
        assert_eq!(alloc.live_buffers(), 2);
        drop(a);
        assert_eq!(alloc.live_buffers(), 1);
        drop(b);
        assert_eq!(alloc.live_buffers(), 0);
    }

    #[test]
    fn test_over_limit_fails_without_lease() {
        let alloc = HeapAllocator::with_limit(16);
        let err = alloc.allocate(17).unwrap_err();
        assert_eq!(err, DeviceError::Allocation { requested: 17 });
        assert_eq!(alloc.live_buffers(), 0);
        assert!(alloc.allocate(16).is_ok());
    }

    #[test]
    fn test_huge_request_fails_gracefully() {
        let alloc = HeapAllocator::with_limit(usize::MAX);
        let err = alloc.allocate(usize::MAX).unwrap_err();
        assert_eq!(err, DeviceError::Allocation { requested: usize::MAX });
        assert_eq!(alloc.live_buffers(), 0);
    }

    #[test]
    fn test_clones_share_live_counter() {
        let alloc = HeapAllocator::new();
        let other = alloc.clone();
        let _buf = other.allocate(4).unwrap();
        assert_eq!(alloc.live_buffers(), 1);
    }

    #[test]
    fn test_debug_hides_contents() {
        let alloc = HeapAllocator::new();
        let mut buf = alloc.allocate(2).unwrap();
        buf.as_mut_slice().copy_from_slice(&[0xAB, 0xCD]);
        let dbg = format!("{buf:?}");
        assert_eq!(dbg, "TransferBuffer { len: 2 }");
    }
}
