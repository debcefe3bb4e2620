//! The per-read pipeline: allocate → fill → copy out → free.
//!
//! One [`ReadPipeline`] is shared by every session of a device. Each call to
//! [`ReadPipeline::read`] owns a private [`TransferBuffer`](crate::buffer::TransferBuffer),
//! and that buffer is dropped before the outcome is reported, whichever way
//! the read ends.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::buffer::BufferAllocator;
use crate::error::{DeviceError, Result};
use crate::source::RandomByteSource;

// ---------------------------------------------------------------------------
// Destinations
// ---------------------------------------------------------------------------

/// Caller-side memory a read copies into, across the privilege boundary.
pub trait Destination {
    /// Copy all of `bytes` out. Any error is reported as a transfer fault.
    fn copy_out(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

/// A caller slice. Fewer bytes than requested means part of the requested
/// range is not addressable, which faults.
impl Destination for [u8] {
    fn copy_out(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if self.len() < bytes.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "destination holds {} bytes, {} requested",
                    self.len(),
                    bytes.len()
                ),
            ));
        }
        self[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Any `io::Write` sink (FIFO, pipe, stdout).
pub struct WriterDestination<W: Write>(pub W);

impl<W: Write> WriterDestination<W> {
    /// Give the wrapped writer back.
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: Write> Destination for WriterDestination<W> {
    fn copy_out(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.0.write_all(bytes)?;
        self.0.flush()
    }
}

// ---------------------------------------------------------------------------
// Read contract
// ---------------------------------------------------------------------------

/// What a successful read reports back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadContract {
    /// Report the number of bytes delivered.
    #[default]
    ByteCount,
    /// Deliver the bytes but report 0, as the first version of this driver
    /// did. Stream readers see end-of-file and must inspect their buffer.
    LegacyZero,
}

impl ReadContract {
    /// Value reported for a read that delivered `delivered` bytes.
    pub fn reported(self, delivered: usize) -> usize {
        match self {
            Self::ByteCount => delivered,
            Self::LegacyZero => 0,
        }
    }
}

impl std::fmt::Display for ReadContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ByteCount => write!(f, "byte_count"),
            Self::LegacyZero => write!(f, "legacy_zero"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Counters accumulated by a pipeline over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadCounters {
    pub reads: u64,
    pub bytes_served: u64,
    pub allocation_failures: u64,
    pub transfer_faults: u64,
}

/// Allocate, fill and hand out random bytes for one read at a time.
pub struct ReadPipeline {
    source: Arc<dyn RandomByteSource>,
    allocator: Arc<dyn BufferAllocator>,
    contract: ReadContract,
    reads: AtomicU64,
    bytes_served: AtomicU64,
    allocation_failures: AtomicU64,
    transfer_faults: AtomicU64,
}

impl ReadPipeline {
    /// Pipeline drawing from `source`, buffering through `allocator`, and
    /// reporting success per `contract`.
    pub fn new(
        source: Arc<dyn RandomByteSource>,
        allocator: Arc<dyn BufferAllocator>,
        contract: ReadContract,
    ) -> Self {
        Self {
            source,
            allocator,
            contract,
            reads: AtomicU64::new(0),
            bytes_served: AtomicU64::new(0),
            allocation_failures: AtomicU64::new(0),
            transfer_faults: AtomicU64::new(0),
        }
    }

    /// Success-value contract in force.
    pub fn contract(&self) -> ReadContract {
        self.contract
    }

    /// Name of the random source, as reported in stats.
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Buffers handed out by this pipeline's allocator and not yet freed.
    pub fn live_buffers(&self) -> usize {
        self.allocator.live_buffers()
    }

    /// Serve one read of `requested` bytes into `dest`.
    ///
    /// Returns the count dictated by the [`ReadContract`]. On error nothing
    /// is reported as transferred.
    pub fn read<D: Destination + ?Sized>(&self, requested: usize, dest: &mut D) -> Result<usize> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let mut buffer = match self.allocator.allocate(requested) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.allocation_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("RNG: failed to allocate {requested} bytes for a read");
                return Err(e);
            }
        };

        self.source.fill(buffer.as_mut_slice());
        let copied = dest.copy_out(buffer.as_slice());
        drop(buffer);

        match copied {
            Ok(()) => {
                self.bytes_served
                    .fetch_add(requested as u64, Ordering::Relaxed);
                log::debug!("RNG: sent {requested} random bytes to the user");
                Ok(self.contract.reported(requested))
            }
            Err(e) => {
                self.transfer_faults.fetch_add(1, Ordering::Relaxed);
                log::warn!("RNG: failed to send random bytes to the user: {e}");
                Err(DeviceError::TransferFault { requested })
            }
        }
    }

    /// Snapshot of the read counters.
    pub fn counters(&self) -> ReadCounters {
        ReadCounters {
            reads: self.reads.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
            allocation_failures: self.allocation_failures.load(Ordering::Relaxed),
            transfer_faults: self.transfer_faults.load(Ordering::Relaxed),
        }
    }
}
