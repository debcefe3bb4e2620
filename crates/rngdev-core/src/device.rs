//! The device context: registration, session accounting and the read
//! pipeline, constructed together at load and torn down together at unload.
//!
//! ```
//! use rngdev_core::{DeviceConfig, RandomDevice, SimulatedHost};
//!
//! let mut dev = RandomDevice::load(SimulatedHost::new(), &DeviceConfig::default()).unwrap();
//! let session = dev.open().unwrap();
//! let mut buf = [0u8; 4];
//! assert_eq!(session.read(4, &mut buf[..]).unwrap(), 4);
//! session.close();
//! dev.unload();
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::buffer::{BufferAllocator, HeapAllocator};
use crate::config::DeviceConfig;
use crate::error::{DeviceError, Result};
use crate::host::{DeviceNumber, Host};
use crate::pipeline::{Destination, ReadContract, ReadPipeline};
use crate::registry::{DeviceIdentity, DeviceRegistry};
use crate::session::SessionTracker;
use crate::source::{OsRandom, RandomByteSource};

/// Point-in-time view of a device's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub registered: bool,
    pub device: Option<DeviceNumber>,
    pub source: &'static str,
    pub read_contract: ReadContract,
    pub opens: u64,
    pub active_sessions: u64,
    pub reads: u64,
    pub bytes_served: u64,
    pub allocation_failures: u64,
    pub transfer_faults: u64,
    pub live_buffers: usize,
}

/// A loaded random-byte device.
pub struct RandomDevice<H: Host> {
    registry: DeviceRegistry<H>,
    sessions: SessionTracker,
    pipeline: ReadPipeline,
}

impl<H: Host> RandomDevice<H> {
    /// Register on `host` with the OS randomness source and a heap allocator
    /// capped at `config.max_read_len`.
    pub fn load(host: H, config: &DeviceConfig) -> Result<Self> {
        Self::with_parts(
            host,
            config,
            Arc::new(OsRandom),
            Arc::new(HeapAllocator::with_limit(config.max_read_len)),
        )
    }

    /// Register on `host` with caller-supplied source and allocator.
    pub fn with_parts(
        host: H,
        config: &DeviceConfig,
        source: Arc<dyn RandomByteSource>,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Result<Self> {
        log::info!("RNG: initializing the random number generator device");
        let mut registry = DeviceRegistry::new(host, config.names());
        registry.initialize()?;
        Ok(Self {
            registry,
            sessions: SessionTracker::new(),
            pipeline: ReadPipeline::new(source, allocator, config.read_contract),
        })
    }

    /// Registered identity; `None` after [`unload`](Self::unload).
    pub fn identity(&self) -> Option<&DeviceIdentity<H>> {
        self.registry.identity()
    }

    /// Open a session. Fails once the device has been unloaded.
    pub fn open(&self) -> Result<Session<'_, H>> {
        if !self.registry.is_registered() {
            log::warn!("RNG: open on an unregistered device");
            return Err(DeviceError::NotRegistered);
        }
        self.sessions.on_open();
        Ok(Session { device: self })
    }

    /// Tear the registration down. Requires that no session is alive, which
    /// the borrow on [`Session`] enforces. Safe to call more than once.
    pub fn unload(&mut self) {
        if self.registry.is_registered() {
            self.registry.teardown();
            log::info!("RNG: goodbye");
        }
    }

    /// Point-in-time snapshot of registration, session and read counters.
    pub fn stats(&self) -> DeviceStats {
        let reads = self.pipeline.counters();
        DeviceStats {
            registered: self.registry.is_registered(),
            device: self.registry.identity().map(|id| id.number()),
            source: self.pipeline.source_name(),
            read_contract: self.pipeline.contract(),
            opens: self.sessions.opens(),
            active_sessions: self.sessions.active(),
            reads: reads.reads,
            bytes_served: reads.bytes_served,
            allocation_failures: reads.allocation_failures,
            transfer_faults: reads.transfer_faults,
            live_buffers: self.pipeline.live_buffers(),
        }
    }
}

/// One open-to-close span of a caller's use of the device. Dropping it
/// closes it.
pub struct Session<'d, H: Host> {
    device: &'d RandomDevice<H>,
}

impl<H: Host> Session<'_, H> {
    /// Read `len` random bytes into `dest`.
    pub fn read<D: Destination + ?Sized>(&self, len: usize, dest: &mut D) -> Result<usize> {
        self.device.pipeline.read(len, dest)
    }

    /// Close explicitly; same as dropping the session.
    pub fn close(self) {}
}

impl<H: Host> Drop for Session<'_, H> {
    fn drop(&mut self) {
        self.device.sessions.on_close();
    }
}
