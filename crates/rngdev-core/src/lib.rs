//! # rngdev-core
//!
//! Driver core for `randomness_generator`, a pseudo-device that returns
//! cryptographically strong random bytes to whoever opens and reads it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rngdev_core::{DeviceConfig, FsHost, RandomDevice};
//!
//! // Register the device under /tmp/rngdev (majors/, class/, dev/)
//! let device = RandomDevice::load(FsHost::new("/tmp/rngdev"), &DeviceConfig::default()).unwrap();
//!
//! // Read four random bytes through a session
//! let session = device.open().unwrap();
//! let mut buf = [0u8; 4];
//! session.read(buf.len(), &mut buf[..]).unwrap();
//! ```
//!
//! ## Architecture
//!
//! Host registration → Device context → Session → Read pipeline
//!
//! - [`DeviceRegistry`] claims a dynamic major, a class and a node from a
//!   [`Host`], rolling back in reverse order if any step fails.
//! - [`SessionTracker`] counts opens and closes with atomics.
//! - [`ReadPipeline`] allocates a [`TransferBuffer`], fills it from a
//!   [`RandomByteSource`], copies it to the caller's [`Destination`] and frees
//!   it on every path.
//! - [`RandomDevice`] is the context object that owns all three between load
//!   and unload.

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
#[cfg(unix)]
pub mod fs_host;
pub mod host;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod source;

pub use buffer::{BufferAllocator, DEFAULT_MAX_ALLOCATION, HeapAllocator, TransferBuffer};
pub use config::{DEFAULT_CLASS_NAME, DEFAULT_DEVICE_NAME, DeviceConfig};
pub use device::{DeviceStats, RandomDevice, Session};
pub use error::{DeviceError, RegistrationStage, Result};
#[cfg(unix)]
pub use fs_host::{DEFAULT_ROOT, FsHost};
pub use host::{DeviceNumber, Host, Inventory, SimulatedHost};
pub use pipeline::{Destination, ReadContract, ReadCounters, ReadPipeline, WriterDestination};
pub use registry::{DeviceIdentity, DeviceNames, DeviceRegistry, Registration};
pub use session::SessionTracker;
pub use source::{OsRandom, RandomByteSource, SeededSource};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
