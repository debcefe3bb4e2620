//! Random byte sources.
//!
//! The read pipeline only ever sees the [`RandomByteSource`] trait: a
//! capability that fills a buffer completely, never blocks and never fails.
//! [`OsRandom`] is the production source backed by the host CSPRNG;
//! [`SeededSource`] is deterministic and exists for tests and reproducible
//! probes.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Trait that every random byte source must implement.
pub trait RandomByteSource: Send + Sync {
    /// Fill `buf` completely with unpredictable bytes.
    fn fill(&self, buf: &mut [u8]);

    /// Short identifier used in log lines and reports.
    fn name(&self) -> &'static str;
}

/// The host's strong randomness facility (`getrandom(2)` and friends).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomByteSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }
        getrandom::fill(buf).expect("OS CSPRNG failed");
    }

    fn name(&self) -> &'static str {
        "os"
    }
}

/// Deterministic source seeded from a `u64`.
///
/// Not suitable for anything security-sensitive.
pub struct SeededSource {
    rng: Mutex<StdRng>,
}

impl SeededSource {
    /// Same seed, same byte stream.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomByteSource for SeededSource {
    fn fill(&self, buf: &mut [u8]) {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(buf);
    }

    fn name(&self) -> &'static str {
        "seeded"
    }
}
