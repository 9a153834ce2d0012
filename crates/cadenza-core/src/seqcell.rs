//! Sequence-locked 64-bit cell.
//!
//! Stores an `i64` that a single writer updates and any number of readers
//! load without taking a lock. On 32-bit hardware a plain 64-bit load can
//! tear, so the value lives in two 32-bit atomics guarded by a version
//! counter: the writer bumps the version to an odd value, stores both
//! halves, then bumps it back to even; readers retry while the version is
//! odd or changes across the read.

use std::sync::atomic::{fence, AtomicU32, Ordering};

/// A 64-bit cell with lock-free readers and a single external writer.
///
/// Writes must be serialized by the caller (the pipeline performs them under
/// its state mutex). Concurrent writers would corrupt the version protocol.
#[derive(Debug)]
pub struct SeqCell {
    version: AtomicU32,
    lo: AtomicU32,
    hi: AtomicU32,
}

impl SeqCell {
    pub fn new(value: i64) -> Self {
        let bits = value as u64;
        Self {
            version: AtomicU32::new(0),
            lo: AtomicU32::new(bits as u32),
            hi: AtomicU32::new((bits >> 32) as u32),
        }
    }

    /// Stores a new value. Single writer only.
    pub fn store(&self, value: i64) {
        let bits = value as u64;
        let version = self.version.load(Ordering::Relaxed);
        self.version.store(version.wrapping_add(1), Ordering::Relaxed);
        // Keeps the odd version store ahead of the value stores.
        fence(Ordering::Release);
        self.lo.store(bits as u32, Ordering::Relaxed);
        self.hi.store((bits >> 32) as u32, Ordering::Relaxed);
        self.version.store(version.wrapping_add(2), Ordering::Release);
    }

    /// Loads the current value, retrying across concurrent writes.
    pub fn load(&self) -> i64 {
        loop {
            let before = self.version.load(Ordering::Acquire);
            if before & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }
            let lo = self.lo.load(Ordering::Relaxed);
            let hi = self.hi.load(Ordering::Relaxed);
            // Keeps the value loads ahead of the version revalidation.
            fence(Ordering::Acquire);
            let after = self.version.load(Ordering::Relaxed);
            if before == after {
                return (((hi as u64) << 32) | lo as u64) as i64;
            }
        }
    }
}
