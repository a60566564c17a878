//! Deterministic state hashing for drift detection.
//!
//! A thin wrapper over streaming xxHash32 with seed 0. Two peers with equal
//! synchronized state produce equal 32-bit digests; a mismatch after the
//! same tick is drift. Update order is significant -- every caller must
//! feed fields in a documented, deterministic order.

use xxhash_rust::xxh32::Xxh32;

/// Seed for every state hash in the engine. Changing it invalidates all
/// recorded hashes and cross-peer comparisons.
pub const STATE_HASH_SEED: u32 = 0;

/// Incremental hasher over little-endian encodings.
pub struct StateHasher {
    inner: Xxh32,
}

impl StateHasher {
    pub fn new() -> Self {
        Self {
            inner: Xxh32::new(STATE_HASH_SEED),
        }
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.inner.update(&[value]);
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.inner.update(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.inner.update(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.inner.update(&value.to_le_bytes());
    }

    /// Final 32-bit digest.
    pub fn finish(&self) -> u32 {
        self.inner.digest()
    }
}

impl Default for StateHasher {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
