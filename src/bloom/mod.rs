//! # Bloom Filter Module
//!
//! A space-efficient probabilistic set used to prune SSTable lookups.
//!
//! A bloom filter answers "is this key in the set?" with **no false
//! negatives** but a tunable false-positive rate. Every SSTable embeds
//! one, built over all of its keys at write time; a point lookup that
//! the filter rejects skips the table without touching its data block.
//!
//! ## Hashing scheme
//!
//! Double hashing over two 64-bit FNV-1a values:
//!
//! - `h1` = FNV-1a over the key bytes.
//! - `h2` = FNV-1a over the key bytes followed by a single `0xFF`
//!   byte, forced odd so it stays coprime with the bit count.
//! - bit `i` = `(h1 + i·h2) mod m` for `i` in `0..k`.
//!
//! ## On-disk format
//!
//! ```text
//! [num_bits m: u64 LE][num_hashes k: u32 LE][bitset: ceil(m/8) bytes, LSB-first]
//! ```


use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Upper bound on the bit count — keeps a degenerate `(n, p)` pair from
/// allocating unbounded memory.
const MAX_BITS: u64 = 1_000_000_000;

/// Upper bound on the hash count.
const MAX_HASHES: u32 = 100;

/// Fallback false-positive rate for out-of-range inputs.
const DEFAULT_FP_RATE: f64 = 0.01;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`BloomFilter`] operations.
#[derive(Debug, Error)]
pub enum BloomError {
    /// Two filters with different dimensions cannot be merged.
    #[error("incompatible filters: ({m1} bits, {k1} hashes) vs ({m2} bits, {k2} hashes)")]
    IncompatibleFilters { m1: u64, k1: u32, m2: u64, k2: u32 },

    /// A marshaled filter buffer is truncated or self-inconsistent.
    #[error("invalid bloom filter encoding: {0}")]
    InvalidFormat(String),
}

// ------------------------------------------------------------------------------------------------
// BloomFilter
// ------------------------------------------------------------------------------------------------

/// A bloom filter backed by a packed bit vector with `k` derived hash
/// positions per key.
pub struct BloomFilter {
    /// Packed bit vector, LSB-first within each byte.
    bits: Vec<u8>,

    /// Number of addressable bits (`m`).
    num_bits: u64,

    /// Number of hash probes per key (`k`).
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` insertions at the
    /// given target `fp_rate`.
    ///
    /// Out-of-range inputs are clamped rather than rejected:
    /// `expected_items == 0` behaves as 1, an `fp_rate` outside `(0, 1)`
    /// falls back to 0.01, and the derived bit count and hash count are
    /// clamped into `[1, 10^9]` and `[1, 100]` respectively.
    pub fn new(expected_items: usize, fp_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = if fp_rate > 0.0 && fp_rate < 1.0 {
            fp_rate
        } else {
            DEFAULT_FP_RATE
        };

        // m = ceil(-n * ln(p) / ln(2)^2), k = ceil((m/n) * ln(2))
        let ln2 = std::f64::consts::LN_2;
        let m = (-n * p.ln() / (ln2 * ln2)).ceil() as u64;
        let m = m.clamp(1, MAX_BITS);

        let k = ((m as f64 / n) * ln2).ceil() as u32;
        let k = k.clamp(1, MAX_HASHES);

        Self {
            bits: vec![0u8; m.div_ceil(8) as usize],
            num_bits: m,
            num_hashes: k,
        }
    }

    /// Returns the number of bits in the filter.
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Returns the number of hash probes per key.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Inserts a key.
    pub fn add(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = bit_index(h1, h2, i, self.num_bits);
            self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
        }
    }

    /// Returns `true` if the key **might** have been added, `false` if
    /// it definitely was not.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = bit_index(h1, h2, i, self.num_bits);
            if self.bits[(idx / 8) as usize] >> (idx % 8) & 1 == 0 {
                return false;
            }
        }
        true
    }

    /// Merges `other` into `self` by bitwise OR.
    ///
    /// Both filters must have identical dimensions `(m, k)`; a merged
    /// filter answers `may_contain` for the union of both key sets.
    pub fn merge(&mut self, other: &BloomFilter) -> Result<(), BloomError> {
        if self.num_bits != other.num_bits || self.num_hashes != other.num_hashes {
            return Err(BloomError::IncompatibleFilters {
                m1: self.num_bits,
                k1: self.num_hashes,
                m2: other.num_bits,
                k2: other.num_hashes,
            });
        }
        for (dst, src) in self.bits.iter_mut().zip(other.bits.iter()) {
            *dst |= src;
        }
        Ok(())
    }

    /// Serialized size in bytes: `8 + 4 + ceil(m/8)`.
    pub fn marshaled_len(&self) -> usize {
        8 + 4 + self.bits.len()
    }

    /// Serializes the filter into `[m: u64][k: u32][bitset]`.
    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.marshaled_len());
        buf.extend_from_slice(&self.num_bits.to_le_bytes());
        buf.extend_from_slice(&self.num_hashes.to_le_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Deserializes a filter previously produced by [`marshal`](Self::marshal).
    pub fn unmarshal(buf: &[u8]) -> Result<Self, BloomError> {
        if buf.len() < 12 {
            return Err(BloomError::InvalidFormat(format!(
                "buffer too short: {} bytes",
                buf.len()
            )));
        }

        let num_bits = u64::from_le_bytes(buf[0..8].try_into().expect("8-byte slice"));
        let num_hashes = u32::from_le_bytes(buf[8..12].try_into().expect("4-byte slice"));

        if num_bits == 0 || num_bits > MAX_BITS {
            return Err(BloomError::InvalidFormat(format!(
                "bit count {num_bits} out of range"
            )));
        }
        if num_hashes == 0 || num_hashes > MAX_HASHES {
            return Err(BloomError::InvalidFormat(format!(
                "hash count {num_hashes} out of range"
            )));
        }

        let byte_len = num_bits.div_ceil(8) as usize;
        if buf.len() - 12 != byte_len {
            return Err(BloomError::InvalidFormat(format!(
                "bitset length {} does not match {} bits",
                buf.len() - 12,
                num_bits
            )));
        }

        Ok(Self {
            bits: buf[12..].to_vec(),
            num_bits,
            num_hashes,
        })
    }

    /// An empty filter that cannot exclude anything: `may_contain`
    /// always returns `true`. Used for legacy tables written without a
    /// bloom block.
    pub fn pass_all() -> Self {
        Self {
            bits: vec![0xFF],
            num_bits: 8,
            num_hashes: 1,
        }
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

// ------------------------------------------------------------------------------------------------
// Hashing
// ------------------------------------------------------------------------------------------------

/// FNV-1a step over a single byte.
#[inline]
fn fnv1a_step(hash: u64, byte: u8) -> u64 {
    (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
}

/// Computes the two double-hashing bases for a key.
///
/// `h2` continues the FNV-1a stream with a trailing `0xFF` byte and is
/// forced odd so that the probe sequence `(h1 + i·h2) mod m` cycles
/// through distinct positions.
#[inline]
fn hash_pair(key: &[u8]) -> (u64, u64) {
    let mut h1 = FNV_OFFSET_BASIS;
    for &byte in key {
        h1 = fnv1a_step(h1, byte);
    }
    let h2 = fnv1a_step(h1, 0xFF) | 1;
    (h1, h2)
}

/// Double hashing: probe `i` addresses bit `(h1 + i·h2) mod m`.
#[inline]
fn bit_index(h1: u64, h2: u64, i: u32, m: u64) -> u64 {
    h1.wrapping_add((i as u64).wrapping_mul(h2)) % m
}
