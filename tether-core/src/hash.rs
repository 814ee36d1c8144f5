//! Fast, non-cryptographic hashing used for every placement decision.
//!
//! A single 32-bit FNV-1a hash drives key lookups, backend offsets and
//! backend skips so that every process computes identical tables from
//! identical inputs.

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a 32-bit hash over raw bytes.
#[inline]
pub fn fnv1a32(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in data {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hashes a string key and reduces it into `[0, modulus)`.
///
/// `modulus` must be non-zero.
#[inline]
pub fn slot_for(key: &str, modulus: usize) -> usize {
    (fnv1a32(key.as_bytes()) as usize) % modulus
}
