// ============================================================================
// FILE: src/utils.rs
// ============================================================================

//! Utility functions used across the library.

use crate::consts::BLOCK_SIZE;
use crate::error::CipherError;

/// XORs two 16-byte blocks and writes the result to `output`.
///
/// Used by the software engine for every chaining and keystream mode.
///
/// # Panics (by contract)
///
/// Panics if any of the three slices is shorter than 16 bytes. Callers only
/// pass block-sized chunks.
#[inline(always)]
pub const fn xor_blocks(block_a: &[u8], block_b: &[u8], output: &mut [u8]) {
    let mut i = 0;
    while i < BLOCK_SIZE {
        output[i] = block_a[i] ^ block_b[i];
        i += 1;
    }
}

/// XORs `keystream` into `data` in place, up to the shorter of the two.
#[inline(always)]
pub fn xor_in_place(data: &mut [u8], keystream: &[u8]) {
    for (d, k) in data.iter_mut().zip(keystream) {
        *d ^= k;
    }
}

/// Overflow-checked `usize` addition for byte counts.
#[inline(always)]
pub fn add_len(a: usize, b: usize) -> Result<usize, CipherError> {
    a.checked_add(b)
        .ok_or_else(|| CipherError::BadLength("byte count overflow".into()))
}

/// Overflow-checked `u64` addition for the running output counter.
#[inline(always)]
pub fn add_total(total: u64, produced: usize) -> Result<u64, CipherError> {
    u64::try_from(produced)
        .ok()
        .and_then(|p| total.checked_add(p))
        .ok_or_else(|| CipherError::BadLength("total output counter overflow".into()))
}

/// Rounds `len` down to a whole number of blocks.
#[inline(always)]
pub const fn block_floor(len: usize) -> usize {
    len & !(BLOCK_SIZE - 1)
}

/// Bytes past the last whole block.
#[inline(always)]
pub const fn block_remainder(len: usize) -> usize {
    len & (BLOCK_SIZE - 1)
}

/// Whether an engine with the given DMA alignment can write `len` bytes
/// straight into `dst`.
///
/// Both the start address and the length have to be aligned, otherwise cache
/// maintenance on the destination would touch neighbouring memory.
#[inline(always)]
pub fn is_dma_aligned(dst: &[u8], len: usize, alignment: usize) -> bool {
    if alignment <= 1 {
        return true;
    }
    (dst.as_ptr() as usize) % alignment == 0 && len % alignment == 0
}
