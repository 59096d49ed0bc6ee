//! # Secure-Gate Type Aliases
//!
//! Fixed-size buffers that hold key material or transient plaintext. All of them
//! are [`secure_gate::Fixed`] wrappers, so access goes through
//! `.expose_secret()` / `.expose_secret_mut()` and the intent is visible at
//! every use site.
//!
//! - [`Block16`] - one AES block (scratch and staging blocks of the last-block handler)
//! - [`Iv16`] - IV, initial counter or XTS tweak

use crate::consts::BLOCK_SIZE;

// ─────────────────────────────────────────────────────────────────────────────
// SpanBuffer: generic secure stack buffer (direct alias to secure-gate's Fixed)
// ─────────────────────────────────────────────────────────────────────────────
pub type SpanBuffer<const N: usize> = secure_gate::Fixed<[u8; N]>;

pub type Block16 = SpanBuffer<BLOCK_SIZE>; // one AES block
pub type Iv16 = SpanBuffer<16>;

/// A zeroed block, ready to be used as scratch space.
#[inline(always)]
pub fn zero_block() -> Block16 {
    Block16::new([0u8; BLOCK_SIZE])
}
