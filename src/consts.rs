//! # Constants
//!
//! Configuration the stream layer depends on. None of these change behavior at
//! runtime; the builder can only lower the engine chunk ceiling.

/// AES block size in bytes.
///
/// Must stay a power of two: remainder arithmetic on padded lengths relies on it.
pub const BLOCK_SIZE: usize = 16;

/// Platform cache line size. The gather buffer is aligned to and sized in
/// multiples of this so engine DMA never shares a line with foreign data.
pub const CACHE_LINE_SIZE: usize = 64;

/// Capacity of the per-context gather buffer (four AES blocks).
pub const GATHER_BUFFER_CAPACITY: usize = 64;

/// Largest byte range a single engine invocation may process (16 MiB DMA ceiling).
pub const MAX_ENGINE_CHUNK: usize = 16 * 1024 * 1024;

/// GCM nonce length accepted by the software engine (96-bit IV).
pub const GCM_IV_SIZE: usize = 12;

/// Size of a PKCS#7 pad byte range, i.e. the largest legal pad value.
pub const MAX_PAD_LEN: u8 = BLOCK_SIZE as u8;

const _: () = assert!(BLOCK_SIZE.is_power_of_two());
const _: () = assert!(GATHER_BUFFER_CAPACITY >= 2 * BLOCK_SIZE);
const _: () = assert!(GATHER_BUFFER_CAPACITY % BLOCK_SIZE == 0);
const _: () = assert!(GATHER_BUFFER_CAPACITY % CACHE_LINE_SIZE == 0);
const _: () = assert!(MAX_ENGINE_CHUNK % BLOCK_SIZE == 0);
