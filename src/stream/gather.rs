//! src/stream/gather.rs
//! Fixed-capacity accumulator for bytes carried between `update()` calls.
//!
//! The buffer is cache-line aligned so the engine may DMA straight out of it.
//! A second aligned buffer of the same size stages output whenever the
//! caller's destination is not suitably aligned for the engine.

use tracing::trace;
use zeroize::Zeroize;

use crate::consts::{BLOCK_SIZE, CACHE_LINE_SIZE, GATHER_BUFFER_CAPACITY};
use crate::engine::{AesEngine, EngineCall};
use crate::error::CipherError;
use crate::stream::chunk::ChunkSplitter;
use crate::stream::context::CallState;
use crate::utils::{add_len, block_remainder, is_dma_aligned};

#[repr(C, align(64))]
struct AlignedBlocks([u8; GATHER_BUFFER_CAPACITY]);

const _: () = assert!(core::mem::align_of::<AlignedBlocks>() == CACHE_LINE_SIZE);

impl AlignedBlocks {
    const fn zeroed() -> Self {
        Self([0u8; GATHER_BUFFER_CAPACITY])
    }
}

impl Drop for AlignedBlocks {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Gather buffer with `used` bytes pending.
///
/// Invariant between calls: `used < GATHER_BUFFER_CAPACITY`.
pub struct GatherBuffer {
    data: AlignedBlocks,
    staging: AlignedBlocks,
    used: usize,
}

impl std::fmt::Debug for GatherBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatherBuffer")
            .field("used", &self.used)
            .field("capacity", &GATHER_BUFFER_CAPACITY)
            .finish()
    }
}

impl Default for GatherBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl GatherBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: AlignedBlocks::zeroed(),
            staging: AlignedBlocks::zeroed(),
            used: 0,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        GATHER_BUFFER_CAPACITY
    }

    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.used == GATHER_BUFFER_CAPACITY
    }

    /// Bytes currently pending.
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        &self.data.0[..self.used]
    }

    /// Copy as much of the remaining input as fits, advancing the call cursors.
    /// Returns the number of bytes taken.
    pub fn absorb(&mut self, src: &[u8], state: &mut CallState) -> usize {
        let room = GATHER_BUFFER_CAPACITY - self.used;
        let take = room.min(state.bytes_remaining_in);
        if take == 0 {
            return 0;
        }

        let from = state.src_cursor;
        self.data.0[self.used..self.used + take].copy_from_slice(&src[from..from + take]);
        self.used += take;
        state.src_cursor += take;
        state.bytes_remaining_in -= take;
        take
    }

    /// How many bytes a full buffer releases to the engine.
    ///
    /// With more input behind it, everything goes. Without, a padded stream
    /// keeps its last block back so do-final can decide whether to pad it.
    #[must_use]
    pub const fn full_flush_len(more_input: bool, hold_back: bool) -> usize {
        if more_input || !hold_back {
            GATHER_BUFFER_CAPACITY
        } else {
            GATHER_BUFFER_CAPACITY - BLOCK_SIZE
        }
    }

    /// Flush if the buffer reached capacity. Returns the bytes written to `dst`.
    pub fn flush_if_full<E: AesEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        splitter: &ChunkSplitter,
        call: EngineCall,
        hold_back: bool,
        dst: &mut [u8],
        state: &mut CallState,
    ) -> Result<usize, CipherError> {
        if !self.is_full() {
            return Ok(0);
        }
        let len = Self::full_flush_len(state.bytes_remaining_in > 0, hold_back);
        self.flush(engine, splitter, call, len, dst, state)
    }

    /// Run the first `len` pending bytes through the engine into
    /// `dst[state.dst_cursor..]` and shift whatever is left to the front.
    pub fn flush<E: AesEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        splitter: &ChunkSplitter,
        call: EngineCall,
        len: usize,
        dst: &mut [u8],
        state: &mut CallState,
    ) -> Result<usize, CipherError> {
        if len > self.used || block_remainder(len) != 0 {
            return Err(CipherError::BadState(format!(
                "gather flush of {len} bytes with {} pending",
                self.used
            )));
        }
        if len == 0 {
            return Ok(0);
        }

        let end = add_len(state.dst_cursor, len)?;
        if end > dst.len() || len > state.output_budget {
            return Err(CipherError::BadLength(
                "output buffer too small for gathered data".into(),
            ));
        }
        let out = &mut dst[state.dst_cursor..end];

        let produced = if is_dma_aligned(out, len, engine.dma_alignment()) {
            splitter.run(engine, call, &self.data.0[..len], out)?
        } else {
            trace!(len, "destination unaligned for engine, staging output");
            let n = splitter.run(engine, call, &self.data.0[..len], &mut self.staging.0[..len])?;
            out[..n].copy_from_slice(&self.staging.0[..n]);
            self.staging.0[..n].zeroize();
            n
        };

        self.data.0.copy_within(len..self.used, 0);
        self.used -= len;
        self.data.0[self.used..].zeroize();

        state.dst_cursor = add_len(state.dst_cursor, produced)?;
        state.output_budget -= produced;
        Ok(produced)
    }

    /// Drop all pending bytes.
    pub fn clear(&mut self) {
        self.data.0[..self.used].zeroize();
        self.used = 0;
    }
}
