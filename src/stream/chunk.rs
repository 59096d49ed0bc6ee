//! src/stream/chunk.rs
//! Splits a byte range into engine-sized pieces.

use tracing::{error, trace};

use crate::consts::{BLOCK_SIZE, MAX_ENGINE_CHUNK};
use crate::engine::{AesEngine, EngineCall};
use crate::error::CipherError;
use crate::utils::add_len;

/// Drives the engine over `src` in pieces no larger than `max_chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSplitter {
    max_chunk: usize,
}

impl Default for ChunkSplitter {
    fn default() -> Self {
        Self {
            max_chunk: MAX_ENGINE_CHUNK,
        }
    }
}

impl ChunkSplitter {
    /// `max_chunk` must be a non-zero multiple of [`BLOCK_SIZE`].
    pub fn new(max_chunk: usize) -> Result<Self, CipherError> {
        if max_chunk == 0 || max_chunk % BLOCK_SIZE != 0 {
            return Err(CipherError::InvalidArgs(format!(
                "engine chunk ceiling must be a non-zero multiple of {BLOCK_SIZE}, got {max_chunk}"
            )));
        }
        Ok(Self { max_chunk })
    }

    #[must_use]
    pub const fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    /// Length of the next piece when `left` bytes remain.
    ///
    /// A trailing partial block never travels alone: the piece before it gives
    /// up its last block so ciphertext stealing sees both in one call.
    #[must_use]
    pub fn piece_len(&self, left: usize) -> usize {
        let take = left.min(self.max_chunk);
        let after = left - take;
        if after > 0 && after < BLOCK_SIZE && take > BLOCK_SIZE {
            take - BLOCK_SIZE
        } else {
            take
        }
    }

    /// Transform all of `src` into `dst`, returning the bytes written.
    ///
    /// Only the last piece inherits `call.is_last`, and only the first inherits
    /// `call.is_first`: the engine must not finalize mid-stream.
    pub fn run<E: AesEngine + ?Sized>(
        &self,
        engine: &mut E,
        call: EngineCall,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, CipherError> {
        let mut consumed = 0usize;
        let mut produced = 0usize;

        while consumed < src.len() {
            let len = self.piece_len(src.len() - consumed);
            let piece = &src[consumed..consumed + len];
            let piece_call = call
                .first(call.is_first && consumed == 0)
                .last(call.is_last && consumed + len == src.len());

            let end = add_len(produced, len)?;
            if end > dst.len() {
                return Err(CipherError::BadLength(format!(
                    "output buffer too small: need {end}, have {}",
                    dst.len()
                )));
            }

            trace!(
                len,
                is_first = piece_call.is_first,
                is_last = piece_call.is_last,
                "engine piece"
            );
            let written = engine
                .transform(&piece_call, piece, &mut dst[produced..end])
                .map_err(|e| {
                    error!(algorithm = %call.algorithm, error = %e, "engine transform failed");
                    e
                })?;
            if written > len {
                return Err(CipherError::Engine(format!(
                    "engine reported {written} bytes for a {len} byte piece"
                )));
            }
            produced = add_len(produced, written)?;
            consumed += len;
        }

        Ok(produced)
    }

    /// Push all of `src` into an engine key slot; nothing reaches memory.
    pub fn run_to_keyslot<E: AesEngine + ?Sized>(
        &self,
        engine: &mut E,
        call: EngineCall,
        src: &[u8],
    ) -> Result<usize, CipherError> {
        let mut consumed = 0usize;

        while consumed < src.len() {
            let len = self.piece_len(src.len() - consumed);
            let end = consumed + len;
            let piece_call = call
                .first(call.is_first && consumed == 0)
                .last(call.is_last && end == src.len());

            trace!(len, is_last = piece_call.is_last, "keyslot piece");
            engine.derive_into_keyslot(&piece_call, &src[consumed..end])?;
            consumed = end;
        }

        Ok(consumed)
    }
}
