//! src/stream/last_block.rs
//! Final-block processing: padding, partial keystream blocks and unpadding.
//!
//! The engine only ever sees whole blocks. A tail of 1..15 bytes is staged in
//! an owned, zero-filled scratch block and the engine writes into an owned
//! staging block; only the true tail length is copied to the caller. The
//! caller's buffer is never handed to the engine for a partial block, so block
//! granular DMA cannot write past the intended output.

use tracing::debug;
use zeroize::Zeroize;

use crate::aliases::{zero_block, Block16};
use crate::consts::BLOCK_SIZE;
use crate::engine::{AesEngine, EngineCall};
use crate::error::CipherError;
use crate::stream::alignment::AlignmentPolicy;
use crate::stream::chunk::ChunkSplitter;
use crate::stream::context::CallState;
use crate::stream::padding::{pkcs7_pad, pkcs7_unpad};
use crate::utils::add_len;

/// Owns the scratch and staging blocks of one context.
pub struct LastBlockHandler {
    scratch: Block16,
    staging: Block16,
}

impl std::fmt::Debug for LastBlockHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastBlockHandler").finish_non_exhaustive()
    }
}

impl Default for LastBlockHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl LastBlockHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scratch: zero_block(),
            staging: zero_block(),
        }
    }

    /// Process the 0..15 byte tail left after the whole-block pass.
    ///
    /// `call` must already carry `is_last`. Encrypting a padded mode always
    /// emits one block, even for an empty tail. Returns the bytes made visible
    /// to the caller, never the zero-filled block length.
    pub fn finish_tail<E: AesEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        splitter: &ChunkSplitter,
        call: EngineCall,
        policy: &AlignmentPolicy,
        tail: &[u8],
        dst: &mut [u8],
        state: &mut CallState,
    ) -> Result<usize, CipherError> {
        let tail_len = tail.len();
        if tail_len >= BLOCK_SIZE {
            return Err(CipherError::BadState(format!(
                "last block handler reached with {tail_len} leftover bytes"
            )));
        }

        let scratch = self.scratch.expose_secret_mut();
        scratch.fill(0);
        scratch[..tail_len].copy_from_slice(tail);

        let written = if policy.add_padding {
            pkcs7_pad(scratch, tail_len)?;
            let end = add_len(state.dst_cursor, BLOCK_SIZE)?;
            if end > dst.len() || BLOCK_SIZE > state.output_budget {
                return Err(CipherError::BadLength("no room for the padded block".into()));
            }
            let out = &mut dst[state.dst_cursor..end];
            let produced = splitter.run(engine, call, &scratch[..], out)?;
            if produced != BLOCK_SIZE {
                return Err(CipherError::Engine("short write on padded block".into()));
            }
            debug!(pad = BLOCK_SIZE - tail_len, "padded final block");
            BLOCK_SIZE
        } else if tail_len == 0 {
            0
        } else if policy.is_stream_cipher {
            let end = add_len(state.dst_cursor, tail_len)?;
            if end > dst.len() || tail_len > state.output_budget {
                return Err(CipherError::BadLength("no room for the final partial block".into()));
            }
            let staging = self.staging.expose_secret_mut();
            let produced = splitter.run(engine, call, &scratch[..], &mut staging[..])?;
            if produced < tail_len {
                return Err(CipherError::Engine("short write on final partial block".into()));
            }
            dst[state.dst_cursor..end].copy_from_slice(&staging[..tail_len]);
            staging.zeroize();
            tail_len
        } else {
            return Err(CipherError::BadState(
                "unaligned tail for a block cipher without padding".into(),
            ));
        };

        scratch.zeroize();
        state.dst_cursor = add_len(state.dst_cursor, written)?;
        state.output_budget -= written;

        Ok(written)
    }

    /// Verify the padding of an already decrypted last block.
    ///
    /// Returns the pad length to subtract from the reported output.
    pub fn strip_padding(&mut self, last_block: &[u8]) -> Result<usize, CipherError> {
        if last_block.len() != BLOCK_SIZE {
            return Err(CipherError::BadState(format!(
                "unpad needs exactly one block, got {}",
                last_block.len()
            )));
        }
        let scratch = self.scratch.expose_secret_mut();
        scratch.copy_from_slice(last_block);
        let result = pkcs7_unpad(scratch);
        scratch.zeroize();
        result
    }
}
