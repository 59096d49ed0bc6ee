// src/engine/mod.rs

//! Collaborator boundary: the AES block engine and the AEAD tag module.
//!
//! The stream layer never performs AES itself. It drives an [`AesEngine`] one
//! piece at a time and tells an [`AeadTag`] which ciphertext bytes are real.

pub mod shared;
pub mod soft;

use crate::algorithm::{Algorithm, Direction};
use crate::error::CipherError;

/// Flags describing one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCall {
    pub algorithm: Algorithm,
    pub direction: Direction,
    /// First engine call of the whole logical operation.
    pub is_first: bool,
    /// Last engine call of the whole logical operation. The engine may
    /// finalize (tags, ciphertext stealing) only when this is set.
    pub is_last: bool,
}

impl EngineCall {
    #[must_use]
    pub const fn new(algorithm: Algorithm, direction: Direction) -> Self {
        Self {
            algorithm,
            direction,
            is_first: false,
            is_last: false,
        }
    }

    #[must_use]
    pub const fn first(mut self, is_first: bool) -> Self {
        self.is_first = is_first;
        self
    }

    #[must_use]
    pub const fn last(mut self, is_last: bool) -> Self {
        self.is_last = is_last;
        self
    }
}

/// An AES engine: hardware dispatch or a software fallback.
///
/// The engine owns its key context and whatever chaining state the mode needs
/// (IV, counter, tweak); it must carry that state across consecutive calls.
pub trait AesEngine {
    /// Transform `src` into `dst` in a single invocation, returning the number of
    /// bytes written. `src.len()` never exceeds the context's chunk ceiling.
    fn transform(
        &mut self,
        call: &EngineCall,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, CipherError>;

    /// Transform `src` with the result landing in an engine key slot instead of
    /// memory. Returns the number of bytes consumed.
    fn derive_into_keyslot(&mut self, call: &EngineCall, src: &[u8]) -> Result<usize, CipherError> {
        let _ = (call, src);
        Err(CipherError::NotSupported(
            "engine cannot route output to a key slot".into(),
        ))
    }

    /// Whether `buf` is physically contiguous. Only consulted by the async gate.
    fn is_contiguous_memory(&self, buf: &[u8]) -> bool {
        let _ = buf;
        true
    }

    /// Required alignment of destination buffers written by DMA. `1` means any.
    fn dma_alignment(&self) -> usize {
        1
    }
}

impl<E: AesEngine + ?Sized> AesEngine for &mut E {
    fn transform(
        &mut self,
        call: &EngineCall,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, CipherError> {
        (**self).transform(call, src, dst)
    }

    fn derive_into_keyslot(&mut self, call: &EngineCall, src: &[u8]) -> Result<usize, CipherError> {
        (**self).derive_into_keyslot(call, src)
    }

    fn is_contiguous_memory(&self, buf: &[u8]) -> bool {
        (**self).is_contiguous_memory(buf)
    }

    fn dma_alignment(&self) -> usize {
        (**self).dma_alignment()
    }
}

impl<E: AesEngine + ?Sized> AesEngine for Box<E> {
    fn transform(
        &mut self,
        call: &EngineCall,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, CipherError> {
        (**self).transform(call, src, dst)
    }

    fn derive_into_keyslot(&mut self, call: &EngineCall, src: &[u8]) -> Result<usize, CipherError> {
        (**self).derive_into_keyslot(call, src)
    }

    fn is_contiguous_memory(&self, buf: &[u8]) -> bool {
        (**self).is_contiguous_memory(buf)
    }

    fn dma_alignment(&self) -> usize {
        (**self).dma_alignment()
    }
}

/// GHASH / tag module for GCM-class modes.
pub trait AeadTag {
    /// Absorb ciphertext bytes, in order. Only bytes visible to the caller are
    /// passed, never the zero fill of a partial last block.
    fn update(&mut self, ciphertext: &[u8]) -> Result<(), CipherError>;

    /// Called exactly once, after all ciphertext has been accounted for.
    fn finalize(&mut self) -> Result<(), CipherError>;
}
