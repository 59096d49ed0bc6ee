//! src/builders/context_builder.rs
//! Fluent configuration for a cipher context.

use tracing::debug;

use crate::algorithm::{Algorithm, Direction, Padding};
use crate::consts::{BLOCK_SIZE, MAX_ENGINE_CHUNK};
use crate::engine::{AeadTag, AesEngine};
use crate::error::CipherError;
use crate::stream::chunk::ChunkSplitter;
use crate::stream::context::CipherContext;

/// Builder for [`CipherContext`].
///
/// Defaults: no padding, [`MAX_ENGINE_CHUNK`] per engine call, output to memory.
pub struct CipherContextBuilder {
    algorithm: Algorithm,
    direction: Direction,
    padding: Padding,
    max_engine_chunk: usize,
    aead_tag: Option<Box<dyn AeadTag + Send>>,
    keyslot: bool,
}

impl std::fmt::Debug for CipherContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherContextBuilder")
            .field("algorithm", &self.algorithm)
            .field("direction", &self.direction)
            .field("padding", &self.padding)
            .field("max_engine_chunk", &self.max_engine_chunk)
            .field("aead_tag", &self.aead_tag.is_some())
            .field("keyslot", &self.keyslot)
            .finish()
    }
}

impl CipherContextBuilder {
    #[must_use]
    pub fn new(algorithm: Algorithm, direction: Direction) -> Self {
        Self {
            algorithm,
            direction,
            padding: Padding::None,
            max_engine_chunk: MAX_ENGINE_CHUNK,
            aead_tag: None,
            keyslot: false,
        }
    }

    #[must_use]
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Lower the per-call engine ceiling (must be a non-zero multiple of 16,
    /// and at least two blocks for XTS).
    #[must_use]
    pub fn with_max_engine_chunk(mut self, max_engine_chunk: usize) -> Self {
        self.max_engine_chunk = max_engine_chunk;
        self
    }

    /// Tag module for GCM. Required for GCM, rejected for every other mode.
    #[must_use]
    pub fn with_aead_tag(mut self, tag: Box<dyn AeadTag + Send>) -> Self {
        self.aead_tag = Some(tag);
        self
    }

    /// Route engine output into a key slot instead of memory.
    #[must_use]
    pub fn into_keyslot(mut self) -> Self {
        self.keyslot = true;
        self
    }

    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    pub fn build<E: AesEngine>(self, engine: E) -> Result<CipherContext<E>, CipherError> {
        let splitter = ChunkSplitter::new(self.max_engine_chunk)?;
        // ciphertext stealing needs the last full block and the partial one
        // in the same engine call
        if self.algorithm.is_single_shot() && splitter.max_chunk() < 2 * BLOCK_SIZE {
            return Err(CipherError::InvalidArgs(format!(
                "{} needs an engine chunk ceiling of at least {} bytes",
                self.algorithm,
                2 * BLOCK_SIZE
            )));
        }

        if self.padding == Padding::Pkcs7 {
            if !cfg!(feature = "pkcs7") {
                return Err(CipherError::NotSupported(
                    "PKCS#7 padding is not compiled in".into(),
                ));
            }
            if !self.algorithm.accepts_padding() {
                return Err(CipherError::InvalidArgs(format!(
                    "{} does not take padding",
                    self.algorithm
                )));
            }
            if self.keyslot {
                return Err(CipherError::InvalidArgs(
                    "key derivation cannot use padding".into(),
                ));
            }
        }

        match (self.algorithm.is_aead(), self.aead_tag.is_some()) {
            (true, false) if !self.keyslot => {
                return Err(CipherError::InvalidArgs(format!(
                    "{} needs a tag module",
                    self.algorithm
                )))
            }
            (false, true) => {
                return Err(CipherError::InvalidArgs(format!(
                    "{} takes no tag module",
                    self.algorithm
                )))
            }
            _ => {}
        }

        debug!(
            algorithm = %self.algorithm,
            direction = %self.direction,
            padding = ?self.padding,
            max_engine_chunk = splitter.max_chunk(),
            keyslot = self.keyslot,
            "cipher context created"
        );

        Ok(CipherContext::from_parts(
            self.algorithm,
            self.direction,
            self.padding,
            engine,
            self.aead_tag,
            splitter,
            self.keyslot,
        ))
    }
}
