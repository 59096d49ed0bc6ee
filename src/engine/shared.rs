//! An engine shared between several contexts.
//!
//! The lock is taken around a single piece-level call and released before the
//! next one, so contexts interleave at chunk granularity.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::{AesEngine, EngineCall};
use crate::error::CipherError;

/// Cloneable handle to a mutex-guarded engine.
#[derive(Debug)]
pub struct SharedEngine<E> {
    inner: Arc<Mutex<E>>,
}

impl<E> Clone for SharedEngine<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: AesEngine> SharedEngine<E> {
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut E) -> T) -> Result<T, CipherError> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    fn lock(&self) -> Result<MutexGuard<'_, E>, CipherError> {
        self.inner
            .lock()
            .map_err(|_| CipherError::from("engine lock poisoned"))
    }
}

impl<E: AesEngine> AesEngine for SharedEngine<E> {
    fn transform(
        &mut self,
        call: &EngineCall,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, CipherError> {
        let mut engine = self.lock()?;
        engine.transform(call, src, dst)
    }

    fn derive_into_keyslot(&mut self, call: &EngineCall, src: &[u8]) -> Result<usize, CipherError> {
        let mut engine = self.lock()?;
        engine.derive_into_keyslot(call, src)
    }

    fn is_contiguous_memory(&self, buf: &[u8]) -> bool {
        self.lock()
            .map(|engine| engine.is_contiguous_memory(buf))
            .unwrap_or(false)
    }

    fn dma_alignment(&self) -> usize {
        self.lock().map(|engine| engine.dma_alignment()).unwrap_or(1)
    }
}
