//! src/stream/context.rs
//! Cipher context and the update/do-final orchestration.
//!
//! A context is created once per logical operation (key, mode and direction
//! fixed), fed any number of `update` calls and closed by exactly one
//! `do_final`. It is not internally synchronized.

use tracing::{debug, error, warn};

use crate::algorithm::{Algorithm, Direction, Padding};
use crate::consts::{BLOCK_SIZE, GATHER_BUFFER_CAPACITY};
use crate::engine::{AeadTag, AesEngine, EngineCall};
use crate::error::CipherError;
use crate::stream::alignment::{AlignmentChecker, AlignmentPolicy};
use crate::stream::chunk::ChunkSplitter;
use crate::stream::gather::GatherBuffer;
use crate::stream::last_block::LastBlockHandler;
use crate::utils::{add_len, add_total, block_floor, block_remainder};

type BoxedTag = Box<dyn AeadTag + Send>;

/// Lifecycle of a [`CipherContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No bytes pending in the gather buffer.
    Empty,
    /// Sub-block bytes (or a held-back padded block) wait for the next call.
    Accumulating,
    /// `do_final` is producing the last block.
    Draining,
    /// Terminal. Every further call fails with `BadState`.
    Done,
}

/// Cursors and flags for a single `update` / `do_final` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallState {
    pub src_cursor: usize,
    pub dst_cursor: usize,
    pub bytes_remaining_in: usize,
    pub output_budget: usize,
    pub unaligned_bytes: usize,
    pub add_padding: bool,
    pub is_stream_cipher: bool,
    pub strip_pad_bytes: usize,
}

impl CallState {
    #[must_use]
    pub fn new(src_len: usize, dst_len: usize) -> Self {
        Self {
            bytes_remaining_in: src_len,
            output_budget: dst_len,
            ..Self::default()
        }
    }

    fn apply(&mut self, policy: &AlignmentPolicy) {
        self.unaligned_bytes = policy.unaligned_bytes;
        self.add_padding = policy.add_padding;
        self.is_stream_cipher = policy.is_stream_cipher;
    }
}

/// Per-operation cipher state owned by the caller across calls.
pub struct CipherContext<E> {
    algorithm: Algorithm,
    direction: Direction,
    padding: Padding,
    engine: E,
    aead_tag: Option<BoxedTag>,
    splitter: ChunkSplitter,
    checker: AlignmentChecker,
    gather: GatherBuffer,
    last_block: LastBlockHandler,
    keyslot: bool,
    is_first: bool,
    is_last: bool,
    async_in_flight: bool,
    state: StreamState,
    total_bytes_written: u64,
    output_shrink_bytes: usize,
}

impl<E> std::fmt::Debug for CipherContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherContext")
            .field("algorithm", &self.algorithm)
            .field("direction", &self.direction)
            .field("padding", &self.padding)
            .field("state", &self.state)
            .field("gather_used", &self.gather.used())
            .field("total_bytes_written", &self.total_bytes_written)
            .finish_non_exhaustive()
    }
}

impl<E: AesEngine> CipherContext<E> {
    /// Assemble a context. Validation of the combination lives in
    /// [`CipherContextBuilder`](crate::CipherContextBuilder).
    pub(crate) fn from_parts(
        algorithm: Algorithm,
        direction: Direction,
        padding: Padding,
        engine: E,
        aead_tag: Option<BoxedTag>,
        splitter: ChunkSplitter,
        keyslot: bool,
    ) -> Self {
        Self {
            algorithm,
            direction,
            padding,
            engine,
            aead_tag,
            splitter,
            checker: AlignmentChecker::new(algorithm, direction, padding),
            gather: GatherBuffer::new(),
            last_block: LastBlockHandler::new(),
            keyslot,
            is_first: true,
            is_last: false,
            async_in_flight: false,
            state: StreamState::Empty,
            total_bytes_written: 0,
            output_shrink_bytes: 0,
        }
    }

    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub const fn padding(&self) -> Padding {
        self.padding
    }

    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Output bytes emitted since construction, including PKCS#7 bytes that
    /// were written and then stripped from the report.
    #[must_use]
    pub const fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    /// Padding length removed from the report of the completed `do_final`.
    #[must_use]
    pub const fn strip_pad_bytes(&self) -> usize {
        self.output_shrink_bytes
    }

    /// Bytes waiting in the gather buffer.
    #[must_use]
    pub const fn gather_used(&self) -> usize {
        self.gather.used()
    }

    /// Whether the engine has seen its last call.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.is_last
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    #[must_use]
    pub fn into_engine(self) -> E {
        self.engine
    }

    fn hold_back(&self) -> bool {
        self.padding == Padding::Pkcs7
    }

    fn check_sync_gate(&self) -> Result<(), CipherError> {
        if self.state == StreamState::Done {
            warn!(algorithm = %self.algorithm, "call on a finalized context");
            return Err("context already finalized".into());
        }
        if self.async_in_flight {
            warn!(algorithm = %self.algorithm, "synchronous call while async operation in flight");
            return Err(CipherError::BadState(
                "asynchronous operation in flight on this context".into(),
            ));
        }
        Ok(())
    }

    /// Exact number of bytes `update` would write for `src_len` input bytes.
    pub fn update_len(&self, src_len: usize) -> Result<usize, CipherError> {
        if self.algorithm.is_single_shot() {
            return Err(CipherError::BadState(format!(
                "{} takes the whole message in one do-final call",
                self.algorithm
            )));
        }
        if self.keyslot {
            return Ok(0);
        }

        let hold = self.hold_back();
        let used = self.gather.used();
        let mut out = 0usize;
        let mut rest = src_len;

        if used > 0 || rest < GATHER_BUFFER_CAPACITY {
            let take = (GATHER_BUFFER_CAPACITY - used).min(rest);
            rest -= take;
            if used + take == GATHER_BUFFER_CAPACITY {
                out = GatherBuffer::full_flush_len(rest > 0, hold);
            }
        }
        if rest > 0 {
            let mut direct = block_floor(rest);
            if hold && block_remainder(rest) == 0 {
                direct -= BLOCK_SIZE;
            }
            out = add_len(out, direct)?;
        }
        Ok(out)
    }

    /// Exact number of bytes `do_final` would write into `dst` for `src_len`
    /// input bytes. For padded decryption the reported size is smaller by the
    /// pad length, which is unknowable before decryption.
    pub fn final_len(&self, src_len: usize) -> Result<usize, CipherError> {
        if self.algorithm.is_single_shot() {
            return Ok(src_len);
        }
        if self.keyslot {
            return Ok(0);
        }
        let pending = add_len(self.gather.used(), src_len)?;
        if self.hold_back() && self.direction == Direction::Encrypt {
            add_len(block_floor(pending), BLOCK_SIZE)
        } else {
            Ok(pending)
        }
    }

    /// Feed more input. Returns the bytes written to `dst` by this call.
    pub fn update(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize, CipherError> {
        self.check_sync_gate()?;
        if self.algorithm.is_single_shot() {
            warn!(algorithm = %self.algorithm, "update rejected for single-shot mode");
            return Err(CipherError::BadState(format!(
                "{} takes the whole message in one do-final call",
                self.algorithm
            )));
        }
        if src.is_empty() {
            return Ok(0);
        }
        if self.keyslot {
            return self.keyslot_pass(src, false);
        }

        let required = self.update_len(src.len())?;
        if dst.len() < required {
            return Err(CipherError::BadLength(format!(
                "update needs {required} output bytes, have {}",
                dst.len()
            )));
        }

        let mut state = CallState::new(src.len(), dst.len());
        if let Err(e) = self.gather_or_process(src, dst, &mut state) {
            error!(algorithm = %self.algorithm, error = %e, "update failed");
            self.abort();
            return Err(e);
        }

        let written = state.dst_cursor;
        self.total_bytes_written = add_total(self.total_bytes_written, written)?;
        self.state = if self.gather.is_empty() {
            StreamState::Empty
        } else {
            StreamState::Accumulating
        };
        debug!(
            algorithm = %self.algorithm,
            direction = %self.direction,
            input = src.len(),
            written,
            gathered = self.gather.used(),
            "update"
        );
        Ok(written)
    }

    /// Feed the last input and close the operation. Returns the bytes produced
    /// by this call, excluding stripped padding.
    pub fn do_final(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize, CipherError> {
        self.check_sync_gate()?;
        if self.keyslot {
            return self.keyslot_pass(src, true);
        }
        if self.algorithm.is_single_shot() {
            return self.single_shot(src, dst);
        }

        let pending = add_len(self.gather.used(), src.len())?;
        let policy = self.checker.check(self.is_first, pending)?;
        let required = self.final_len(src.len())?;
        if dst.len() < required {
            return Err(CipherError::BadLength(format!(
                "do-final needs {required} output bytes, have {}",
                dst.len()
            )));
        }

        self.state = StreamState::Draining;
        let mut state = CallState::new(src.len(), dst.len());
        state.apply(&policy);

        if let Err(e) = self.drain(&policy, src, dst, &mut state) {
            if e != CipherError::NotValid {
                error!(algorithm = %self.algorithm, error = %e, "do-final failed");
            }
            self.abort();
            return Err(e);
        }

        self.commit_final(state.dst_cursor, state.strip_pad_bytes)
    }

    /// Mark an asynchronous engine operation as in flight. Synchronous calls
    /// are rejected until [`complete_async`](Self::complete_async).
    ///
    /// Only physically contiguous buffers are accepted.
    pub fn begin_async(&mut self, src: &[u8]) -> Result<(), CipherError> {
        self.check_sync_gate()?;
        if src.is_empty() {
            return Err(CipherError::InvalidArgs("async operation without input".into()));
        }
        // TODO: scatter-gather lists for non-contiguous buffers
        if !self.engine.is_contiguous_memory(src) {
            return Err(CipherError::InvalidArgs(
                "async operation needs contiguous memory".into(),
            ));
        }
        self.async_in_flight = true;
        Ok(())
    }

    pub fn complete_async(&mut self) -> Result<(), CipherError> {
        if !self.async_in_flight {
            return Err("no asynchronous operation in flight".into());
        }
        self.async_in_flight = false;
        Ok(())
    }

    fn abort(&mut self) {
        self.gather.clear();
        self.state = StreamState::Done;
    }

    fn commit_final(
        &mut self,
        written: usize,
        strip_pad_bytes: usize,
    ) -> Result<usize, CipherError> {
        let total_after = add_total(self.total_bytes_written, written)?;
        let reported = written
            .checked_sub(strip_pad_bytes)
            .ok_or_else(|| CipherError::from("output size underflow"))?;

        self.total_bytes_written = total_after;
        self.output_shrink_bytes = strip_pad_bytes;
        self.is_last = true;
        self.state = StreamState::Done;
        debug!(
            algorithm = %self.algorithm,
            direction = %self.direction,
            written,
            reported,
            total = self.total_bytes_written,
            "do-final"
        );
        Ok(reported)
    }

    fn pipeline(&mut self) -> Pipeline<'_, E> {
        Pipeline {
            algorithm: self.algorithm,
            direction: self.direction,
            engine: &mut self.engine,
            splitter: &self.splitter,
            gather: &mut self.gather,
            last_block: &mut self.last_block,
            aead_tag: self.aead_tag.as_mut(),
            is_first: &mut self.is_first,
        }
    }

    fn gather_or_process(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        state: &mut CallState,
    ) -> Result<(), CipherError> {
        let hold = self.hold_back();
        let mut p = self.pipeline();

        if !p.gather.is_empty() || src.len() < GATHER_BUFFER_CAPACITY {
            p.gather.absorb(src, state);
            p.flush_gather_if_full(hold, dst, state)?;
        }

        if state.bytes_remaining_in > 0 {
            let rest = state.bytes_remaining_in;
            let mut direct = block_floor(rest);
            // a padded stream never lets its last block go before do-final
            if hold && block_remainder(rest) == 0 {
                direct -= BLOCK_SIZE;
            }
            p.run_direct(src, direct, false, dst, state)?;
            p.gather.absorb(src, state);
        }
        Ok(())
    }

    fn drain(
        &mut self,
        policy: &AlignmentPolicy,
        src: &[u8],
        dst: &mut [u8],
        state: &mut CallState,
    ) -> Result<(), CipherError> {
        let mut p = self.pipeline();

        let mut from_gather = false;
        if !p.gather.is_empty() {
            p.gather.absorb(src, state);
            if state.bytes_remaining_in > 0 {
                p.flush_gather(GATHER_BUFFER_CAPACITY, false, dst, state)?;
            } else {
                from_gather = true;
            }
        }

        let region_len = if from_gather {
            p.gather.used()
        } else {
            state.bytes_remaining_in
        };
        let tail_len = if policy.is_stream_cipher || policy.add_padding {
            block_remainder(region_len)
        } else {
            0
        };
        let full = region_len - tail_len;
        let tail_follows = tail_len > 0 || policy.add_padding;

        if full > 0 {
            if from_gather {
                p.flush_gather(full, !tail_follows, dst, state)?;
            } else {
                p.run_direct(src, full, !tail_follows, dst, state)?;
            }
        }
        if tail_follows {
            p.finish_tail(policy, from_gather, src, dst, state)?;
        }

        if policy.strip_padding {
            let end = state.dst_cursor;
            if end < BLOCK_SIZE {
                return Err("no decrypted block to unpad".into());
            }
            state.strip_pad_bytes = p.last_block.strip_padding(&dst[end - BLOCK_SIZE..end])?;
        }

        p.gather.clear();
        if let Some(tag) = p.aead_tag {
            tag.finalize()?;
        }
        Ok(())
    }

    fn single_shot(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize, CipherError> {
        if !self.is_first || !self.gather.is_empty() {
            return Err(CipherError::BadState(format!(
                "{} takes the whole message in one do-final call",
                self.algorithm
            )));
        }
        if src.len() < BLOCK_SIZE {
            return Err(CipherError::BadLength(format!(
                "{} needs at least one full block",
                self.algorithm
            )));
        }
        if dst.len() < src.len() {
            return Err(CipherError::BadLength(format!(
                "do-final needs {} output bytes, have {}",
                src.len(),
                dst.len()
            )));
        }

        self.state = StreamState::Draining;
        let call = EngineCall::new(self.algorithm, self.direction)
            .first(true)
            .last(true);
        let written = match self
            .splitter
            .run(&mut self.engine, call, src, &mut dst[..src.len()])
        {
            Ok(n) => n,
            Err(e) => {
                error!(algorithm = %self.algorithm, error = %e, "single-shot do-final failed");
                self.abort();
                return Err(e);
            }
        };
        self.is_first = false;
        self.commit_final(written, 0)
    }

    /// Key-derivation operations bypass gathering: output lands in an engine
    /// key slot, so nothing is reported as written.
    fn keyslot_pass(&mut self, src: &[u8], is_last: bool) -> Result<usize, CipherError> {
        if block_remainder(src.len()) != 0 {
            return Err(CipherError::BadLength(
                "key derivation input must be block aligned".into(),
            ));
        }
        if is_last && self.is_first && src.is_empty() {
            return Err(CipherError::BadLength("no data for key derivation".into()));
        }

        let call = EngineCall::new(self.algorithm, self.direction)
            .first(self.is_first)
            .last(is_last);
        if let Err(e) = self.splitter.run_to_keyslot(&mut self.engine, call, src) {
            error!(algorithm = %self.algorithm, error = %e, "key slot derivation failed");
            self.abort();
            return Err(e);
        }
        if !src.is_empty() {
            self.is_first = false;
        }
        if is_last {
            return self.commit_final(0, 0);
        }
        Ok(0)
    }
}

/// Split borrows of a context for the duration of one call.
struct Pipeline<'a, E> {
    algorithm: Algorithm,
    direction: Direction,
    engine: &'a mut E,
    splitter: &'a ChunkSplitter,
    gather: &'a mut GatherBuffer,
    last_block: &'a mut LastBlockHandler,
    aead_tag: Option<&'a mut BoxedTag>,
    is_first: &'a mut bool,
}

impl<E: AesEngine> Pipeline<'_, E> {
    fn call(&self, is_last: bool) -> EngineCall {
        EngineCall::new(self.algorithm, self.direction)
            .first(*self.is_first)
            .last(is_last)
    }

    fn flush_gather(
        &mut self,
        len: usize,
        is_last: bool,
        dst: &mut [u8],
        state: &mut CallState,
    ) -> Result<usize, CipherError> {
        if len == 0 {
            return Ok(0);
        }
        let call = self.call(is_last);
        if self.direction == Direction::Decrypt {
            feed_tag(&mut self.aead_tag, &self.gather.filled()[..len])?;
        }

        let start = state.dst_cursor;
        let produced = self
            .gather
            .flush(&mut *self.engine, self.splitter, call, len, dst, state)?;
        *self.is_first = false;

        if self.direction == Direction::Encrypt {
            feed_tag(&mut self.aead_tag, &dst[start..start + produced])?;
        }
        Ok(produced)
    }

    /// Mid-stream flush of a full gather buffer; never the last engine call.
    fn flush_gather_if_full(
        &mut self,
        hold_back: bool,
        dst: &mut [u8],
        state: &mut CallState,
    ) -> Result<usize, CipherError> {
        if !self.gather.is_full() {
            return Ok(0);
        }
        let call = self.call(false);
        if self.direction == Direction::Decrypt {
            let len = GatherBuffer::full_flush_len(state.bytes_remaining_in > 0, hold_back);
            feed_tag(&mut self.aead_tag, &self.gather.filled()[..len])?;
        }

        let start = state.dst_cursor;
        let produced = self.gather.flush_if_full(
            &mut *self.engine,
            self.splitter,
            call,
            hold_back,
            dst,
            state,
        )?;
        *self.is_first = false;

        if self.direction == Direction::Encrypt {
            feed_tag(&mut self.aead_tag, &dst[start..start + produced])?;
        }
        Ok(produced)
    }

    fn run_direct(
        &mut self,
        src: &[u8],
        len: usize,
        is_last: bool,
        dst: &mut [u8],
        state: &mut CallState,
    ) -> Result<usize, CipherError> {
        if len == 0 {
            return Ok(0);
        }
        let from = state.src_cursor;
        let input = &src[from..add_len(from, len)?];
        let end = add_len(state.dst_cursor, len)?;
        if end > dst.len() || len > state.output_budget {
            return Err(CipherError::BadLength("output buffer too small".into()));
        }

        let call = self.call(is_last);
        if self.direction == Direction::Decrypt {
            feed_tag(&mut self.aead_tag, input)?;
        }

        let start = state.dst_cursor;
        let produced = self
            .splitter
            .run(&mut *self.engine, call, input, &mut dst[start..end])?;
        *self.is_first = false;

        if self.direction == Direction::Encrypt {
            feed_tag(&mut self.aead_tag, &dst[start..start + produced])?;
        }

        state.src_cursor += len;
        state.bytes_remaining_in -= len;
        state.dst_cursor = add_len(start, produced)?;
        state.output_budget -= produced;
        Ok(produced)
    }

    fn finish_tail(
        &mut self,
        policy: &AlignmentPolicy,
        from_gather: bool,
        src: &[u8],
        dst: &mut [u8],
        state: &mut CallState,
    ) -> Result<usize, CipherError> {
        let call = self.call(true);
        let from = state.src_cursor;
        let tail: &[u8] = if from_gather {
            self.gather.filled()
        } else {
            &src[from..from + state.bytes_remaining_in]
        };
        let tail_len = tail.len();

        if self.direction == Direction::Decrypt {
            feed_tag(&mut self.aead_tag, tail)?;
        }

        let start = state.dst_cursor;
        let written = self.last_block.finish_tail(
            &mut *self.engine,
            self.splitter,
            call,
            policy,
            tail,
            dst,
            state,
        )?;
        if policy.add_padding || tail_len > 0 {
            *self.is_first = false;
        }

        if self.direction == Direction::Encrypt {
            feed_tag(&mut self.aead_tag, &dst[start..start + written])?;
        }

        if !from_gather {
            state.src_cursor += tail_len;
            state.bytes_remaining_in -= tail_len;
        }
        Ok(written)
    }
}

fn feed_tag(tag: &mut Option<&mut BoxedTag>, ciphertext: &[u8]) -> Result<(), CipherError> {
    match tag {
        Some(tag) if !ciphertext.is_empty() => tag.update(ciphertext),
        _ => Ok(()),
    }
}
