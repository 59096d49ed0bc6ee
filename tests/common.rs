//! tests/common.rs
//! Shared engines, contexts and call drivers for the integration tests

#![allow(dead_code)] // Used across multiple test files

use std::sync::{Arc, Mutex};

use aes_stream_core::{
    AeadTag, AesEngine, Algorithm, CipherContext, CipherContextBuilder, CipherError, Direction,
    EngineCall, Padding, SoftwareEngine,
};

/// NIST SP 800-38A AES-128 key
pub const TEST_KEY: [u8; 16] = [
    0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f, 0x3c,
];

/// NIST SP 800-38A IV for CBC and OFB
pub const TEST_IV: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
];

pub const TEST_XTS_KEY: [u8; 32] = [0x42; 32];
pub const TEST_GCM_NONCE: [u8; 12] = [0x24; 12];

/// Lengths every round-trip test walks through (GATHER_BUFFER_CAPACITY ± 1 included)
pub const ROUNDTRIP_LENGTHS: &[usize] = &[0, 1, 15, 16, 17, 31, 32, 63, 64, 65, 1000];

/// Every (mode, padding) combination the stream layer supports
pub const ALL_MODES: &[(Algorithm, Padding)] = &[
    (Algorithm::Ecb, Padding::None),
    (Algorithm::Ecb, Padding::Pkcs7),
    (Algorithm::Cbc, Padding::None),
    (Algorithm::Cbc, Padding::Pkcs7),
    (Algorithm::Ctr, Padding::None),
    (Algorithm::Ofb, Padding::None),
    (Algorithm::Gcm, Padding::None),
];

pub fn test_plaintext(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

pub fn software_engine(algorithm: Algorithm, direction: Direction) -> SoftwareEngine {
    let (key, iv): (&[u8], &[u8]) = match algorithm {
        Algorithm::Ecb => (&TEST_KEY, &[]),
        Algorithm::Cbc | Algorithm::Ctr | Algorithm::Ofb => (&TEST_KEY, &TEST_IV),
        Algorithm::Gcm => (&TEST_KEY, &TEST_GCM_NONCE),
        Algorithm::Xts => (&TEST_XTS_KEY, &TEST_IV),
    };
    SoftwareEngine::new(algorithm, direction, key, iv).unwrap()
}

/// Whether a mode accepts a message of `len` bytes at all.
pub fn accepts_len(algorithm: Algorithm, padding: Padding, len: usize) -> bool {
    match (algorithm, padding) {
        (Algorithm::Ecb | Algorithm::Cbc, Padding::None) => len > 0 && len % 16 == 0,
        (Algorithm::Xts, _) => len >= 16,
        _ => true,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tag module stand-in
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TagLog {
    pub ciphertext: Vec<u8>,
    pub finalized: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingTag {
    pub log: Arc<Mutex<TagLog>>,
}

impl AeadTag for RecordingTag {
    fn update(&mut self, ciphertext: &[u8]) -> Result<(), CipherError> {
        let mut log = self.log.lock().unwrap();
        assert_eq!(log.finalized, 0, "tag fed after finalize");
        log.ciphertext.extend_from_slice(ciphertext);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), CipherError> {
        self.log.lock().unwrap().finalized += 1;
        Ok(())
    }
}

pub fn context(
    algorithm: Algorithm,
    direction: Direction,
    padding: Padding,
) -> CipherContext<SoftwareEngine> {
    context_with_tag(algorithm, direction, padding, RecordingTag::default())
}

pub fn context_with_tag(
    algorithm: Algorithm,
    direction: Direction,
    padding: Padding,
    tag: RecordingTag,
) -> CipherContext<SoftwareEngine> {
    let mut builder = CipherContextBuilder::new(algorithm, direction).with_padding(padding);
    if algorithm == Algorithm::Gcm {
        builder = builder.with_aead_tag(Box::new(tag));
    }
    builder.build(software_engine(algorithm, direction)).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Call drivers
// ─────────────────────────────────────────────────────────────────────────────

/// Result of driving a context through a split sequence.
#[derive(Debug)]
pub struct Driven {
    pub output: Vec<u8>,
    pub reported: Vec<usize>,
}

/// Feed `input` as `update` calls of the given sizes, then `do_final` with
/// whatever is left. Output buffers are sized with `update_len`/`final_len`.
pub fn drive<E: AesEngine>(
    ctx: &mut CipherContext<E>,
    input: &[u8],
    splits: &[usize],
) -> Result<Driven, CipherError> {
    let mut output = Vec::new();
    let mut reported = Vec::new();
    let mut offset = 0;

    for &size in splits {
        let end = (offset + size).min(input.len());
        let piece = &input[offset..end];
        let mut dst = vec![0u8; ctx.update_len(piece.len())?];
        let n = ctx.update(piece, &mut dst)?;
        assert_eq!(n, dst.len(), "update_len must be exact");
        output.extend_from_slice(&dst[..n]);
        reported.push(n);
        offset = end;
    }

    let rest = &input[offset..];
    let mut dst = vec![0u8; ctx.final_len(rest.len())?];
    let n = ctx.do_final(rest, &mut dst)?;
    output.extend_from_slice(&dst[..n]);
    reported.push(n);

    Ok(Driven { output, reported })
}

pub fn one_shot(
    algorithm: Algorithm,
    direction: Direction,
    padding: Padding,
    input: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let mut ctx = context(algorithm, direction, padding);
    drive(&mut ctx, input, &[]).map(|d| d.output)
}

/// Split `len` into random update sizes (the remainder goes to do-final).
pub fn random_splits(rng: &mut impl rand::Rng, len: usize) -> Vec<usize> {
    let mut splits = Vec::new();
    let mut left = len;
    while left > 0 && rng.random_bool(0.8) {
        let size = rng.random_range(0..=left.min(150));
        splits.push(size);
        left -= size;
    }
    splits
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity engine recording every call it receives
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedCall {
    pub len: usize,
    pub is_first: bool,
    pub is_last: bool,
}

#[derive(Debug, Default)]
pub struct RecordingEngine {
    pub calls: Vec<RecordedCall>,
    pub fail_on_call: Option<usize>,
    pub fragmented: bool,
    pub keyslot: Vec<u8>,
}

impl AesEngine for RecordingEngine {
    fn transform(
        &mut self,
        call: &EngineCall,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, CipherError> {
        if self.fail_on_call == Some(self.calls.len()) {
            return Err(CipherError::Engine("injected failure".into()));
        }
        self.calls.push(RecordedCall {
            len: src.len(),
            is_first: call.is_first,
            is_last: call.is_last,
        });
        dst[..src.len()].copy_from_slice(src);
        Ok(src.len())
    }

    fn derive_into_keyslot(&mut self, call: &EngineCall, src: &[u8]) -> Result<usize, CipherError> {
        self.calls.push(RecordedCall {
            len: src.len(),
            is_first: call.is_first,
            is_last: call.is_last,
        });
        self.keyslot.extend_from_slice(src);
        Ok(src.len())
    }

    fn is_contiguous_memory(&self, _buf: &[u8]) -> bool {
        !self.fragmented
    }
}
