//! src/engine/soft.rs
//! Software AES engine over the RustCrypto `aes` block cipher.
//!
//! Behaves like a block-granular DMA engine: every call except a final XTS call
//! must be a whole number of blocks, and chaining state (IV, counter, tweak)
//! survives from one call to the next.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block as AesBlock};
use zeroize::Zeroizing;

use crate::algorithm::{Algorithm, Direction};
use crate::aliases::Iv16;
use crate::consts::{BLOCK_SIZE, GCM_IV_SIZE};
use crate::engine::{AesEngine, EngineCall};
use crate::error::CipherError;
use crate::utils::{block_remainder, xor_blocks, xor_in_place};

type RawBlock = [u8; BLOCK_SIZE];

enum KeySchedule {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl KeySchedule {
    fn new(key: &[u8]) -> Result<Self, CipherError> {
        let schedule = match key.len() {
            16 => Aes128::new_from_slice(key).map(Self::Aes128),
            24 => Aes192::new_from_slice(key).map(Self::Aes192),
            32 => Aes256::new_from_slice(key).map(Self::Aes256),
            n => {
                return Err(CipherError::InvalidArgs(format!(
                    "AES key must be 16, 24 or 32 bytes, got {n}"
                )))
            }
        };
        schedule.map_err(|_| CipherError::InvalidArgs("invalid AES key length".into()))
    }

    #[inline(always)]
    fn encrypt(&self, block: &RawBlock) -> RawBlock {
        let mut aes_block = AesBlock::from(*block);
        match self {
            Self::Aes128(c) => c.encrypt_block(&mut aes_block),
            Self::Aes192(c) => c.encrypt_block(&mut aes_block),
            Self::Aes256(c) => c.encrypt_block(&mut aes_block),
        }
        to_block(&aes_block)
    }

    #[inline(always)]
    fn decrypt(&self, block: &RawBlock) -> RawBlock {
        let mut aes_block = AesBlock::from(*block);
        match self {
            Self::Aes128(c) => c.decrypt_block(&mut aes_block),
            Self::Aes192(c) => c.decrypt_block(&mut aes_block),
            Self::Aes256(c) => c.decrypt_block(&mut aes_block),
        }
        to_block(&aes_block)
    }
}

/// Reference [`AesEngine`] implemented in software.
pub struct SoftwareEngine {
    algorithm: Algorithm,
    direction: Direction,
    cipher: KeySchedule,
    /// CBC previous block, CTR/GCM counter, OFB feedback or XTS tweak.
    chain: Iv16,
    keyslot: Zeroizing<Vec<u8>>,
    dma_alignment: usize,
    calls: usize,
    finalized: bool,
}

impl std::fmt::Debug for SoftwareEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareEngine")
            .field("algorithm", &self.algorithm)
            .field("direction", &self.direction)
            .field("calls", &self.calls)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

impl SoftwareEngine {
    /// Create an engine for one logical operation.
    ///
    /// * ECB takes no IV.
    /// * CBC, CTR and OFB take a 16-byte IV / initial counter.
    /// * GCM takes a 12-byte nonce; the first data counter is `J0 + 1`.
    /// * XTS takes two concatenated keys (32 or 64 bytes) and a 16-byte tweak.
    pub fn new(
        algorithm: Algorithm,
        direction: Direction,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Self, CipherError> {
        let mut chain = Iv16::new([0u8; BLOCK_SIZE]);

        let cipher = match algorithm {
            Algorithm::Ecb => {
                if !iv.is_empty() {
                    return Err(CipherError::InvalidArgs("ECB takes no IV".into()));
                }
                KeySchedule::new(key)?
            }
            Algorithm::Cbc | Algorithm::Ctr | Algorithm::Ofb => {
                if iv.len() != BLOCK_SIZE {
                    return Err(CipherError::InvalidArgs(format!(
                        "{algorithm} IV must be {BLOCK_SIZE} bytes"
                    )));
                }
                chain.expose_secret_mut().copy_from_slice(iv);
                KeySchedule::new(key)?
            }
            Algorithm::Gcm => {
                if iv.len() != GCM_IV_SIZE {
                    return Err(CipherError::InvalidArgs(format!(
                        "GCM nonce must be {GCM_IV_SIZE} bytes"
                    )));
                }
                let counter = chain.expose_secret_mut();
                counter[..GCM_IV_SIZE].copy_from_slice(iv);
                // J0 = IV || 0^31 || 1; data starts at inc32(J0)
                counter[BLOCK_SIZE - 1] = 2;
                KeySchedule::new(key)?
            }
            Algorithm::Xts => {
                if iv.len() != BLOCK_SIZE {
                    return Err(CipherError::InvalidArgs(format!(
                        "XTS tweak must be {BLOCK_SIZE} bytes"
                    )));
                }
                if key.len() != 32 && key.len() != 64 {
                    return Err(CipherError::InvalidArgs(
                        "XTS key must be two AES-128 or two AES-256 keys".into(),
                    ));
                }
                let (data_key, tweak_key) = key.split_at(key.len() / 2);
                let tweak_cipher = KeySchedule::new(tweak_key)?;
                let mut tweak = [0u8; BLOCK_SIZE];
                tweak.copy_from_slice(iv);
                *chain.expose_secret_mut() = tweak_cipher.encrypt(&tweak);
                KeySchedule::new(data_key)?
            }
        };

        Ok(Self {
            algorithm,
            direction,
            cipher,
            chain,
            keyslot: Zeroizing::new(Vec::new()),
            dma_alignment: 1,
            calls: 0,
            finalized: false,
        })
    }

    /// Report a DMA alignment requirement for destination buffers.
    #[must_use]
    pub fn with_dma_alignment(mut self, alignment: usize) -> Self {
        self.dma_alignment = alignment.max(1);
        self
    }

    /// Number of successful engine invocations so far.
    #[must_use]
    pub const fn calls(&self) -> usize {
        self.calls
    }

    /// Whether a call flagged `is_last` has been processed.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Bytes routed to the key slot by [`AesEngine::derive_into_keyslot`].
    #[must_use]
    pub fn keyslot(&self) -> &[u8] {
        &self.keyslot
    }

    fn check_call(&self, call: &EngineCall, src: &[u8], dst_len: usize) -> Result<(), CipherError> {
        if call.algorithm != self.algorithm || call.direction != self.direction {
            return Err(CipherError::InvalidArgs(format!(
                "engine keyed for {} {}, called for {} {}",
                self.algorithm, self.direction, call.algorithm, call.direction
            )));
        }
        if self.finalized {
            return Err("engine already finalized".into());
        }
        if dst_len < src.len() {
            return Err(CipherError::BadLength("engine destination too small".into()));
        }
        if self.algorithm == Algorithm::Xts {
            if src.len() < BLOCK_SIZE {
                return Err(CipherError::BadLength("XTS needs at least one block".into()));
            }
            if block_remainder(src.len()) != 0 && !call.is_last {
                return Err(CipherError::BadLength(
                    "XTS partial block only allowed in the last call".into(),
                ));
            }
        } else if block_remainder(src.len()) != 0 {
            return Err(CipherError::BadLength("engine input must be whole blocks".into()));
        }
        Ok(())
    }

    fn ecb(&self, src: &[u8], dst: &mut [u8]) {
        for (input, output) in src.chunks_exact(BLOCK_SIZE).zip(dst.chunks_exact_mut(BLOCK_SIZE)) {
            let block = to_block(input);
            let out = match self.direction {
                Direction::Encrypt => self.cipher.encrypt(&block),
                Direction::Decrypt => self.cipher.decrypt(&block),
            };
            output.copy_from_slice(&out);
        }
    }

    fn cbc(&mut self, src: &[u8], dst: &mut [u8]) {
        for (input, output) in src.chunks_exact(BLOCK_SIZE).zip(dst.chunks_exact_mut(BLOCK_SIZE)) {
            let block = to_block(input);
            match self.direction {
                Direction::Encrypt => {
                    let mut mixed = [0u8; BLOCK_SIZE];
                    xor_blocks(&block, self.chain.expose_secret(), &mut mixed);
                    let out = self.cipher.encrypt(&mixed);
                    output.copy_from_slice(&out);
                    *self.chain.expose_secret_mut() = out;
                }
                Direction::Decrypt => {
                    let decrypted = self.cipher.decrypt(&block);
                    xor_blocks(&decrypted, self.chain.expose_secret(), output);
                    *self.chain.expose_secret_mut() = block;
                }
            }
        }
    }

    fn counter(&mut self, src: &[u8], dst: &mut [u8], wide: bool) {
        for (input, output) in src.chunks_exact(BLOCK_SIZE).zip(dst.chunks_exact_mut(BLOCK_SIZE)) {
            let keystream = self.cipher.encrypt(self.chain.expose_secret());
            output.copy_from_slice(input);
            xor_in_place(output, &keystream);
            let counter = self.chain.expose_secret_mut();
            if wide {
                increment_be128(counter);
            } else {
                increment_be32(counter);
            }
        }
    }

    fn ofb(&mut self, src: &[u8], dst: &mut [u8]) {
        for (input, output) in src.chunks_exact(BLOCK_SIZE).zip(dst.chunks_exact_mut(BLOCK_SIZE)) {
            let feedback = self.cipher.encrypt(self.chain.expose_secret());
            *self.chain.expose_secret_mut() = feedback;
            output.copy_from_slice(input);
            xor_in_place(output, &feedback);
        }
    }

    fn xts_block(&self, block: &RawBlock, tweak: &RawBlock) -> RawBlock {
        let mut mixed = [0u8; BLOCK_SIZE];
        xor_blocks(block, tweak, &mut mixed);
        let transformed = match self.direction {
            Direction::Encrypt => self.cipher.encrypt(&mixed),
            Direction::Decrypt => self.cipher.decrypt(&mixed),
        };
        let mut out = [0u8; BLOCK_SIZE];
        xor_blocks(&transformed, tweak, &mut out);
        out
    }

    fn xts(&mut self, src: &[u8], dst: &mut [u8]) {
        let full = src.len() / BLOCK_SIZE;
        let rem = block_remainder(src.len());
        let plain_blocks = if rem == 0 { full } else { full - 1 };

        for i in 0..plain_blocks {
            let range = i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE;
            let tweak = *self.chain.expose_secret();
            let out = self.xts_block(&to_block(&src[range.clone()]), &tweak);
            dst[range].copy_from_slice(&out);
            mul_alpha(self.chain.expose_secret_mut());
        }

        if rem == 0 {
            return;
        }

        // ciphertext stealing over the last full block and the partial block
        let last_full = (full - 1) * BLOCK_SIZE..full * BLOCK_SIZE;
        let partial = full * BLOCK_SIZE..src.len();
        let tweak_prev = *self.chain.expose_secret();
        let mut tweak_last = tweak_prev;
        mul_alpha(&mut tweak_last);

        let (first_tweak, second_tweak) = match self.direction {
            Direction::Encrypt => (tweak_prev, tweak_last),
            Direction::Decrypt => (tweak_last, tweak_prev),
        };

        let stolen = self.xts_block(&to_block(&src[last_full.clone()]), &first_tweak);
        let mut joined = stolen;
        joined[..rem].copy_from_slice(&src[partial.clone()]);
        dst[partial].copy_from_slice(&stolen[..rem]);
        let out = self.xts_block(&joined, &second_tweak);
        dst[last_full].copy_from_slice(&out);

        *self.chain.expose_secret_mut() = tweak_last;
    }
}

impl AesEngine for SoftwareEngine {
    fn transform(
        &mut self,
        call: &EngineCall,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, CipherError> {
        self.check_call(call, src, dst.len())?;
        let dst = &mut dst[..src.len()];

        match self.algorithm {
            Algorithm::Ecb => self.ecb(src, dst),
            Algorithm::Cbc => self.cbc(src, dst),
            Algorithm::Ctr => self.counter(src, dst, true),
            Algorithm::Gcm => self.counter(src, dst, false),
            Algorithm::Ofb => self.ofb(src, dst),
            Algorithm::Xts => self.xts(src, dst),
        }

        self.calls += 1;
        if call.is_last {
            self.finalized = true;
        }
        Ok(src.len())
    }

    fn derive_into_keyslot(&mut self, call: &EngineCall, src: &[u8]) -> Result<usize, CipherError> {
        let mut derived = Zeroizing::new(vec![0u8; src.len()]);
        let produced = self.transform(call, src, &mut derived)?;
        self.keyslot.extend_from_slice(&derived[..produced]);
        Ok(produced)
    }

    fn dma_alignment(&self) -> usize {
        self.dma_alignment
    }
}

#[inline(always)]
fn to_block(bytes: &[u8]) -> RawBlock {
    let mut block = [0u8; BLOCK_SIZE];
    block.copy_from_slice(&bytes[..BLOCK_SIZE]);
    block
}

#[inline(always)]
fn increment_be128(counter: &mut RawBlock) {
    *counter = u128::from_be_bytes(*counter).wrapping_add(1).to_be_bytes();
}

#[inline(always)]
fn increment_be32(counter: &mut RawBlock) {
    let mut low = [0u8; 4];
    low.copy_from_slice(&counter[BLOCK_SIZE - 4..]);
    let next = u32::from_be_bytes(low).wrapping_add(1);
    counter[BLOCK_SIZE - 4..].copy_from_slice(&next.to_be_bytes());
}

/// Multiply an XTS tweak by α in GF(2¹²⁸), little-endian byte order.
#[inline(always)]
fn mul_alpha(tweak: &mut RawBlock) {
    let mut carry = 0u8;
    for byte in tweak.iter_mut() {
        let next = *byte >> 7;
        *byte = (*byte << 1) | carry;
        carry = next;
    }
    if carry != 0 {
        tweak[0] ^= 0x87;
    }
}
