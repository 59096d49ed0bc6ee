//! Cipher mode identity and the per-mode policy the stream layer branches on.
//!
//! The algorithm is fixed for the lifetime of a context, so every policy
//! question is answered by a `match` on the enum rather than a lookup table.

use std::fmt;

/// AES mode of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Ecb,
    Cbc,
    Ctr,
    Ofb,
    Xts,
    /// Counter stream of GCM; the tag is computed by an [`AeadTag`](crate::AeadTag) collaborator.
    Gcm,
}

/// Whether a context encrypts or decrypts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Padding applied to the final block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Padding {
    #[default]
    None,
    Pkcs7,
}

impl Algorithm {
    /// Keystream modes: any trailing byte count is legal without padding.
    #[must_use]
    pub const fn is_stream_cipher(self) -> bool {
        matches!(self, Algorithm::Ctr | Algorithm::Ofb | Algorithm::Gcm)
    }

    /// Modes that only ever see whole blocks unless padding is applied.
    #[must_use]
    pub const fn is_block_cipher(self) -> bool {
        matches!(self, Algorithm::Ecb | Algorithm::Cbc | Algorithm::Xts)
    }

    /// Modes that may be configured with PKCS#7 padding.
    #[must_use]
    pub const fn accepts_padding(self) -> bool {
        matches!(self, Algorithm::Ecb | Algorithm::Cbc)
    }

    /// Modes whose do-final must hand the ciphertext to a tag module.
    #[must_use]
    pub const fn is_aead(self) -> bool {
        matches!(self, Algorithm::Gcm)
    }

    /// XTS tweak propagation cannot be split across calls.
    #[must_use]
    pub const fn is_single_shot(self) -> bool {
        matches!(self, Algorithm::Xts)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Ecb => "AES-ECB",
            Algorithm::Cbc => "AES-CBC",
            Algorithm::Ctr => "AES-CTR",
            Algorithm::Ofb => "AES-OFB",
            Algorithm::Xts => "AES-XTS",
            Algorithm::Gcm => "AES-GCM",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encrypt => f.write_str("encrypt"),
            Direction::Decrypt => f.write_str("decrypt"),
        }
    }
}
