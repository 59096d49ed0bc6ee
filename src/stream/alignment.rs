//! Do-final alignment policy.
//!
//! Entered once per do-final call. Decides whether the tail gets padded and
//! whether leftover sub-block bytes are legal at all.

use tracing::warn;

use crate::algorithm::{Algorithm, Direction, Padding};
use crate::error::CipherError;
use crate::utils::block_remainder;

/// What the last-block handler is allowed to do with the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentPolicy {
    /// Encrypt side of a padded mode: always pad, even when aligned.
    pub add_padding: bool,
    /// Decrypt side of a padded mode: the last block must be unpadded.
    pub strip_padding: bool,
    /// 1..15 trailing bytes are processed through a zero-filled block.
    pub is_stream_cipher: bool,
    /// `bytes_remaining % BLOCK_SIZE`.
    pub unaligned_bytes: usize,
}

/// Fixed per-context inputs to the do-final policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentChecker {
    algorithm: Algorithm,
    direction: Direction,
    padding: Padding,
}

impl AlignmentChecker {
    #[must_use]
    pub const fn new(algorithm: Algorithm, direction: Direction, padding: Padding) -> Self {
        Self {
            algorithm,
            direction,
            padding,
        }
    }

    /// `bytes_remaining` is every byte not yet handed to the engine: gathered
    /// bytes plus this call's input. `is_first` means no engine call happened yet.
    pub fn check(
        &self,
        is_first: bool,
        bytes_remaining: usize,
    ) -> Result<AlignmentPolicy, CipherError> {
        let unaligned_bytes = block_remainder(bytes_remaining);
        let padded = self.padding == Padding::Pkcs7;
        let is_stream_cipher = self.algorithm.is_stream_cipher();

        let mut policy = AlignmentPolicy {
            add_padding: false,
            strip_padding: false,
            is_stream_cipher,
            unaligned_bytes,
        };

        if is_stream_cipher {
            return Ok(policy);
        }

        match self.direction {
            Direction::Encrypt => {
                if padded {
                    policy.add_padding = true;
                    return Ok(policy);
                }
                if unaligned_bytes != 0 {
                    warn!(
                        algorithm = %self.algorithm,
                        unaligned_bytes,
                        "unpadded block cipher data not block aligned"
                    );
                    return Err(CipherError::BadLength(
                        "unpadded block cipher data not block aligned".into(),
                    ));
                }
                if is_first && bytes_remaining == 0 {
                    warn!(algorithm = %self.algorithm, "no data for non-padding block cipher");
                    return Err(CipherError::BadLength(
                        "no data for non-padding block cipher".into(),
                    ));
                }
            }
            Direction::Decrypt => {
                if unaligned_bytes != 0 {
                    warn!(
                        algorithm = %self.algorithm,
                        unaligned_bytes,
                        "block cipher ciphertext not block aligned"
                    );
                    return Err(CipherError::BadLength(
                        "block cipher ciphertext not block aligned".into(),
                    ));
                }
                // a padded stream always holds its last block back, so nothing
                // left here means there is nothing to unpad
                if bytes_remaining == 0 && (is_first || padded) {
                    warn!(algorithm = %self.algorithm, "no ciphertext to decrypt");
                    return Err(CipherError::BadLength("no ciphertext to decrypt".into()));
                }
                policy.strip_padding = padded;
            }
        }

        Ok(policy)
    }
}
