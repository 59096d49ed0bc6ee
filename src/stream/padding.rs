//! PKCS#7 padding of a single AES block.
//!
//! Pure functions. Unpadding verifies every pad byte before it reports
//! anything, so no partially-checked length ever escapes.

use subtle::{ConstantTimeEq, ConstantTimeLess};

use crate::consts::{BLOCK_SIZE, MAX_PAD_LEN};
use crate::error::CipherError;

/// Fill `block[valid_len..]` with the byte value `BLOCK_SIZE - valid_len`.
///
/// A block-aligned message gets a separate all-padding block, which the
/// caller asks for with `valid_len == 0`.
pub fn pkcs7_pad(block: &mut [u8; BLOCK_SIZE], valid_len: usize) -> Result<(), CipherError> {
    if valid_len > BLOCK_SIZE {
        return Err(CipherError::BadLength(format!(
            "pad: {valid_len} valid bytes do not fit a padded block"
        )));
    }

    let pad = (BLOCK_SIZE - valid_len) as u8;
    let mut filled = valid_len;
    for byte in &mut block[valid_len..] {
        *byte = pad;
        filled += 1;
    }

    // fault-injection guard: the loop must have reached the end of the block
    if filled != BLOCK_SIZE {
        return Err("pad: fill did not complete".into());
    }
    Ok(())
}

/// Verify PKCS#7 padding on a decrypted final block and return the pad length.
pub fn pkcs7_unpad(block: &[u8; BLOCK_SIZE]) -> Result<usize, CipherError> {
    let pad = block[BLOCK_SIZE - 1];

    let in_range = !pad.ct_eq(&0) & !MAX_PAD_LEN.ct_lt(&pad);

    // Compare the whole block against the expected pattern, masking the bytes
    // that are data. The loop runs the same way for every pad value.
    let mut matches = subtle::Choice::from(1u8);
    for (i, byte) in block.iter().enumerate() {
        let is_pad = !((i as u8).ct_lt(&(MAX_PAD_LEN.wrapping_sub(pad))));
        let equal = byte.ct_eq(&pad);
        matches &= !is_pad | equal;
    }

    if bool::from(in_range & matches) {
        Ok(usize::from(pad))
    } else {
        Err(CipherError::NotValid)
    }
}
