#[cfg(feature = "batch-ops")]
use rayon::prelude::*;

#[cfg(feature = "batch-ops")]
use crate::{AesEngine, CipherContext, CipherError};

/// Run `do_final` on many independent contexts in parallel.
///
/// Each output vector is resized to the exact final length before the call and
/// truncated to the reported size afterwards. Stops at the first error.
#[cfg(feature = "batch-ops")]
pub fn finalize_batch<E>(
    batch: &mut [(CipherContext<E>, &[u8], Vec<u8>)],
) -> Result<(), CipherError>
where
    E: AesEngine + Send,
{
    batch.par_iter_mut().try_for_each(|(ctx, input, output)| {
        let input: &[u8] = input;
        let needed = ctx.final_len(input.len())?;
        output.resize(needed, 0);
        let written = ctx.do_final(input, output)?;
        output.truncate(written);
        Ok(())
    })
}
