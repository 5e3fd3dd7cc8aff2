//! HEALPix resolution arithmetic.
//!
//! A map at resolution `nside` has `12 * nside^2` pixels. Downgrading from
//! `nside_in` to `nside_out` merges `(nside_in / nside_out)^2` children into
//! each parent pixel; that block size drives every pool/kernel width.

use crate::error::{HealpixError, Result};

/// Number of taps in a first-order neighbour filter (pixel + 8 neighbours).
pub const NEIGHBOUR_KERNEL: usize = 9;

/// Number of pixels in a map at resolution `nside`.
pub fn npix(nside: usize) -> Result<usize> {
    nside
        .checked_mul(nside)
        .and_then(|sq| sq.checked_mul(12))
        .ok_or_else(|| HealpixError::Resolution(format!("nside {} overflows pixel count", nside)))
}

/// Children per parent pixel when going from `nside_in` down to `nside_out`.
///
/// Fails unless both are nonzero and `nside_in` is a multiple of `nside_out`.
/// Power-of-two validity is left to whoever generates the tables.
pub fn block_size(nside_in: usize, nside_out: usize) -> Result<usize> {
    if nside_in == 0 || nside_out == 0 {
        return Err(HealpixError::Resolution(format!(
            "nside must be positive (got {} -> {})",
            nside_in, nside_out
        )));
    }
    if nside_in < nside_out || nside_in % nside_out != 0 {
        return Err(HealpixError::Resolution(format!(
            "nside_in {} is not a multiple of nside_out {}",
            nside_in, nside_out
        )));
    }
    let ratio = nside_in / nside_out;
    ratio
        .checked_mul(ratio)
        .ok_or_else(|| HealpixError::Resolution(format!("ratio {} overflows block size", ratio)))
}

/// Output resolution of an upsampling by `factor`.
pub fn upsampled(nside_in: usize, factor: usize) -> Result<usize> {
    if nside_in == 0 || factor == 0 {
        return Err(HealpixError::Resolution(format!(
            "upsampling needs positive nside and factor (got {} x {})",
            nside_in, factor
        )));
    }
    nside_in.checked_mul(factor).ok_or_else(|| {
        HealpixError::Resolution(format!("nside {} x {} overflows", nside_in, factor))
    })
}
