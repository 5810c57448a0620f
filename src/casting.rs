//! Safe numeric casting utilities for raster resampling and dataset handling.
//!
//! # Assumptions
//!
//! ## Image Dimensions (`usize` ↔ `f64`)
//! Dimensions and row counts are converted to `f64` without checks. `f64`
//! represents every integer up to 2^53 exactly, far beyond any raster that
//! fits in memory.
//!
//! ## Pixel Coordinates (`f64` → `usize`)
//! Float-to-integer conversions for pixel indices require bounds checking
//! because the float may be negative, NaN or past the last pixel.
//!
//! ## TIFF Header Fields (`usize` → `u32`)
//! TIFF stores image dimensions as `u32`; larger grids are rejected.

use std::convert::TryFrom;

/// Convert a `usize` to `u32`, failing on 64-bit overflow.
///
/// # Errors
/// Returns an error string if the value exceeds `u32::MAX`.
#[inline]
pub fn usize_to_u32(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("Value {value} exceeds u32 maximum"))
}

/// Convert a `u32` TIFF field to `usize`.
#[inline]
#[must_use]
pub fn u32_to_usize(value: u32) -> usize {
    // u32 always fits in usize on the 32/64-bit targets we build for
    value as usize
}

/// Floor a fractional pixel coordinate to a signed index.
///
/// Returns `None` for NaN or values outside the `isize` range.
#[inline]
#[must_use]
pub fn f64_floor_to_isize(value: f64) -> Option<isize> {
    let floored = value.floor();
    #[allow(clippy::cast_precision_loss)]
    let in_range = floored >= isize::MIN as f64 && floored <= isize::MAX as f64;
    if value.is_nan() || !in_range {
        return None;
    }
    // Safety: range checked above
    #[allow(clippy::cast_possible_truncation)]
    Some(floored as isize)
}

/// Number of rows a `fraction` of `total` rows amounts to, rounded down.
///
/// `fraction` is expected in `[0, 1]`; the result never exceeds `total`.
#[inline]
#[must_use]
pub fn fraction_of(total: usize, fraction: f64) -> usize {
    #[allow(clippy::cast_precision_loss)]
    let exact = (total as f64 * fraction).floor();
    if exact.is_nan() || exact <= 0.0 {
        return 0;
    }
    // Safety: exact is positive and finite
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = exact as usize;
    count.min(total)
}
