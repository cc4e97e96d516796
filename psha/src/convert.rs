//! Conversion helpers between index and floating-point types.

/// Converts `x` into a `usize`, clamping negative values to `0`.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[must_use]
pub fn usize_from_f64(x: f64) -> usize {
    x.max(0.0) as usize
}

/// Converts `x` into an `f64`. Panics if `x` does not fit into 32 bits, in
/// which case the conversion would be lossy.
///
/// # Panics
///
/// Panics if `x` is larger than `u32::MAX`.
#[must_use]
pub fn f64_from_usize(x: usize) -> f64 {
    f64::from(u32::try_from(x).unwrap())
}
