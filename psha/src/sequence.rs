//! Module containing the intensity sequence, the curve container all hazard
//! results are built from.

use super::error::{Error, Result};
use std::sync::Arc;

/// An ordered sequence of `(x, y)` pairs over a strictly increasing x-grid.
///
/// All sequences for one IMT share their x-grid by reference; arithmetic is
/// y-value only and requires both operands to hold the *same* grid, not
/// merely an equal one. Cloning a sequence copies the y-values and shares the
/// grid.
#[derive(Clone, Debug, PartialEq)]
pub struct IntensitySequence {
    xs: Arc<[f64]>,
    ys: Vec<f64>,
}

impl IntensitySequence {
    /// Creates a sequence over `xs` with all y-values zero.
    ///
    /// # Panics
    ///
    /// Panics if `xs` is empty or not strictly increasing.
    #[must_use]
    pub fn zeroed(xs: Arc<[f64]>) -> Self {
        assert!(!xs.is_empty());
        assert!(xs.windows(2).all(|w| w[0] < w[1]));

        let ys = vec![0.0; xs.len()];
        Self { xs, ys }
    }

    /// Creates a sequence from a grid and matching y-values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the lengths differ.
    pub fn from_parts(xs: Arc<[f64]>, ys: Vec<f64>) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} y-values", xs.len()),
                found: format!("{}", ys.len()),
            });
        }

        Ok(Self { xs, ys })
    }

    /// Returns the x-grid.
    #[must_use]
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Returns the y-values.
    #[must_use]
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Returns the shared handle to the x-grid.
    #[must_use]
    pub fn grid(&self) -> &Arc<[f64]> {
        &self.xs
    }

    /// Returns `true` if `self` and `other` share their x-grid by identity.
    #[must_use]
    pub fn shares_grid(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.xs, &other.xs)
    }

    /// Adds the y-values of `other` to the y-values of `self`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the operands do not share their
    /// x-grid by identity.
    pub fn add(&mut self, other: &Self) -> Result<()> {
        self.check_grid(other)?;

        for (y, o) in self.ys.iter_mut().zip(&other.ys) {
            *y += o;
        }

        Ok(())
    }

    /// Adds the y-values of `other`, scaled by `factor`, to the y-values of
    /// `self`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the operands do not share their
    /// x-grid by identity.
    pub fn add_scaled(&mut self, other: &Self, factor: f64) -> Result<()> {
        self.check_grid(other)?;

        for (y, o) in self.ys.iter_mut().zip(&other.ys) {
            *y = o.mul_add(factor, *y);
        }

        Ok(())
    }

    /// Scales every y-value by `factor`.
    pub fn multiply(&mut self, factor: f64) {
        for y in &mut self.ys {
            *y *= factor;
        }
    }

    /// Returns a clone with all y-values reset to zero.
    #[must_use]
    pub fn empty_copy(&self) -> Self {
        Self {
            xs: Arc::clone(&self.xs),
            ys: vec![0.0; self.ys.len()],
        }
    }

    /// Resets all y-values to zero.
    pub fn clear(&mut self) {
        for y in &mut self.ys {
            *y = 0.0;
        }
    }

    /// Returns `true` if every y-value is finite.
    #[must_use]
    pub fn all_finite(&self) -> bool {
        self.ys.iter().all(|y| y.is_finite())
    }

    /// Interpolates the y-value at `x`, log-linear in x and linear in y.
    /// Outside the grid the terminal segment is extrapolated.
    ///
    /// # Panics
    ///
    /// Panics if `x` is not positive; the grids this crate builds are
    /// strictly positive intensity levels.
    #[must_use]
    pub fn interpolate(&self, x: f64) -> f64 {
        assert!(x > 0.0);

        if self.xs.len() == 1 {
            return self.ys[0];
        }

        // index of the left node of the bracketing (or terminal) segment
        let hi = match self
            .xs
            .binary_search_by(|probe| probe.partial_cmp(&x).unwrap())
        {
            Ok(i) => return self.ys[i],
            Err(i) => i.clamp(1, self.xs.len() - 1),
        };
        let lo = hi - 1;

        let fraction = (x.ln() - self.xs[lo].ln()) / (self.xs[hi].ln() - self.xs[lo].ln());
        fraction.mul_add(self.ys[hi] - self.ys[lo], self.ys[lo])
    }

    fn check_grid(&self, other: &Self) -> Result<()> {
        if self.shares_grid(other) {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                expected: format!("shared x-grid of {} levels", self.xs.len()),
                found: format!("distinct x-grid of {} levels", other.xs.len()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn grid() -> Arc<[f64]> {
        vec![0.001, 0.01, 0.1, 1.0].into()
    }

    #[test]
    fn add_requires_grid_identity() {
        let xs = grid();
        let mut a = IntensitySequence::zeroed(Arc::clone(&xs));
        let b = IntensitySequence::from_parts(xs, vec![1.0; 4]).unwrap();

        a.add(&b).unwrap();
        assert_eq!(a.ys(), [1.0; 4]);

        // an equal but distinct grid must be rejected
        let c = IntensitySequence::zeroed(grid());
        assert!(matches!(a.add(&c), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn add_scaled_and_multiply() {
        let xs = grid();
        let mut a = IntensitySequence::zeroed(Arc::clone(&xs));
        let b = IntensitySequence::from_parts(xs, vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        a.add_scaled(&b, 0.5).unwrap();
        a.multiply(2.0);
        assert_eq!(a.ys(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn clone_shares_grid_but_not_values() {
        let a = IntensitySequence::from_parts(grid(), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut b = a.clone();

        assert!(a.shares_grid(&b));
        b.clear();
        assert_eq!(a.ys(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(b.ys(), [0.0; 4]);
    }

    #[test]
    fn interpolate_log_x() {
        let seq = IntensitySequence::from_parts(grid(), vec![8.0, 4.0, 2.0, 1.0]).unwrap();

        // nodes are hit exactly
        assert_approx_eq!(f64, seq.interpolate(0.01), 4.0, ulps = 2);
        // geometric midpoint of [0.01, 0.1] maps to the arithmetic midpoint in y
        let mid = (0.01_f64 * 0.1).sqrt();
        assert_approx_eq!(f64, seq.interpolate(mid), 3.0, epsilon = 1e-12);
        // beyond the grid the terminal segment extrapolates
        assert!(seq.interpolate(10.0) < 1.0);
    }
}
