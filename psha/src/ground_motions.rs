//! Module containing the per-source ground-motion tables.

use super::error::{Error, Result};
use super::gmm::{Gmm, GroundMotion};
use super::imt::Imt;
use super::inputs::InputList;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// The ground motions of one input list: for every `(imt, gmm)` pair of the
/// parent source set, dense μ and σ arrays 1:1 with the inputs.
#[derive(Clone, Debug)]
pub struct GroundMotions {
    inputs: Arc<InputList>,
    imts: Vec<Imt>,
    gmms: Vec<Gmm>,
    means: FxHashMap<(Imt, Gmm), Box<[f64]>>,
    sigmas: FxHashMap<(Imt, Gmm), Box<[f64]>>,
}

impl GroundMotions {
    /// Returns the input list this table was built over.
    #[must_use]
    pub fn inputs(&self) -> &Arc<InputList> {
        &self.inputs
    }

    /// Returns the IMTs of this table.
    #[must_use]
    pub fn imts(&self) -> &[Imt] {
        &self.imts
    }

    /// Returns the models of this table.
    #[must_use]
    pub fn gmms(&self) -> &[Gmm] {
        &self.gmms
    }

    /// Returns the μ and σ arrays for `(imt, gmm)`, or `None` if the pair is
    /// not part of this table.
    #[must_use]
    pub fn arrays(&self, imt: Imt, gmm: Gmm) -> Option<(&[f64], &[f64])> {
        let means = self.means.get(&(imt, gmm))?;
        let sigmas = self.sigmas.get(&(imt, gmm))?;
        Some((means, sigmas))
    }

    /// Splices the tables of consecutive partitions of `master` back into
    /// one table over `master`. Array segments are moved, not recomputed, so
    /// the combined table is exactly the table a single pass over `master`
    /// would have produced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the parts cover a different
    /// number of inputs than `master` or disagree on their IMT or model
    /// sets.
    pub fn combine(master: Arc<InputList>, parts: &[Self]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(Error::ShapeMismatch {
                expected: format!("{} inputs", master.len()),
                found: "no partitions".to_string(),
            });
        };

        let covered: usize = parts.iter().map(|part| part.inputs.len()).sum();
        if covered != master.len() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} inputs", master.len()),
                found: format!("{covered} inputs across {} partitions", parts.len()),
            });
        }

        let imts = first.imts.clone();
        let gmms = first.gmms.clone();

        if parts
            .iter()
            .any(|part| part.imts != imts || part.gmms != gmms)
        {
            return Err(Error::ShapeMismatch {
                expected: "identical (imt, gmm) keys across partitions".to_string(),
                found: "diverging keys".to_string(),
            });
        }

        let mut means = FxHashMap::default();
        let mut sigmas = FxHashMap::default();

        for &imt in &imts {
            for &gmm in &gmms {
                let mut mean = Vec::with_capacity(master.len());
                let mut sigma = Vec::with_capacity(master.len());

                for part in parts {
                    // key presence was checked against the shared key sets
                    let (m, s) = part.arrays(imt, gmm).ok_or_else(|| Error::ShapeMismatch {
                        expected: format!("array for ({imt}, {gmm})"),
                        found: "missing array".to_string(),
                    })?;
                    mean.extend_from_slice(m);
                    sigma.extend_from_slice(s);
                }

                means.insert((imt, gmm), mean.into_boxed_slice());
                sigmas.insert((imt, gmm), sigma.into_boxed_slice());
            }
        }

        Ok(Self {
            inputs: master,
            imts,
            gmms,
            means,
            sigmas,
        })
    }
}

/// Incremental builder for [`GroundMotions`].
///
/// Every `(imt, gmm, index)` slot must be set exactly once; `build` checks
/// the call count against `|imts| · |gmms| · |inputs|` and rejects
/// non-finite entries.
#[derive(Debug)]
pub struct GroundMotionsBuilder {
    inputs: Arc<InputList>,
    imts: Vec<Imt>,
    gmms: Vec<Gmm>,
    means: FxHashMap<(Imt, Gmm), Box<[f64]>>,
    sigmas: FxHashMap<(Imt, Gmm), Box<[f64]>>,
    sets: usize,
}

impl GroundMotionsBuilder {
    /// Creates a builder for the given inputs and `(imt, gmm)` key sets.
    #[must_use]
    pub fn new(inputs: Arc<InputList>, imts: Vec<Imt>, gmms: Vec<Gmm>) -> Self {
        let mut means = FxHashMap::default();
        let mut sigmas = FxHashMap::default();

        for &imt in &imts {
            for &gmm in &gmms {
                means.insert((imt, gmm), vec![f64::NAN; inputs.len()].into_boxed_slice());
                sigmas.insert((imt, gmm), vec![f64::NAN; inputs.len()].into_boxed_slice());
            }
        }

        Self {
            inputs,
            imts,
            gmms,
            means,
            sigmas,
            sets: 0,
        }
    }

    /// Sets the ground motion of input `index` under `(imt, gmm)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuilderMisuse`] if the pair is not part of this
    /// table or `index` is out of bounds.
    pub fn set(&mut self, imt: Imt, gmm: Gmm, index: usize, gm: GroundMotion) -> Result<()> {
        if index >= self.inputs.len() {
            return Err(Error::misuse(format!(
                "input index {index} beyond {} inputs of '{}'",
                self.inputs.len(),
                self.inputs.parent_name()
            )));
        }

        let mean = self
            .means
            .get_mut(&(imt, gmm))
            .ok_or_else(|| Error::misuse(format!("({imt}, {gmm}) not part of this table")))?;
        mean[index] = gm.mean;

        let sigma = self
            .sigmas
            .get_mut(&(imt, gmm))
            .ok_or_else(|| Error::misuse(format!("({imt}, {gmm}) not part of this table")))?;
        sigma[index] = gm.sigma;

        self.sets += 1;
        Ok(())
    }

    /// Freezes the table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuilderMisuse`] if the number of `set` calls differs
    /// from `|imts| · |gmms| · |inputs|`, or [`Error::NumericFault`] if any
    /// entry is non-finite.
    pub fn build(self) -> Result<GroundMotions> {
        let expected = self.imts.len() * self.gmms.len() * self.inputs.len();
        if self.sets != expected {
            return Err(Error::misuse(format!(
                "{} of {expected} ground motions set for '{}'",
                self.sets,
                self.inputs.parent_name()
            )));
        }

        for ((imt, gmm), mean) in &self.means {
            let sigma = &self.sigmas[&(*imt, *gmm)];
            if mean.iter().chain(sigma.iter()).any(|v| !v.is_finite()) {
                return Err(Error::numeric(format!(
                    "ground motions of '{}' under ({imt}, {gmm})",
                    self.inputs.parent_name()
                )));
            }
        }

        Ok(GroundMotions {
            inputs: self.inputs,
            imts: self.imts,
            gmms: self.gmms,
            means: self.means,
            sigmas: self.sigmas,
        })
    }
}

/// The ground motions of one cluster source: an ordered table per fault
/// variant, tagged with the cluster identity.
#[derive(Clone, Debug)]
pub struct ClusterGroundMotions {
    cluster_name: String,
    rate: f64,
    weight: f64,
    variants: Vec<GroundMotions>,
}

impl ClusterGroundMotions {
    /// Creates the container from per-variant tables.
    #[must_use]
    pub fn new(
        cluster_name: impl Into<String>,
        rate: f64,
        weight: f64,
        variants: Vec<GroundMotions>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            rate,
            weight,
            variants,
        }
    }

    /// Returns the cluster name.
    #[must_use]
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Returns the annual rate of the cluster event.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the logic-tree weight of the cluster.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Returns the per-variant tables.
    #[must_use]
    pub fn variants(&self) -> &[GroundMotions] {
        &self.variants
    }

    /// Returns the minimum distance across all variants.
    #[must_use]
    pub fn min_distance(&self) -> f64 {
        self.variants
            .iter()
            .map(|gms| gms.inputs().min_distance())
            .fold(f64::INFINITY, f64::min)
    }
}
