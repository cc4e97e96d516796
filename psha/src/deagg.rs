//! Module containing the deaggregator: rebinning of hazard-rate
//! contributions at one intensity level into a (distance, magnitude,
//! epsilon) volume, with per-source and per-source-set tallies.

use super::config::{CalcConfig, DeaggConfig};
use super::convert::usize_from_f64;
use super::curves::{Hazard, HazardCurveSet, SourceCurves};
use super::error::{Error, Result};
use super::exceedance::epsilon;
use super::gmm::Gmm;
use super::ground_motions::GroundMotions;
use super::imt::Imt;
use super::model::SourceType;
use itertools::izip;
use ndarray::{Array2, Array3};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// The immutable discretization of the (r, m, ε) volume: lower edges and
/// bin widths for each axis.
///
/// Indices follow the floor rule `⌊(v − min) / Δ⌋`: a value at an interior
/// bin's upper edge lands in the next bin, and values outside the covered
/// range have no index and are tallied as residual.
#[derive(Clone, Debug, PartialEq)]
pub struct DeaggBinModel {
    r_min: f64,
    delta_r: f64,
    nr: usize,
    m_min: f64,
    delta_m: f64,
    nm: usize,
    eps_min: f64,
    delta_eps: f64,
    ne: usize,
}

impl DeaggBinModel {
    /// Builds the bin model from a deaggregation configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] for empty ranges or non-positive
    /// widths.
    pub fn new(config: &DeaggConfig) -> Result<Self> {
        config_bins("distance", config.r_min, config.r_max, config.delta_r)?;
        config_bins("magnitude", config.m_min, config.m_max, config.delta_m)?;
        config_bins("epsilon", config.eps_min, config.eps_max, config.delta_eps)?;

        Ok(Self {
            r_min: config.r_min,
            delta_r: config.delta_r,
            nr: bin_count(config.r_min, config.r_max, config.delta_r),
            m_min: config.m_min,
            delta_m: config.delta_m,
            nm: bin_count(config.m_min, config.m_max, config.delta_m),
            eps_min: config.eps_min,
            delta_eps: config.delta_eps,
            ne: bin_count(config.eps_min, config.eps_max, config.delta_eps),
        })
    }

    /// Returns the shape `(nr, nm, nε)` of the rate volume.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize, usize) {
        (self.nr, self.nm, self.ne)
    }

    /// Returns the distance bin of `r`, or `None` outside the range.
    #[must_use]
    pub fn distance_index(&self, r: f64) -> Option<usize> {
        axis_index(r, self.r_min, self.delta_r, self.nr)
    }

    /// Returns the magnitude bin of `m`, or `None` outside the range.
    #[must_use]
    pub fn magnitude_index(&self, m: f64) -> Option<usize> {
        axis_index(m, self.m_min, self.delta_m, self.nm)
    }

    /// Returns the epsilon bin of `eps`, or `None` outside the range.
    #[must_use]
    pub fn epsilon_index(&self, eps: f64) -> Option<usize> {
        axis_index(eps, self.eps_min, self.delta_eps, self.ne)
    }

    /// Returns the `(ir, im, iε)` index of a contribution, or `None` if any
    /// axis is out of range, in which case the contribution is residual.
    #[must_use]
    pub fn index(&self, r: f64, m: f64, eps: f64) -> Option<(usize, usize, usize)> {
        Some((
            self.distance_index(r)?,
            self.magnitude_index(m)?,
            self.epsilon_index(eps)?,
        ))
    }

    /// Returns the lower edge of distance bin `ir`.
    #[must_use]
    pub fn distance_edge(&self, ir: usize) -> f64 {
        self.delta_r
            .mul_add(super::convert::f64_from_usize(ir), self.r_min)
    }

    /// Returns the lower edge of magnitude bin `im`.
    #[must_use]
    pub fn magnitude_edge(&self, im: usize) -> f64 {
        self.delta_m
            .mul_add(super::convert::f64_from_usize(im), self.m_min)
    }

    /// Returns the lower edge of epsilon bin `iε`.
    #[must_use]
    pub fn epsilon_edge(&self, ie: usize) -> f64 {
        self.delta_eps
            .mul_add(super::convert::f64_from_usize(ie), self.eps_min)
    }
}

fn config_bins(name: &str, min: f64, max: f64, delta: f64) -> Result<()> {
    if !(min.is_finite() && max > min && delta > 0.0) {
        return Err(Error::config(format!(
            "{name} bins [{min}, {max}] with width {delta}"
        )));
    }
    Ok(())
}

fn bin_count(min: f64, max: f64, delta: f64) -> usize {
    usize_from_f64(((max - min) / delta).ceil())
}

fn axis_index(value: f64, min: f64, delta: f64, bins: usize) -> Option<usize> {
    let offset = (value - min) / delta;
    if offset < 0.0 || !offset.is_finite() {
        return None;
    }

    let index = usize_from_f64(offset);
    (index < bins).then_some(index)
}

/// The rate one source contributed to a deaggregation dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceContribution {
    /// The source name.
    pub name: String,
    /// Rate that landed inside the binned volume.
    pub rate: f64,
    /// Rate that fell outside the bin ranges.
    pub skip_rate: f64,
}

/// A frozen deaggregation dataset: the sparse rate volume, the weighted-mean
/// and per-bin position accumulators, the residual rate, and the per-source
/// contributions ranked by rate.
#[derive(Clone, Debug)]
pub struct DeaggDataset {
    bins: Arc<DeaggBinModel>,
    rme: Array3<f64>,
    r_bar: f64,
    m_bar: f64,
    e_bar: f64,
    bar_weight: f64,
    r_positions: Array2<f64>,
    m_positions: Array2<f64>,
    position_weights: Array2<f64>,
    residual: f64,
    contributions: Vec<SourceContribution>,
}

impl DeaggDataset {
    /// Returns the bin model of this dataset.
    #[must_use]
    pub const fn bins(&self) -> &Arc<DeaggBinModel> {
        &self.bins
    }

    /// Returns the rate volume, indexed `[ir, im, iε]`.
    #[must_use]
    pub const fn rate_volume(&self) -> &Array3<f64> {
        &self.rme
    }

    /// Returns the rate summed over the binned volume.
    #[must_use]
    pub fn binned_rate(&self) -> f64 {
        self.rme.sum()
    }

    /// Returns the rate that fell outside the bin ranges.
    #[must_use]
    pub const fn residual(&self) -> f64 {
        self.residual
    }

    /// Returns the total rate, binned plus residual.
    #[must_use]
    pub fn total_rate(&self) -> f64 {
        self.binned_rate() + self.residual
    }

    /// Returns the rate-weighted mean distance of the binned contributions,
    /// `NaN` when nothing was binned.
    #[must_use]
    pub fn mean_distance(&self) -> f64 {
        self.r_bar / self.bar_weight
    }

    /// Returns the rate-weighted mean magnitude of the binned
    /// contributions, `NaN` when nothing was binned.
    #[must_use]
    pub fn mean_magnitude(&self) -> f64 {
        self.m_bar / self.bar_weight
    }

    /// Returns the rate-weighted mean epsilon of the binned contributions,
    /// `NaN` when nothing was binned.
    #[must_use]
    pub fn mean_epsilon(&self) -> f64 {
        self.e_bar / self.bar_weight
    }

    /// Returns the rate binned over the (r, m) plane, the weights of the
    /// per-bin display positions.
    #[must_use]
    pub const fn position_weights(&self) -> &Array2<f64> {
        &self.position_weights
    }

    /// Returns the per-bin display positions `(r̂, m̂)`: the rate-weighted
    /// mean distance and magnitude of each (r, m) bin, `NaN` where the bin
    /// holds no rate.
    #[must_use]
    pub fn position_means(&self) -> (Array2<f64>, Array2<f64>) {
        (
            &self.r_positions / &self.position_weights,
            &self.m_positions / &self.position_weights,
        )
    }

    /// Returns the per-source contributions, ranked by binned rate
    /// descending.
    #[must_use]
    pub fn contributions(&self) -> &[SourceContribution] {
        &self.contributions
    }

    /// Returns the `limit` largest per-source contributions.
    #[must_use]
    pub fn top_contributions(&self, limit: usize) -> &[SourceContribution] {
        &self.contributions[..limit.min(self.contributions.len())]
    }
}

/// Accumulating builder for [`DeaggDataset`].
#[derive(Clone, Debug)]
pub struct DeaggDatasetBuilder {
    bins: Arc<DeaggBinModel>,
    rme: Array3<f64>,
    r_bar: f64,
    m_bar: f64,
    e_bar: f64,
    bar_weight: f64,
    r_positions: Array2<f64>,
    m_positions: Array2<f64>,
    position_weights: Array2<f64>,
    residual: f64,
    contributions: Vec<SourceContribution>,
}

impl DeaggDatasetBuilder {
    /// Creates an empty builder over `bins`.
    #[must_use]
    pub fn new(bins: Arc<DeaggBinModel>) -> Self {
        let (nr, nm, ne) = bins.shape();

        Self {
            bins,
            rme: Array3::zeros((nr, nm, ne)),
            r_bar: 0.0,
            m_bar: 0.0,
            e_bar: 0.0,
            bar_weight: 0.0,
            r_positions: Array2::zeros((nr, nm)),
            m_positions: Array2::zeros((nr, nm)),
            position_weights: Array2::zeros((nr, nm)),
            residual: 0.0,
            contributions: Vec::new(),
        }
    }

    /// Accumulates one rupture contribution. Returns `true` if the
    /// contribution was binned, `false` if it went to the residual.
    pub fn add_rupture(&mut self, r: f64, m: f64, eps: f64, rate: f64) -> bool {
        let Some((ir, im, ie)) = self.bins.index(r, m, eps) else {
            self.residual += rate;
            return false;
        };

        self.rme[[ir, im, ie]] += rate;
        self.r_bar = r.mul_add(rate, self.r_bar);
        self.m_bar = m.mul_add(rate, self.m_bar);
        self.e_bar = eps.mul_add(rate, self.e_bar);
        self.bar_weight += rate;
        self.r_positions[[ir, im]] += r * rate;
        self.m_positions[[ir, im]] += m * rate;
        self.position_weights[[ir, im]] += rate;
        true
    }

    /// Appends the tally of one source.
    pub fn add_contribution(&mut self, name: &str, rate: f64, skip_rate: f64) {
        if let Some(existing) = self
            .contributions
            .iter_mut()
            .find(|contribution| contribution.name == name)
        {
            existing.rate += rate;
            existing.skip_rate += skip_rate;
        } else {
            self.contributions.push(SourceContribution {
                name: name.to_string(),
                rate,
                skip_rate,
            });
        }
    }

    /// Scales every bin, accumulator and contribution by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.rme *= factor;
        self.r_bar *= factor;
        self.m_bar *= factor;
        self.e_bar *= factor;
        self.bar_weight *= factor;
        self.r_positions *= factor;
        self.m_positions *= factor;
        self.position_weights *= factor;
        self.residual *= factor;

        for contribution in &mut self.contributions {
            contribution.rate *= factor;
            contribution.skip_rate *= factor;
        }
    }

    /// Adds a frozen dataset bin-by-bin and accumulator-by-accumulator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] unless both sides hold the same bin
    /// model.
    pub fn merge(&mut self, other: &DeaggDataset) -> Result<()> {
        if !Arc::ptr_eq(&self.bins, &other.bins) {
            return Err(Error::ShapeMismatch {
                expected: format!("shared bin model of shape {:?}", self.bins.shape()),
                found: format!("distinct bin model of shape {:?}", other.bins.shape()),
            });
        }

        self.rme += &other.rme;
        self.r_bar += other.r_bar;
        self.m_bar += other.m_bar;
        self.e_bar += other.e_bar;
        self.bar_weight += other.bar_weight;
        self.r_positions += &other.r_positions;
        self.m_positions += &other.m_positions;
        self.position_weights += &other.position_weights;
        self.residual += other.residual;

        for contribution in &other.contributions {
            self.add_contribution(&contribution.name, contribution.rate, contribution.skip_rate);
        }

        Ok(())
    }

    /// Returns the rate binned so far.
    #[must_use]
    pub const fn binned_rate(&self) -> f64 {
        self.bar_weight
    }

    /// Returns the rate tallied as residual so far.
    #[must_use]
    pub const fn residual(&self) -> f64 {
        self.residual
    }

    /// Returns the total rate accumulated so far, binned plus residual.
    #[must_use]
    pub const fn total_rate(&self) -> f64 {
        self.bar_weight + self.residual
    }

    /// Freezes the dataset, ranking the per-source contributions by rate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NumericFault`] if any accumulator is non-finite.
    pub fn build(mut self) -> Result<DeaggDataset> {
        let finite = self.rme.iter().all(|rate| rate.is_finite())
            && self.position_weights.iter().all(|rate| rate.is_finite())
            && [self.r_bar, self.m_bar, self.e_bar, self.bar_weight, self.residual]
                .iter()
                .all(|value| value.is_finite());
        if !finite {
            return Err(Error::numeric("deaggregation accumulators"));
        }

        self.contributions.sort_by(|left, right| {
            right
                .rate
                .partial_cmp(&left.rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(DeaggDataset {
            bins: self.bins,
            rme: self.rme,
            r_bar: self.r_bar,
            m_bar: self.m_bar,
            e_bar: self.e_bar,
            bar_weight: self.bar_weight,
            r_positions: self.r_positions,
            m_positions: self.m_positions,
            position_weights: self.position_weights,
            residual: self.residual,
            contributions: self.contributions,
        })
    }
}

/// A full deaggregation: per-model datasets within each source type,
/// per-model totals across types, and the grand total.
#[derive(Clone, Debug)]
pub struct Deagg {
    imt: Imt,
    iml: f64,
    by_type: BTreeMap<SourceType, BTreeMap<Gmm, DeaggDataset>>,
    by_gmm: BTreeMap<Gmm, DeaggDataset>,
    total: DeaggDataset,
}

impl Deagg {
    /// Returns the IMT this deaggregation was computed for.
    #[must_use]
    pub const fn imt(&self) -> Imt {
        self.imt
    }

    /// Returns the target intensity level.
    #[must_use]
    pub const fn iml(&self) -> f64 {
        self.iml
    }

    /// Returns the per-model datasets grouped by source type.
    #[must_use]
    pub const fn by_type(&self) -> &BTreeMap<SourceType, BTreeMap<Gmm, DeaggDataset>> {
        &self.by_type
    }

    /// Returns the per-model datasets summed across source types.
    #[must_use]
    pub const fn by_gmm(&self) -> &BTreeMap<Gmm, DeaggDataset> {
        &self.by_gmm
    }

    /// Returns the grand-total dataset.
    #[must_use]
    pub const fn total(&self) -> &DeaggDataset {
        &self.total
    }
}

/// Deaggregates `hazard` at intensity `iml` of `imt`.
///
/// # Errors
///
/// Returns [`Error::ConfigInvalid`] for a non-positive `iml` or an IMT the
/// hazard was not computed for; numeric and shape faults propagate from the
/// datasets.
pub fn deaggregate(hazard: &Hazard, imt: Imt, iml: f64) -> Result<Deagg> {
    if !(iml > 0.0 && iml.is_finite()) {
        return Err(Error::config(format!("deagg intensity {iml} not positive")));
    }
    if hazard.total_curve(imt).is_none() {
        return Err(Error::config(format!("hazard holds no curves for {imt}")));
    }

    let config = hazard.config();
    let bins = Arc::new(DeaggBinModel::new(&config.deagg)?);

    let mut by_type = BTreeMap::new();
    let mut by_gmm_builders: BTreeMap<Gmm, DeaggDatasetBuilder> = BTreeMap::new();
    let mut total_builder = DeaggDatasetBuilder::new(Arc::clone(&bins));

    for (&kind, sets) in hazard.curve_sets() {
        let mut kind_builders: BTreeMap<Gmm, DeaggDatasetBuilder> = BTreeMap::new();

        for set in sets {
            for (gmm, dataset) in deagg_curve_set(set, config, &bins, imt, iml)? {
                kind_builders
                    .entry(gmm)
                    .or_insert_with(|| DeaggDatasetBuilder::new(Arc::clone(&bins)))
                    .merge(&dataset)?;
                by_gmm_builders
                    .entry(gmm)
                    .or_insert_with(|| DeaggDatasetBuilder::new(Arc::clone(&bins)))
                    .merge(&dataset)?;
                total_builder.merge(&dataset)?;
            }
        }

        let mut datasets = BTreeMap::new();
        for (gmm, builder) in kind_builders {
            datasets.insert(gmm, builder.build()?);
        }
        by_type.insert(kind, datasets);
    }

    let mut by_gmm = BTreeMap::new();
    for (gmm, builder) in by_gmm_builders {
        by_gmm.insert(gmm, builder.build()?);
    }
    let total = total_builder.build()?;

    debug!(%imt, iml, rate = total.total_rate(), "deaggregation complete");

    Ok(Deagg {
        imt,
        iml,
        by_type,
        by_gmm,
        total,
    })
}

/// Deaggregates one curve set into per-model datasets.
///
/// # Errors
///
/// Propagates numeric and shape faults from the dataset builders.
pub fn deagg_curve_set(
    set: &HazardCurveSet,
    config: &CalcConfig,
    bins: &Arc<DeaggBinModel>,
    imt: Imt,
    iml: f64,
) -> Result<BTreeMap<Gmm, DeaggDataset>> {
    let mut builders: BTreeMap<Gmm, DeaggDatasetBuilder> = set
        .gmms()
        .gmms()
        .iter()
        .map(|&gmm| (gmm, DeaggDatasetBuilder::new(Arc::clone(bins))))
        .collect();

    for source in set.sources() {
        match source {
            SourceCurves::Plain(plain) => {
                deagg_plain_source(
                    plain.ground_motions(),
                    plain.parent_name(),
                    set,
                    config,
                    &mut builders,
                    imt,
                    iml,
                )?;
            }
            SourceCurves::Cluster(cluster) => {
                // naive per-variant rates do not match the probabilistic-OR
                // curve, so each cluster is accumulated separately and
                // rescaled to the interpolated curve rate at iml
                let cgms = cluster.ground_motions();
                let weights = set.gmms().weights(cluster.min_distance());

                for &(gmm, weight) in weights {
                    let applied = set.weight() * weight * cgms.weight();
                    let mut builder = DeaggDatasetBuilder::new(Arc::clone(bins));

                    for variant in cgms.variants() {
                        accumulate_ruptures(variant, config, &mut builder, imt, iml, applied, gmm)?;
                    }

                    let curve = cluster.curve(imt, gmm).ok_or_else(|| {
                        Error::misuse(format!(
                            "cluster '{}' retained no curve for ({imt}, {gmm})",
                            cluster.parent_name()
                        ))
                    })?;
                    let target = applied * curve.interpolate(iml);

                    let accumulated = builder.total_rate();
                    if accumulated > 0.0 {
                        builder.scale(target / accumulated);
                    }

                    builder.add_contribution(
                        cluster.parent_name(),
                        builder.binned_rate(),
                        builder.residual(),
                    );

                    let dataset = builder.build()?;
                    builders
                        .get_mut(&gmm)
                        .ok_or_else(|| {
                            Error::misuse(format!("{gmm} not part of the source set"))
                        })?
                        .merge(&dataset)?;
                }
            }
        }
    }

    let mut datasets = BTreeMap::new();
    for (gmm, builder) in builders {
        datasets.insert(gmm, builder.build()?);
    }
    Ok(datasets)
}

/// Accumulates every input of one plain source into the per-model builders
/// and appends the source tally.
fn deagg_plain_source(
    gms: &GroundMotions,
    parent: &str,
    set: &HazardCurveSet,
    config: &CalcConfig,
    builders: &mut BTreeMap<Gmm, DeaggDatasetBuilder>,
    imt: Imt,
    iml: f64,
) -> Result<()> {
    let weights = set.gmms().weights(gms.inputs().min_distance());

    for &(gmm, weight) in weights {
        let builder = builders
            .get_mut(&gmm)
            .ok_or_else(|| Error::misuse(format!("{gmm} not part of the source set")))?;

        let before_binned = builder.binned_rate();
        let before_residual = builder.residual();

        accumulate_ruptures(gms, config, builder, imt, iml, set.weight() * weight, gmm)?;

        builder.add_contribution(
            parent,
            builder.binned_rate() - before_binned,
            builder.residual() - before_residual,
        );
    }

    Ok(())
}

/// Accumulates the inputs of one ground-motion table under one model:
/// `rate = exceedance · input rate · applied weight`, binned at
/// `(r_rup, mag, ε)`.
fn accumulate_ruptures(
    gms: &GroundMotions,
    config: &CalcConfig,
    builder: &mut DeaggDatasetBuilder,
    imt: Imt,
    iml: f64,
    applied_weight: f64,
    gmm: Gmm,
) -> Result<()> {
    let (means, sigmas) = gms.arrays(imt, gmm).ok_or_else(|| {
        Error::misuse(format!(
            "ground motions of '{}' missing ({imt}, {gmm})",
            gms.inputs().parent_name()
        ))
    })?;

    for (input, &mean, &sigma) in izip!(gms.inputs().iter(), means, sigmas) {
        let poe = config
            .exceedance
            .exceedance(mean, sigma, config.truncation, imt, iml);
        let rate = poe * input.rate * applied_weight;
        let eps = epsilon(mean, sigma, iml);

        builder.add_rupture(input.r_rup, input.mag, eps, rate);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn bins() -> Arc<DeaggBinModel> {
        Arc::new(DeaggBinModel::new(&DeaggConfig::default()).unwrap())
    }

    #[test]
    fn shape_follows_config() {
        assert_eq!(bins().shape(), (20, 25, 12));
    }

    #[test]
    fn floor_rule_places_upper_edge_in_next_bin() {
        let bins = bins();

        // interior edges belong to the bin on their right
        assert_eq!(bins.distance_index(9.999), Some(0));
        assert_eq!(bins.distance_index(10.0), Some(1));
        assert_eq!(bins.magnitude_index(4.6), Some(1));

        // the overall bounds are residual
        assert_eq!(bins.distance_index(200.0), None);
        assert_eq!(bins.distance_index(-0.1), None);
        assert_eq!(bins.epsilon_index(3.0), None);
        assert_eq!(bins.epsilon_index(-3.2), None);
    }

    #[test]
    fn out_of_range_contribution_is_residual_not_fatal() {
        let mut builder = DeaggDatasetBuilder::new(bins());

        assert!(builder.add_rupture(50.0, 6.5, 0.2, 1e-4));
        assert!(!builder.add_rupture(500.0, 6.5, 0.2, 2e-4));

        let dataset = builder.build().unwrap();
        assert_approx_eq!(f64, dataset.binned_rate(), 1e-4, ulps = 2);
        assert_approx_eq!(f64, dataset.residual(), 2e-4, ulps = 2);
        assert_approx_eq!(f64, dataset.total_rate(), 3e-4, ulps = 2);
    }

    #[test]
    fn accumulators_conserve_binned_rate() {
        let mut builder = DeaggDatasetBuilder::new(bins());
        builder.add_rupture(20.0, 6.0, 0.5, 3e-4);
        builder.add_rupture(180.0, 7.5, -1.0, 1e-4);
        builder.add_contribution("near", 3e-4, 0.0);
        builder.add_contribution("far", 1e-4, 0.0);

        let dataset = builder.build().unwrap();

        assert_approx_eq!(f64, dataset.binned_rate(), 4e-4, ulps = 4);
        let contributed: f64 = dataset.contributions().iter().map(|c| c.rate).sum();
        assert_approx_eq!(f64, contributed, dataset.binned_rate(), ulps = 4);

        // rate-weighted mean of 20 and 180 at 3:1
        assert_approx_eq!(f64, dataset.mean_distance(), 60.0, epsilon = 1e-9);
        assert_approx_eq!(f64, dataset.mean_magnitude(), 6.375, epsilon = 1e-9);
    }

    #[test]
    fn empty_bins_report_nan_positions() {
        let dataset = DeaggDatasetBuilder::new(bins()).build().unwrap();

        assert!(dataset.mean_distance().is_nan());
        let (r_hat, m_hat) = dataset.position_means();
        assert!(r_hat[[0, 0]].is_nan());
        assert!(m_hat[[0, 0]].is_nan());
    }

    #[test]
    fn scale_is_linear_everywhere() {
        let mut builder = DeaggDatasetBuilder::new(bins());
        builder.add_rupture(20.0, 6.0, 0.5, 1e-4);
        builder.add_rupture(500.0, 6.0, 0.5, 1e-4);
        builder.add_contribution("s", 1e-4, 1e-4);
        builder.scale(2.0);

        let dataset = builder.build().unwrap();
        assert_approx_eq!(f64, dataset.binned_rate(), 2e-4, ulps = 4);
        assert_approx_eq!(f64, dataset.residual(), 2e-4, ulps = 4);
        assert_approx_eq!(f64, dataset.contributions()[0].rate, 2e-4, ulps = 4);
    }

    #[test]
    fn merge_requires_shared_bin_model() {
        let shared = bins();
        let mut left = DeaggDatasetBuilder::new(Arc::clone(&shared));
        let mut right = DeaggDatasetBuilder::new(Arc::clone(&shared));
        right.add_rupture(20.0, 6.0, 0.5, 1e-4);
        right.add_contribution("s", 1e-4, 0.0);

        left.merge(&right.clone().build().unwrap()).unwrap();
        assert_approx_eq!(f64, left.binned_rate(), 1e-4, ulps = 2);

        let foreign = DeaggDatasetBuilder::new(bins()).build().unwrap();
        assert!(matches!(
            left.merge(&foreign),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn merge_coalesces_contributions_by_name() {
        let shared = bins();
        let mut left = DeaggDatasetBuilder::new(Arc::clone(&shared));
        left.add_contribution("s", 1e-4, 0.0);

        let mut right = DeaggDatasetBuilder::new(Arc::clone(&shared));
        right.add_contribution("s", 2e-4, 1e-5);
        left.merge(&right.build().unwrap()).unwrap();

        let dataset = left.build().unwrap();
        assert_eq!(dataset.contributions().len(), 1);
        assert_approx_eq!(f64, dataset.contributions()[0].rate, 3e-4, ulps = 2);
        assert_approx_eq!(f64, dataset.contributions()[0].skip_rate, 1e-5, ulps = 2);
    }

    #[test]
    fn contributions_rank_by_rate() {
        let mut builder = DeaggDatasetBuilder::new(bins());
        builder.add_contribution("minor", 1e-5, 0.0);
        builder.add_contribution("major", 1e-3, 0.0);
        builder.add_contribution("middle", 1e-4, 0.0);

        let dataset = builder.build().unwrap();
        let names: Vec<_> = dataset
            .top_contributions(2)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["major", "middle"]);
    }
}
