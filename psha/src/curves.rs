//! Module containing the curve containers hazard results are assembled
//! from.

use super::config::CalcConfig;
use super::gmm::{Gmm, GmmSet};
use super::ground_motions::{ClusterGroundMotions, GroundMotions};
use super::imt::Imt;
use super::model::SourceType;
use super::sequence::IntensitySequence;
use super::site::Site;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-IMT, per-GMM curves.
pub type CurveMap = BTreeMap<Imt, BTreeMap<Gmm, IntensitySequence>>;

/// The hazard curves of one source: per `(imt, gmm)`, exceedance rates
/// already scaled by the rupture rates but not yet by model or source-set
/// weights. The ground-motion table is retained for deaggregation.
#[derive(Clone, Debug)]
pub struct HazardCurves {
    gms: GroundMotions,
    curves: CurveMap,
}

impl HazardCurves {
    pub(crate) fn new(gms: GroundMotions, curves: CurveMap) -> Self {
        Self { gms, curves }
    }

    pub(crate) fn into_parts(self) -> (GroundMotions, CurveMap) {
        (self.gms, self.curves)
    }

    /// Returns the ground motions these curves integrate.
    #[must_use]
    pub const fn ground_motions(&self) -> &GroundMotions {
        &self.gms
    }

    /// Returns the name of the parent source.
    #[must_use]
    pub fn parent_name(&self) -> &str {
        self.gms.inputs().parent_name()
    }

    /// Returns the minimum source-to-site distance of the parent source.
    #[must_use]
    pub fn min_distance(&self) -> f64 {
        self.gms.inputs().min_distance()
    }

    /// Returns the curve for `(imt, gmm)`, if present.
    #[must_use]
    pub fn curve(&self, imt: Imt, gmm: Gmm) -> Option<&IntensitySequence> {
        self.curves.get(&imt)?.get(&gmm)
    }

    /// Returns all curves, keyed by IMT and model.
    #[must_use]
    pub const fn curves(&self) -> &CurveMap {
        &self.curves
    }
}

/// The hazard curves of one cluster source, combined across its fault
/// variants by probabilistic OR and scaled by the cluster rate. The
/// per-variant ground motions are retained for deaggregation.
#[derive(Clone, Debug)]
pub struct ClusterCurves {
    gms: ClusterGroundMotions,
    curves: CurveMap,
}

impl ClusterCurves {
    pub(crate) fn new(gms: ClusterGroundMotions, curves: CurveMap) -> Self {
        Self { gms, curves }
    }

    /// Returns the per-variant ground motions of the cluster.
    #[must_use]
    pub const fn ground_motions(&self) -> &ClusterGroundMotions {
        &self.gms
    }

    /// Returns the cluster name.
    #[must_use]
    pub fn parent_name(&self) -> &str {
        self.gms.cluster_name()
    }

    /// Returns the minimum distance across the cluster variants.
    #[must_use]
    pub fn min_distance(&self) -> f64 {
        self.gms.min_distance()
    }

    /// Returns the curve for `(imt, gmm)`, if present.
    #[must_use]
    pub fn curve(&self, imt: Imt, gmm: Gmm) -> Option<&IntensitySequence> {
        self.curves.get(&imt)?.get(&gmm)
    }

    /// Returns all curves, keyed by IMT and model.
    #[must_use]
    pub const fn curves(&self) -> &CurveMap {
        &self.curves
    }
}

/// The per-source curves retained inside a curve set.
#[derive(Clone, Debug)]
pub enum SourceCurves {
    /// Curves of a plain or system source.
    Plain(HazardCurves),
    /// Curves of a cluster source.
    Cluster(ClusterCurves),
}

impl SourceCurves {
    /// Returns the name of the parent source.
    #[must_use]
    pub fn parent_name(&self) -> &str {
        match self {
            Self::Plain(curves) => curves.parent_name(),
            Self::Cluster(curves) => curves.parent_name(),
        }
    }

    /// Returns the minimum source-to-site distance.
    #[must_use]
    pub fn min_distance(&self) -> f64 {
        match self {
            Self::Plain(curves) => curves.min_distance(),
            Self::Cluster(curves) => curves.min_distance(),
        }
    }
}

/// All curves derived from one source set: the retained per-source curves,
/// the model-weighted combination across sources, and the set total.
#[derive(Clone, Debug)]
pub struct HazardCurveSet {
    name: String,
    kind: SourceType,
    weight: f64,
    gmms: GmmSet,
    sources: Vec<SourceCurves>,
    curves: CurveMap,
    total: BTreeMap<Imt, IntensitySequence>,
}

impl HazardCurveSet {
    pub(crate) fn new(
        name: String,
        kind: SourceType,
        weight: f64,
        gmms: GmmSet,
        sources: Vec<SourceCurves>,
        curves: CurveMap,
        total: BTreeMap<Imt, IntensitySequence>,
    ) -> Self {
        Self {
            name,
            kind,
            weight,
            gmms,
            sources,
            curves,
            total,
        }
    }

    /// Returns the source-set name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the source-set type.
    #[must_use]
    pub const fn kind(&self) -> SourceType {
        self.kind
    }

    /// Returns the source-set weight.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Returns the ground-motion model set of the source set.
    #[must_use]
    pub const fn gmms(&self) -> &GmmSet {
        &self.gmms
    }

    /// Returns the retained per-source curves, in source order.
    #[must_use]
    pub fn sources(&self) -> &[SourceCurves] {
        &self.sources
    }

    /// Returns the per-model curve combined across sources with
    /// distance-dependent model weights applied.
    #[must_use]
    pub fn curve(&self, imt: Imt, gmm: Gmm) -> Option<&IntensitySequence> {
        self.curves.get(&imt)?.get(&gmm)
    }

    /// Returns all combined curves, keyed by IMT and model.
    #[must_use]
    pub const fn curves(&self) -> &CurveMap {
        &self.curves
    }

    /// Returns the total curve for `imt`: the per-model curves summed and
    /// scaled by the source-set weight.
    #[must_use]
    pub fn total_curve(&self, imt: Imt) -> Option<&IntensitySequence> {
        self.total.get(&imt)
    }
}

/// The consolidated result of a hazard calculation for one site.
#[derive(Clone, Debug)]
pub struct Hazard {
    site: Site,
    model_name: String,
    config: Arc<CalcConfig>,
    total: BTreeMap<Imt, IntensitySequence>,
    curve_sets: BTreeMap<SourceType, Vec<HazardCurveSet>>,
}

impl Hazard {
    pub(crate) fn new(
        site: Site,
        model_name: String,
        config: Arc<CalcConfig>,
        total: BTreeMap<Imt, IntensitySequence>,
        curve_sets: BTreeMap<SourceType, Vec<HazardCurveSet>>,
    ) -> Self {
        Self {
            site,
            model_name,
            config,
            total,
            curve_sets,
        }
    }

    /// Returns the site this hazard was computed for.
    #[must_use]
    pub const fn site(&self) -> &Site {
        &self.site
    }

    /// Returns the name of the model this hazard was computed from.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Returns the configuration the calculation ran with.
    #[must_use]
    pub const fn config(&self) -> &Arc<CalcConfig> {
        &self.config
    }

    /// Returns the total hazard curve for `imt`, summed over all source
    /// sets.
    #[must_use]
    pub fn total_curve(&self, imt: Imt) -> Option<&IntensitySequence> {
        self.total.get(&imt)
    }

    /// Returns the total curves for all IMTs.
    #[must_use]
    pub const fn total_curves(&self) -> &BTreeMap<Imt, IntensitySequence> {
        &self.total
    }

    /// Returns the curve sets grouped by source type.
    #[must_use]
    pub const fn curve_sets(&self) -> &BTreeMap<SourceType, Vec<HazardCurveSet>> {
        &self.curve_sets
    }
}
