//! Module containing the source-model containers a hazard calculation
//! consumes.
//!
//! Geometry resolution happens upstream of this crate: ruptures arrive with
//! their site-resolved distance metrics, and source sets are already
//! restricted to the neighborhood of the site being calculated.

use super::error::{Error, Result};
use super::gmm::GmmSet;
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The type tag of a source set, which selects the calculation path and the
/// grouping of results.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum SourceType {
    /// Discrete fault sections.
    Fault,
    /// Gridded (smoothed) seismicity.
    Grid,
    /// Subduction interface sections.
    Interface,
    /// Intraslab ruptures.
    Slab,
    /// Contemporaneously rupturing fault variants.
    Cluster,
    /// A flat list of ruptures spanning a fault system.
    System,
}

impl SourceType {
    /// Returns `true` for the types processed by the plain per-source path.
    #[must_use]
    pub const fn is_plain(self) -> bool {
        matches!(self, Self::Fault | Self::Grid | Self::Interface | Self::Slab)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fault => "FAULT",
            Self::Grid => "GRID",
            Self::Interface => "INTERFACE",
            Self::Slab => "SLAB",
            Self::Cluster => "CLUSTER",
            Self::System => "SYSTEM",
        };
        f.write_str(label)
    }
}

/// A single slip event: magnitude, annual rate, and the site-resolved
/// rupture parameters ground-motion models condition on.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Rupture {
    /// Moment magnitude.
    pub mag: f64,
    /// Annual occurrence rate. For cluster variants this is the variant
    /// weight, a per-event probability rather than an annual rate.
    pub rate: f64,
    /// Rake angle, in degrees.
    pub rake: f64,
    /// Dip, in degrees.
    pub dip: f64,
    /// Down-dip width, in km.
    pub width: f64,
    /// Depth to the top of the rupture, in km.
    pub z_top: f64,
    /// Hypocentral depth, in km.
    pub z_hyp: f64,
    /// Joyner-Boore distance to the site, in km.
    pub r_jb: f64,
    /// Rupture distance to the site, in km.
    pub r_rup: f64,
    /// Hanging-wall-signed horizontal distance to the site, in km.
    pub r_x: f64,
}

/// A generator of ruptures with a name.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Source {
    name: String,
    ruptures: Vec<Rupture>,
}

impl Source {
    /// Creates a source from its ruptures.
    #[must_use]
    pub fn new(name: impl Into<String>, ruptures: Vec<Rupture>) -> Self {
        Self {
            name: name.into(),
            ruptures,
        }
    }

    /// Returns the source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ruptures of this source.
    #[must_use]
    pub fn ruptures(&self) -> &[Rupture] {
        &self.ruptures
    }

    /// Returns the shortest Joyner-Boore distance over the ruptures, or
    /// infinity for a rupture-less source.
    #[must_use]
    pub fn min_distance(&self) -> f64 {
        self.ruptures
            .iter()
            .map(|rupture| rupture.r_jb)
            .fold(f64::INFINITY, f64::min)
    }
}

/// A source set of one of the plain types: FAULT, GRID, INTERFACE or SLAB.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlainSourceSet {
    name: String,
    kind: SourceType,
    weight: f64,
    gmms: GmmSet,
    sources: Vec<Source>,
}

impl PlainSourceSet {
    /// Creates a plain source set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if `kind` is not a plain type or the
    /// weight is outside `[0, 1]`.
    pub fn new(
        name: impl Into<String>,
        kind: SourceType,
        weight: f64,
        gmms: GmmSet,
        sources: Vec<Source>,
    ) -> Result<Self> {
        if !kind.is_plain() {
            return Err(Error::config(format!(
                "{kind} is not a plain source-set type"
            )));
        }
        check_weight(weight)?;

        Ok(Self {
            name: name.into(),
            kind,
            weight,
            gmms,
            sources,
        })
    }

    /// Returns the sources of this set.
    #[must_use]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }
}

/// A cluster source: fault variants assumed to rupture contemporaneously,
/// combined by probabilistic OR.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterSource {
    name: String,
    rate: f64,
    weight: f64,
    variants: Vec<Source>,
}

impl ClusterSource {
    /// Creates a cluster source from its fault variants. Variant rupture
    /// rates are per-event weights, not annual rates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if the weight is outside `[0, 1]` or
    /// the rate is not positive.
    pub fn new(
        name: impl Into<String>,
        rate: f64,
        weight: f64,
        variants: Vec<Source>,
    ) -> Result<Self> {
        check_weight(weight)?;
        if !(rate > 0.0 && rate.is_finite()) {
            return Err(Error::config(format!("cluster rate {rate} not positive")));
        }

        Ok(Self {
            name: name.into(),
            rate,
            weight,
            variants,
        })
    }

    /// Returns the cluster name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the annual rate of the cluster event.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the logic-tree weight of this cluster.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Returns the fault variants of this cluster.
    #[must_use]
    pub fn variants(&self) -> &[Source] {
        &self.variants
    }

    /// Returns the shortest Joyner-Boore distance over all variants.
    #[must_use]
    pub fn min_distance(&self) -> f64 {
        self.variants
            .iter()
            .map(Source::min_distance)
            .fold(f64::INFINITY, f64::min)
    }
}

/// A source set of cluster sources.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterSourceSet {
    name: String,
    weight: f64,
    gmms: GmmSet,
    clusters: Vec<ClusterSource>,
}

impl ClusterSourceSet {
    /// Creates a cluster source set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if the weight is outside `[0, 1]`.
    pub fn new(
        name: impl Into<String>,
        weight: f64,
        gmms: GmmSet,
        clusters: Vec<ClusterSource>,
    ) -> Result<Self> {
        check_weight(weight)?;

        Ok(Self {
            name: name.into(),
            weight,
            gmms,
            clusters,
        })
    }

    /// Returns the cluster sources of this set.
    #[must_use]
    pub fn clusters(&self) -> &[ClusterSource] {
        &self.clusters
    }
}

/// A source set represented as one flat list of ruptures rather than a
/// nested source → rupture structure.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SystemSourceSet {
    name: String,
    weight: f64,
    gmms: GmmSet,
    ruptures: Vec<Rupture>,
}

impl SystemSourceSet {
    /// Creates a system source set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if the weight is outside `[0, 1]`.
    pub fn new(
        name: impl Into<String>,
        weight: f64,
        gmms: GmmSet,
        ruptures: Vec<Rupture>,
    ) -> Result<Self> {
        check_weight(weight)?;

        Ok(Self {
            name: name.into(),
            weight,
            gmms,
            ruptures,
        })
    }

    /// Returns the flat rupture list of this set.
    #[must_use]
    pub fn ruptures(&self) -> &[Rupture] {
        &self.ruptures
    }
}

/// Trait giving uniform access to the identity of a source set.
#[enum_dispatch]
pub trait SourceSetOps {
    /// Returns the source-set name.
    fn name(&self) -> &str;

    /// Returns the source-set type tag.
    fn kind(&self) -> SourceType;

    /// Returns the logic-tree weight of this set.
    fn weight(&self) -> f64;

    /// Returns the ground-motion models evaluated for this set.
    fn gmms(&self) -> &GmmSet;
}

impl SourceSetOps for ClusterSourceSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceType {
        SourceType::Cluster
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn gmms(&self) -> &GmmSet {
        &self.gmms
    }
}

impl SourceSetOps for SystemSourceSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceType {
        SourceType::System
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn gmms(&self) -> &GmmSet {
        &self.gmms
    }
}

impl SourceSetOps for PlainSourceSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceType {
        self.kind
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn gmms(&self) -> &GmmSet {
        &self.gmms
    }
}

/// Enum which lists all possible source-set variants.
///
/// The pipeline dispatches on this closed set; every variant is handled
/// explicitly both in curve calculation and in deaggregation.
#[enum_dispatch(SourceSetOps)]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum SourceSet {
    /// FAULT, GRID, INTERFACE or SLAB.
    PlainSourceSet,
    /// CLUSTER.
    ClusterSourceSet,
    /// SYSTEM.
    SystemSourceSet,
}

/// The full catalog of source sets presented to the engine for one site.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HazardModel {
    name: String,
    source_sets: Vec<SourceSet>,
}

impl HazardModel {
    /// Creates a model from its source sets.
    #[must_use]
    pub fn new(name: impl Into<String>, source_sets: Vec<SourceSet>) -> Self {
        Self {
            name: name.into(),
            source_sets,
        }
    }

    /// Returns the model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the source sets of this model.
    #[must_use]
    pub fn source_sets(&self) -> &[SourceSet] {
        &self.source_sets
    }
}

fn check_weight(weight: f64) -> Result<()> {
    if (0.0..=1.0).contains(&weight) {
        Ok(())
    } else {
        Err(Error::config(format!(
            "source-set weight {weight} outside [0, 1]"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmm::{ActiveCrustGmpe, Gmm, GmmSet};

    fn rupture(mag: f64, rate: f64, distance: f64) -> Rupture {
        Rupture {
            mag,
            rate,
            rake: 0.0,
            dip: 90.0,
            width: 12.0,
            z_top: 1.0,
            z_hyp: 8.0,
            r_jb: distance,
            r_rup: distance,
            r_x: distance,
        }
    }

    #[test]
    fn min_distance_tracks_closest_rupture() {
        let source = Source::new(
            "wasatch",
            vec![rupture(6.5, 1e-3, 42.0), rupture(7.0, 1e-4, 17.0)],
        );
        assert_eq!(source.min_distance(), 17.0);

        let empty = Source::new("empty", vec![]);
        assert_eq!(empty.min_distance(), f64::INFINITY);
    }

    #[test]
    fn plain_set_rejects_cluster_kind() {
        let result = PlainSourceSet::new(
            "bad",
            SourceType::Cluster,
            1.0,
            GmmSet::single(Gmm::from(ActiveCrustGmpe)),
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn weights_outside_unit_interval_rejected() {
        let gmms = GmmSet::single(Gmm::from(ActiveCrustGmpe));
        assert!(SystemSourceSet::new("sys", 1.5, gmms, vec![]).is_err());
    }

    #[test]
    fn dispatch_reports_kind() {
        let gmms = GmmSet::single(Gmm::from(ActiveCrustGmpe));
        let set = SourceSet::from(
            PlainSourceSet::new("faults", SourceType::Fault, 1.0, gmms, vec![]).unwrap(),
        );

        assert_eq!(set.kind(), SourceType::Fault);
        assert_eq!(set.name(), "faults");
    }
}
