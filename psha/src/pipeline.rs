//! Module containing the hazard pipeline engine.
//!
//! For one site, every source set is transformed through the stages
//! *inputs → ground motions → curves* and the per-source results are
//! consolidated into a curve set, then all curve sets into the hazard.
//! Stages fan out over a bounded worker pool; results are always merged in
//! submission order, so pooled and single-threaded runs are bit-identical.

use super::config::{CalcConfig, Concurrency};
use super::curves::{
    ClusterCurves, CurveMap, Hazard, HazardCurveSet, HazardCurves, SourceCurves,
};
use super::error::{Error, Result};
use super::gmm::{GmmSet, GroundMotionModeling};
use super::ground_motions::{ClusterGroundMotions, GroundMotions, GroundMotionsBuilder};
use super::imt::Imt;
use super::inputs::{InputList, gmm_input};
use super::model::{
    ClusterSource, ClusterSourceSet, HazardModel, PlainSourceSet, Source, SourceSet, SourceSetOps,
    SourceType, SystemSourceSet,
};
use super::sequence::IntensitySequence;
use super::site::Site;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Cooperative cancellation handle for a hazard calculation.
///
/// Cancelling stops the calculation at the next stage boundary; partial
/// state is discarded and the calculation returns [`Error::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Per-calculation stage control: the caller's cancel token plus the abort
/// flag a failing sibling stage raises.
struct StageControl<'a> {
    cancel: &'a CancelToken,
    abort: AtomicBool,
}

impl<'a> StageControl<'a> {
    const fn new(cancel: &'a CancelToken) -> Self {
        Self {
            cancel,
            abort: AtomicBool::new(false),
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() || self.abort.load(Ordering::Relaxed) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn fail(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }
}

/// The hazard calculation engine: a validated configuration, the shared
/// per-IMT intensity grids, and the worker pool.
pub struct HazardEngine {
    config: Arc<CalcConfig>,
    imts: Vec<Imt>,
    grids: BTreeMap<Imt, Arc<[f64]>>,
    pool: Option<rayon::ThreadPool>,
}

impl HazardEngine {
    /// Creates an engine from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] for a bad configuration and
    /// [`Error::External`] if the worker pool cannot be built.
    pub fn new(config: CalcConfig) -> Result<Self> {
        config.validate()?;

        let imts: Vec<Imt> = config.imts.iter().copied().collect();
        let grids = imts
            .iter()
            .map(|&imt| (imt, Arc::from(config.levels(imt))))
            .collect();

        let pool = match config.concurrency {
            Concurrency::One => None,
            other => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(other.threads())
                    .build()
                    .map_err(|error| Error::External {
                        context: "building the worker pool".to_string(),
                        cause: error.into(),
                    })?,
            ),
        };

        Ok(Self {
            config: Arc::new(config),
            imts,
            grids,
            pool,
        })
    }

    /// Returns the configuration this engine runs with.
    #[must_use]
    pub const fn config(&self) -> &Arc<CalcConfig> {
        &self.config
    }

    /// Returns the shared intensity grid for `imt`, if it is configured.
    #[must_use]
    pub fn grid(&self, imt: Imt) -> Option<&Arc<[f64]>> {
        self.grids.get(&imt)
    }

    /// Computes the hazard at `site` for every source set of `model`.
    ///
    /// # Errors
    ///
    /// Fails fast on the first stage error; see [`Error`] for the kinds.
    pub fn hazard(&self, model: &HazardModel, site: &Site) -> Result<Hazard> {
        self.hazard_cancellable(model, site, &CancelToken::new())
    }

    /// Computes the hazard at `site`, stopping at the next stage boundary
    /// once `cancel` is cancelled.
    ///
    /// # Errors
    ///
    /// Fails fast on the first stage error, or with [`Error::Cancelled`].
    pub fn hazard_cancellable(
        &self,
        model: &HazardModel,
        site: &Site,
        cancel: &CancelToken,
    ) -> Result<Hazard> {
        let ctl = StageControl::new(cancel);

        let mut sets = Vec::with_capacity(model.source_sets().len());
        for set in model.source_sets() {
            ctl.checkpoint()?;
            sets.push(self.curve_set(set, site, &ctl)?);
        }

        let hazard = self.consolidate_hazard(model, site, sets)?;
        info!(
            site = site.name(),
            model = model.name(),
            sets = model.source_sets().len(),
            "hazard complete"
        );
        Ok(hazard)
    }

    /// Deaggregates `hazard` at intensity `iml` of `imt`. Convenience
    /// wrapper around [`deaggregate`](crate::deagg::deaggregate).
    ///
    /// # Errors
    ///
    /// See [`crate::deagg::deaggregate`].
    pub fn deaggregate(
        &self,
        hazard: &Hazard,
        imt: Imt,
        iml: f64,
    ) -> Result<super::deagg::Deagg> {
        super::deagg::deaggregate(hazard, imt, iml)
    }

    /// Transforms one source set into its curve set.
    fn curve_set(
        &self,
        set: &SourceSet,
        site: &Site,
        ctl: &StageControl<'_>,
    ) -> Result<HazardCurveSet> {
        let curve_set = match set {
            SourceSet::PlainSourceSet(plain) => self.plain_curve_set(plain, site, ctl),
            SourceSet::ClusterSourceSet(cluster) => self.cluster_curve_set(cluster, site, ctl),
            SourceSet::SystemSourceSet(system) => self.system_curve_set(system, site, ctl),
        }?;

        debug!(
            set = curve_set.name(),
            kind = %curve_set.kind(),
            sources = curve_set.sources().len(),
            "curve set consolidated"
        );
        Ok(curve_set)
    }

    /// The plain path: one *inputs → ground motions → curves* chain per
    /// source, fanned out over the pool. Grid sources are batched when the
    /// optimization is enabled; point sources are numerous and cheap, and
    /// batching changes neither the computations nor their merge order.
    fn plain_curve_set(
        &self,
        set: &PlainSourceSet,
        site: &Site,
        ctl: &StageControl<'_>,
    ) -> Result<HazardCurveSet> {
        const GRID_BATCH: usize = 64;

        let sources: Vec<&Source> = set
            .sources()
            .iter()
            .filter(|source| source.min_distance() <= self.config.max_distance)
            .collect();

        let batch_size = if set.kind() == SourceType::Grid
            && self.config.optimize_grids
            && sources.len() > GRID_BATCH
        {
            GRID_BATCH
        } else {
            1
        };
        let batches: Vec<Vec<&Source>> = sources.chunks(batch_size).map(<[_]>::to_vec).collect();

        let per_batch = self.run_stages(batches, ctl, |batch| {
            batch
                .into_iter()
                .map(|source| {
                    ctl.checkpoint()?;
                    let inputs = Arc::new(source_inputs(source, site));
                    ctl.checkpoint()?;
                    let gms = self.ground_motions(inputs, set.gmms())?;
                    ctl.checkpoint()?;
                    self.source_curves(gms)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        Ok(self.consolidate_set(
            set.name(),
            set.kind(),
            set.weight(),
            set.gmms(),
            per_batch
                .into_iter()
                .flatten()
                .map(SourceCurves::Plain)
                .collect(),
        ))
    }

    /// The cluster path: per-variant curves as in the plain path, then the
    /// probabilistic-OR combination across variants.
    fn cluster_curve_set(
        &self,
        set: &ClusterSourceSet,
        site: &Site,
        ctl: &StageControl<'_>,
    ) -> Result<HazardCurveSet> {
        let clusters: Vec<&ClusterSource> = set
            .clusters()
            .iter()
            .filter(|cluster| cluster.min_distance() <= self.config.max_distance)
            .collect();

        let per_cluster = self.run_stages(clusters, ctl, |cluster| {
            ctl.checkpoint()?;

            let mut variants = Vec::with_capacity(cluster.variants().len());
            for variant in cluster.variants() {
                let inputs = Arc::new(source_inputs(variant, site));
                let gms = self.ground_motions(inputs, set.gmms())?;
                variants.push(self.source_curves(gms)?);
            }

            ctl.checkpoint()?;
            self.cluster_curves(cluster, variants)
        })?;

        Ok(self.consolidate_set(
            set.name(),
            SourceType::Cluster,
            set.weight(),
            set.gmms(),
            per_cluster.into_iter().map(SourceCurves::Cluster).collect(),
        ))
    }

    /// The system path: one flat input list, partitioned across the pool
    /// for the ground-motion stage. The partition tables are spliced back
    /// into one master table before the curve stage, so the result does not
    /// depend on the partitioning.
    fn system_curve_set(
        &self,
        set: &SystemSourceSet,
        site: &Site,
        ctl: &StageControl<'_>,
    ) -> Result<HazardCurveSet> {
        ctl.checkpoint()?;

        let mut list = InputList::system_backed(set.name());
        for rupture in set.ruptures() {
            if rupture.r_jb <= self.config.max_distance {
                list.add(gmm_input(rupture, site))?;
            }
        }
        let master = Arc::new(list);

        let partition = self.config.system_partition;
        let gms = if self.pool.is_some() && master.len() > partition {
            let parts = master.partition(partition)?;
            debug!(
                set = set.name(),
                inputs = master.len(),
                partitions = parts.len(),
                "system inputs partitioned"
            );

            let tables = self.run_stages(parts, ctl, |part| {
                ctl.checkpoint()?;
                self.ground_motions(Arc::new(part), set.gmms())
            })?;
            GroundMotions::combine(Arc::clone(&master), &tables)?
        } else {
            self.ground_motions(master, set.gmms())?
        };

        ctl.checkpoint()?;
        let curves = self.source_curves(gms)?;

        Ok(self.consolidate_set(
            set.name(),
            SourceType::System,
            set.weight(),
            set.gmms(),
            vec![SourceCurves::Plain(curves)],
        ))
    }

    /// Fills the μ/σ table for one input list.
    fn ground_motions(&self, inputs: Arc<InputList>, gmms: &GmmSet) -> Result<GroundMotions> {
        let mut builder = GroundMotionsBuilder::new(
            Arc::clone(&inputs),
            self.imts.clone(),
            gmms.gmms().to_vec(),
        );

        for &imt in &self.imts {
            for &gmm in gmms.gmms() {
                for (i, input) in inputs.iter().enumerate() {
                    builder.set(imt, gmm, i, gmm.evaluate(input, imt))?;
                }
            }
        }

        builder.build()
    }

    /// Integrates one ground-motion table into per-`(imt, gmm)` curves:
    /// exceedance at every intensity level, scaled by the rupture rate and
    /// accumulated over the inputs.
    fn source_curves(&self, gms: GroundMotions) -> Result<HazardCurves> {
        let exceedance = self.config.exceedance;
        let truncation = self.config.truncation;
        let mut curves: CurveMap = BTreeMap::new();

        for &imt in gms.imts() {
            let grid = &self.grids[&imt];
            let mut by_gmm = BTreeMap::new();

            for &gmm in gms.gmms() {
                let (means, sigmas) = gms.arrays(imt, gmm).ok_or_else(|| {
                    Error::misuse(format!("ground motions missing ({imt}, {gmm})"))
                })?;

                let mut ys = vec![0.0; grid.len()];
                for ((input, &mean), &sigma) in gms.inputs().iter().zip(means).zip(sigmas) {
                    for (y, &x) in ys.iter_mut().zip(grid.iter()) {
                        let poe = exceedance.exceedance(mean, sigma, truncation, imt, x);
                        *y = poe.mul_add(input.rate, *y);
                    }
                }

                let curve = IntensitySequence::from_parts(Arc::clone(grid), ys)?;
                if !curve.all_finite() {
                    return Err(Error::numeric(format!(
                        "curve of '{}' under ({imt}, {gmm})",
                        gms.inputs().parent_name()
                    )));
                }
                by_gmm.insert(gmm, curve);
            }

            curves.insert(imt, by_gmm);
        }

        Ok(HazardCurves::new(gms, curves))
    }

    /// Combines per-variant curves into the cluster curves:
    /// `rate · (1 − Π (1 − poe))` per intensity level, where the variant
    /// curves are per-event exceedance probabilities.
    fn cluster_curves(
        &self,
        cluster: &ClusterSource,
        variants: Vec<HazardCurves>,
    ) -> Result<ClusterCurves> {
        let mut curves: CurveMap = BTreeMap::new();

        for &imt in &self.imts {
            let grid = &self.grids[&imt];
            let mut by_gmm = BTreeMap::new();

            let gmms: Vec<_> = variants
                .first()
                .map(|first| first.ground_motions().gmms().to_vec())
                .unwrap_or_default();

            for gmm in gmms {
                let mut ys = vec![1.0; grid.len()];
                for variant in &variants {
                    let curve = variant.curve(imt, gmm).ok_or_else(|| {
                        Error::misuse(format!("variant curve missing ({imt}, {gmm})"))
                    })?;
                    for (y, &poe) in ys.iter_mut().zip(curve.ys()) {
                        *y *= 1.0 - poe;
                    }
                }

                for y in &mut ys {
                    *y = cluster.rate() * (1.0 - *y);
                }

                let curve = IntensitySequence::from_parts(Arc::clone(grid), ys)?;
                if !curve.all_finite() {
                    return Err(Error::numeric(format!(
                        "cluster curve of '{}' under ({imt}, {gmm})",
                        cluster.name()
                    )));
                }
                by_gmm.insert(gmm, curve);
            }

            curves.insert(imt, by_gmm);
        }

        let gms = ClusterGroundMotions::new(
            cluster.name(),
            cluster.rate(),
            cluster.weight(),
            variants
                .into_iter()
                .map(|variant| variant.into_parts().0)
                .collect(),
        );

        Ok(ClusterCurves::new(gms, curves))
    }

    /// The curve consolidator: accumulates per-source curves under the
    /// distance-dependent model weights, then folds the per-model curves
    /// into the set total under the source-set weight.
    fn consolidate_set(
        &self,
        name: &str,
        kind: SourceType,
        set_weight: f64,
        gmms: &GmmSet,
        sources: Vec<SourceCurves>,
    ) -> HazardCurveSet {
        let mut curves: CurveMap = BTreeMap::new();
        let mut total = BTreeMap::new();

        for &imt in &self.imts {
            let grid = &self.grids[&imt];
            let mut by_gmm: BTreeMap<_, _> = gmms
                .gmms()
                .iter()
                .map(|&gmm| (gmm, IntensitySequence::zeroed(Arc::clone(grid))))
                .collect();

            for source in &sources {
                // models without weight at this source's distance are dropped
                let weights = gmms.weights(source.min_distance());
                let cluster_weight = match source {
                    SourceCurves::Plain(_) => 1.0,
                    SourceCurves::Cluster(cluster) => cluster.ground_motions().weight(),
                };

                for &(gmm, weight) in weights {
                    let curve = match source {
                        SourceCurves::Plain(plain) => plain.curve(imt, gmm),
                        SourceCurves::Cluster(cluster) => cluster.curve(imt, gmm),
                    };

                    if let (Some(curve), Some(accumulator)) = (curve, by_gmm.get_mut(&gmm)) {
                        // grids are engine-shared, the add cannot misfit
                        accumulator
                            .add_scaled(curve, weight * cluster_weight)
                            .unwrap_or_else(|_| unreachable!());
                    }
                }
            }

            let mut imt_total = IntensitySequence::zeroed(Arc::clone(grid));
            for curve in by_gmm.values() {
                imt_total.add(curve).unwrap_or_else(|_| unreachable!());
            }
            imt_total.multiply(set_weight);

            curves.insert(imt, by_gmm);
            total.insert(imt, imt_total);
        }

        HazardCurveSet::new(
            name.to_string(),
            kind,
            set_weight,
            gmms.clone(),
            sources,
            curves,
            total,
        )
    }

    /// The result consolidator: sums set totals into the site total and
    /// buckets curve sets by source type.
    fn consolidate_hazard(
        &self,
        model: &HazardModel,
        site: &Site,
        sets: Vec<HazardCurveSet>,
    ) -> Result<Hazard> {
        let mut total: BTreeMap<Imt, IntensitySequence> = self
            .imts
            .iter()
            .map(|&imt| (imt, IntensitySequence::zeroed(Arc::clone(&self.grids[&imt]))))
            .collect();

        for set in &sets {
            for (&imt, accumulator) in &mut total {
                if let Some(curve) = set.total_curve(imt) {
                    accumulator.add(curve)?;
                }
            }
        }

        for (imt, curve) in &total {
            if !curve.all_finite() {
                return Err(Error::numeric(format!("total curve for {imt}")));
            }
        }

        let mut curve_sets: BTreeMap<SourceType, Vec<HazardCurveSet>> = BTreeMap::new();
        for set in sets {
            curve_sets.entry(set.kind()).or_default().push(set);
        }

        Ok(Hazard::new(
            site.clone(),
            model.name().to_string(),
            Arc::clone(&self.config),
            total,
            curve_sets,
        ))
    }

    /// Runs one stage over `items`, on the pool when one is configured,
    /// always merging results in submission order. The first non-cancelled
    /// error wins; a failing task aborts its in-flight siblings at their
    /// next checkpoint.
    fn run_stages<T, R, F>(&self, items: Vec<T>, ctl: &StageControl<'_>, task: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Sync,
    {
        let run = |item: T| {
            let result = task(item);
            if result.is_err() {
                ctl.fail();
            }
            result
        };

        let results: Vec<Result<R>> = match &self.pool {
            Some(pool) => pool.install(|| items.into_par_iter().map(run).collect()),
            None => items.into_iter().map(run).collect(),
        };

        let mut cancelled = false;
        let mut collected = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(value) => collected.push(value),
                Err(Error::Cancelled) => cancelled = true,
                Err(error) => return Err(error),
            }
        }

        if cancelled {
            return Err(Error::Cancelled);
        }
        Ok(collected)
    }
}

/// The inputs stage: assembles the input list of one source at one site.
fn source_inputs(source: &Source, site: &Site) -> InputList {
    let mut list = InputList::source_backed(source.name());
    for rupture in source.ruptures() {
        // source-backed lists are only frozen by partitioning
        list.add(gmm_input(rupture, site))
            .unwrap_or_else(|_| unreachable!());
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmm::{ActiveCrustGmpe, Gmm, GmmSet};
    use crate::model::Rupture;
    use std::collections::BTreeSet;

    fn engine() -> HazardEngine {
        let config = CalcConfig {
            imts: BTreeSet::from([Imt::Pga]),
            concurrency: Concurrency::One,
            ..CalcConfig::default()
        };
        HazardEngine::new(config).unwrap()
    }

    fn rupture(rate: f64) -> Rupture {
        Rupture {
            mag: 6.5,
            rate,
            rake: 0.0,
            dip: 90.0,
            width: 12.0,
            z_top: 1.0,
            z_hyp: 8.0,
            r_jb: 20.0,
            r_rup: 20.0,
            r_x: 20.0,
        }
    }

    fn model(rate: f64) -> HazardModel {
        let set = PlainSourceSet::new(
            "faults",
            SourceType::Fault,
            1.0,
            GmmSet::single(Gmm::from(ActiveCrustGmpe)),
            vec![Source::new("a", vec![rupture(rate)])],
        )
        .unwrap();
        HazardModel::new("m", vec![SourceSet::from(set)])
    }

    #[test]
    fn bad_config_rejected_at_construction() {
        let config = CalcConfig {
            truncation: -1.0,
            ..CalcConfig::default()
        };
        assert!(matches!(
            HazardEngine::new(config),
            Err(Error::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn result_curves_share_the_engine_grid() {
        let engine = engine();
        let site = Site::builder().build().unwrap();
        let hazard = engine.hazard(&model(1e-4), &site).unwrap();

        let curve = hazard.total_curve(Imt::Pga).unwrap();
        assert!(Arc::ptr_eq(curve.grid(), engine.grid(Imt::Pga).unwrap()));
    }

    #[test]
    fn nan_rate_surfaces_as_numeric_fault() {
        let engine = engine();
        let site = Site::builder().build().unwrap();

        let result = engine.hazard(&model(f64::NAN), &site);
        assert!(matches!(result, Err(Error::NumericFault { .. })));
    }

    #[test]
    fn far_sources_are_filtered() {
        let engine = engine();
        let site = Site::builder().build().unwrap();

        let set = PlainSourceSet::new(
            "faults",
            SourceType::Fault,
            1.0,
            GmmSet::single(Gmm::from(ActiveCrustGmpe)),
            vec![Source::new(
                "far away",
                vec![Rupture {
                    r_jb: 400.0,
                    r_rup: 400.0,
                    r_x: 400.0,
                    ..rupture(1e-3)
                }],
            )],
        )
        .unwrap();
        let model = HazardModel::new("m", vec![SourceSet::from(set)]);

        let hazard = engine.hazard(&model, &site).unwrap();
        let total = hazard.total_curve(Imt::Pga).unwrap();
        assert!(total.ys().iter().all(|&y| y == 0.0));

        let sets = &hazard.curve_sets()[&SourceType::Fault];
        assert!(sets[0].sources().is_empty());
    }
}
