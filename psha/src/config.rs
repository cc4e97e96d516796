//! Module containing the calculation configuration.

use super::error::{Error, Result};
use super::exceedance::ExceedanceModel;
use super::imt::Imt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::thread;

/// The size of the worker pool, as a share of the host CPUs.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Concurrency {
    /// Run every task on the calling thread.
    One,
    /// Half of the host CPUs.
    Half,
    /// All but two of the host CPUs.
    #[default]
    NMinus2,
    /// All host CPUs.
    All,
}

impl Concurrency {
    /// Returns the number of worker threads this level resolves to on the
    /// current host, never less than one.
    #[must_use]
    pub fn threads(self) -> usize {
        let cpus = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);

        match self {
            Self::One => 1,
            Self::Half => (cpus / 2).max(1),
            Self::NMinus2 => cpus.saturating_sub(2).max(1),
            Self::All => cpus,
        }
    }
}

/// The (r, m, ε) discretization and display settings of a deaggregation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DeaggConfig {
    /// Lower edge of the distance bins, in km.
    pub r_min: f64,
    /// Upper edge of the distance bins, in km.
    pub r_max: f64,
    /// Distance bin width, in km.
    pub delta_r: f64,
    /// Lower edge of the magnitude bins.
    pub m_min: f64,
    /// Upper edge of the magnitude bins.
    pub m_max: f64,
    /// Magnitude bin width.
    pub delta_m: f64,
    /// Lower edge of the epsilon bins.
    pub eps_min: f64,
    /// Upper edge of the epsilon bins.
    pub eps_max: f64,
    /// Epsilon bin width.
    pub delta_eps: f64,
    /// Number of ranked source contributions reported.
    pub contributor_limit: usize,
}

impl Default for DeaggConfig {
    fn default() -> Self {
        Self {
            r_min: 0.0,
            r_max: 200.0,
            delta_r: 10.0,
            m_min: 4.4,
            m_max: 9.4,
            delta_m: 0.2,
            eps_min: -3.0,
            eps_max: 3.0,
            delta_eps: 0.5,
            contributor_limit: 10,
        }
    }
}

impl DeaggConfig {
    fn validate(&self) -> Result<()> {
        for (name, min, max, delta) in [
            ("distance", self.r_min, self.r_max, self.delta_r),
            ("magnitude", self.m_min, self.m_max, self.delta_m),
            ("epsilon", self.eps_min, self.eps_max, self.delta_eps),
        ] {
            if !(min.is_finite() && max > min) {
                return Err(Error::config(format!(
                    "{name} bin range [{min}, {max}] is empty"
                )));
            }
            if !(delta > 0.0 && delta <= max - min) {
                return Err(Error::config(format!(
                    "{name} bin width {delta} does not divide [{min}, {max}]"
                )));
            }
        }

        if self.contributor_limit == 0 {
            return Err(Error::config("contributor limit of 0"));
        }

        Ok(())
    }
}

/// The configuration of a hazard calculation.
///
/// All fields carry defaults, so a deserialized configuration only needs to
/// name what it overrides.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct CalcConfig {
    /// The IMTs hazard curves are computed for.
    pub imts: BTreeSet<Imt>,
    /// Per-IMT overrides of the default intensity levels.
    pub custom_levels: BTreeMap<Imt, Vec<f64>>,
    /// The exceedance model.
    pub exceedance: ExceedanceModel,
    /// The truncation level, in standard deviations.
    pub truncation: f64,
    /// The worker-pool size.
    pub concurrency: Concurrency,
    /// The chunk size system-set input lists are partitioned into.
    pub system_partition: usize,
    /// Whether grid (smoothed-seismicity) sources are batched per task
    /// instead of fanned out one by one. Point sources are numerous and
    /// cheap, so per-source tasks would be dominated by scheduling.
    pub optimize_grids: bool,
    /// Sources farther than this from the site are skipped, in km.
    pub max_distance: f64,
    /// The deaggregation discretization.
    pub deagg: DeaggConfig,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            imts: BTreeSet::from([Imt::Pga]),
            custom_levels: BTreeMap::new(),
            exceedance: ExceedanceModel::TruncationUpperOnly,
            truncation: 3.0,
            concurrency: Concurrency::NMinus2,
            system_partition: 1024,
            optimize_grids: true,
            max_distance: 300.0,
            deagg: DeaggConfig::default(),
        }
    }
}

impl CalcConfig {
    /// Validates the configuration, surfacing the first offending key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] describing the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.imts.is_empty() {
            return Err(Error::config("no IMTs requested"));
        }
        if !(self.truncation > 0.0 && self.truncation.is_finite()) {
            return Err(Error::config(format!(
                "truncation level {} not positive",
                self.truncation
            )));
        }
        if self.system_partition == 0 {
            return Err(Error::config("system partition size of 0"));
        }
        if !(self.max_distance > 0.0) {
            return Err(Error::config(format!(
                "maximum distance {} not positive",
                self.max_distance
            )));
        }

        for (imt, levels) in &self.custom_levels {
            if levels.len() < 2
                || levels[0] <= 0.0
                || levels.windows(2).any(|w| w[0] >= w[1])
            {
                return Err(Error::config(format!(
                    "intensity levels for {imt} must be at least two strictly increasing positive values"
                )));
            }
        }

        self.deagg.validate()
    }

    /// Returns the intensity levels used for `imt`: the configured override
    /// or the IMT default.
    #[must_use]
    pub fn levels(&self, imt: Imt) -> Vec<f64> {
        self.custom_levels
            .get(&imt)
            .cloned()
            .unwrap_or_else(|| imt.default_levels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        CalcConfig::default().validate().unwrap();
    }

    #[test]
    fn concurrency_is_at_least_one() {
        for level in [
            Concurrency::One,
            Concurrency::Half,
            Concurrency::NMinus2,
            Concurrency::All,
        ] {
            assert!(level.threads() >= 1);
        }
        assert_eq!(Concurrency::One.threads(), 1);
    }

    #[test]
    fn empty_imts_rejected() {
        let config = CalcConfig {
            imts: BTreeSet::new(),
            ..CalcConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn unsorted_levels_rejected() {
        let config = CalcConfig {
            custom_levels: BTreeMap::from([(Imt::Pga, vec![0.1, 0.05])]),
            ..CalcConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn degenerate_bins_rejected() {
        let config = CalcConfig {
            deagg: DeaggConfig {
                delta_m: 0.0,
                ..DeaggConfig::default()
            },
            ..CalcConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
