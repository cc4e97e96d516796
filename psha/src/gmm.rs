//! Module containing ground-motion models (GMMs) and the weighted sets they
//! are evaluated in.

use super::error::{Error, Result};
use super::imt::Imt;
use enum_dispatch::enum_dispatch;
use float_cmp::approx_eq;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference `vs30` assumed when a site defers to the model default, in m/s.
const VS30_REFERENCE: f64 = 760.0;

/// The rupture and site parameters a ground-motion model is evaluated for,
/// together with the annual occurrence rate the rupture contributes.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct GmmInput {
    /// Annual occurrence rate of the rupture.
    pub rate: f64,
    /// Moment magnitude.
    pub mag: f64,
    /// Joyner-Boore distance (shortest horizontal distance to the surface
    /// projection of the rupture), in km.
    pub r_jb: f64,
    /// Shortest distance to the rupture plane, in km.
    pub r_rup: f64,
    /// Horizontal distance to the surface trace, positive over the hanging
    /// wall, in km.
    pub r_x: f64,
    /// Rupture dip, in degrees.
    pub dip: f64,
    /// Down-dip rupture width, in km.
    pub width: f64,
    /// Depth to the top of the rupture, in km.
    pub z_top: f64,
    /// Hypocentral depth, in km.
    pub z_hyp: f64,
    /// Rake angle, in degrees.
    pub rake: f64,
    /// Site `vs30`, in m/s; `NaN` defers to the model reference.
    pub vs30: f64,
    /// Whether `vs30` was inferred rather than measured.
    pub vs_inferred: bool,
    /// Depth to the 1.0 km/s horizon, in km; `NaN` defers to the model.
    pub z1p0: f64,
    /// Depth to the 2.5 km/s horizon, in km; `NaN` defers to the model.
    pub z2p5: f64,
}

impl GmmInput {
    fn vs30_or_reference(&self) -> f64 {
        if self.vs30.is_nan() {
            VS30_REFERENCE
        } else {
            self.vs30
        }
    }
}

/// The lognormal ground-motion distribution a model predicts: mean and
/// standard deviation in natural-log units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundMotion {
    /// Mean of the log ground motion.
    pub mean: f64,
    /// Standard deviation of the log ground motion.
    pub sigma: f64,
}

/// Trait each ground-motion model must implement.
///
/// Implementations are stateless: `evaluate` is a pure function of the input
/// and the IMT, which selects the model's per-IMT coefficients.
#[enum_dispatch]
pub trait GroundMotionModeling {
    /// Computes the ground-motion distribution for `input` and `imt`.
    fn evaluate(&self, input: &GmmInput, imt: Imt) -> GroundMotion;
}

/// Per-IMT coefficients of the built-in attenuation relations.
#[derive(Clone, Copy, Debug)]
struct Coefficients {
    /// Constant term.
    c0: f64,
    /// Linear magnitude scaling.
    c1: f64,
    /// Quadratic magnitude scaling.
    c2: f64,
    /// Geometric spreading (coefficient on `ln R`).
    c3: f64,
    /// Anelastic attenuation (coefficient on `R`).
    c4: f64,
    /// Fictitious depth folded into the distance metric, in km.
    h: f64,
    /// Linear site scaling (coefficient on `ln(vs30 / v_ref)`).
    site: f64,
    /// Aleatory standard deviation.
    sigma: f64,
}

impl Coefficients {
    /// Evaluates the common functional form around a magnitude pivot `m_ref`
    /// and a site reference velocity `v_ref`.
    fn evaluate(&self, mag: f64, distance: f64, vs30: f64, m_ref: f64, v_ref: f64) -> GroundMotion {
        let dm = mag - m_ref;
        let r = self.h.hypot(distance);

        let mean = self.c0
            + self.c2.mul_add(dm, self.c1) * dm
            + self.c3 * r.ln()
            + self.c4 * r
            + self.site * (vs30 / v_ref).ln();

        GroundMotion {
            mean,
            sigma: self.sigma,
        }
    }
}

/// Attenuation relation for shallow ruptures in active crustal regions.
///
/// Joyner-Boore distance metric, reference rock at 760 m/s.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ActiveCrustGmpe;

impl ActiveCrustGmpe {
    const fn coefficients(imt: Imt) -> Coefficients {
        match imt {
            Imt::Pga => Coefficients {
                c0: -0.50,
                c1: 0.58,
                c2: -0.06,
                c3: -0.90,
                c4: -0.0035,
                h: 6.0,
                site: -0.45,
                sigma: 0.55,
            },
            Imt::Pgv => Coefficients {
                c0: 2.30,
                c1: 0.85,
                c2: -0.05,
                c3: -0.95,
                c4: -0.0020,
                h: 5.0,
                site: -0.60,
                sigma: 0.58,
            },
            Imt::Sa0P2 => Coefficients {
                c0: 0.05,
                c1: 0.62,
                c2: -0.07,
                c3: -0.95,
                c4: -0.0040,
                h: 6.5,
                site: -0.35,
                sigma: 0.58,
            },
            Imt::Sa0P5 => Coefficients {
                c0: -0.55,
                c1: 0.75,
                c2: -0.06,
                c3: -0.90,
                c4: -0.0030,
                h: 6.0,
                site: -0.55,
                sigma: 0.60,
            },
            Imt::Sa1P0 => Coefficients {
                c0: -1.30,
                c1: 0.88,
                c2: -0.05,
                c3: -0.85,
                c4: -0.0022,
                h: 5.5,
                site: -0.70,
                sigma: 0.63,
            },
            Imt::Sa2P0 => Coefficients {
                c0: -2.10,
                c1: 0.98,
                c2: -0.04,
                c3: -0.80,
                c4: -0.0015,
                h: 5.0,
                site: -0.75,
                sigma: 0.66,
            },
        }
    }
}

impl GroundMotionModeling for ActiveCrustGmpe {
    fn evaluate(&self, input: &GmmInput, imt: Imt) -> GroundMotion {
        Self::coefficients(imt).evaluate(
            input.mag,
            input.r_jb,
            input.vs30_or_reference(),
            6.0,
            VS30_REFERENCE,
        )
    }
}

/// Attenuation relation for stable continental regions.
///
/// Rupture distance metric, hard-rock reference at 2000 m/s, slower
/// geometric spreading than the active-crust relation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct StableCrustGmpe;

impl StableCrustGmpe {
    const fn coefficients(imt: Imt) -> Coefficients {
        match imt {
            Imt::Pga => Coefficients {
                c0: 0.15,
                c1: 0.72,
                c2: -0.05,
                c3: -1.05,
                c4: -0.0018,
                h: 5.0,
                site: -0.30,
                sigma: 0.68,
            },
            Imt::Pgv => Coefficients {
                c0: 2.60,
                c1: 0.95,
                c2: -0.04,
                c3: -1.00,
                c4: -0.0012,
                h: 4.5,
                site: -0.40,
                sigma: 0.70,
            },
            Imt::Sa0P2 => Coefficients {
                c0: 0.70,
                c1: 0.76,
                c2: -0.06,
                c3: -1.10,
                c4: -0.0022,
                h: 5.5,
                site: -0.25,
                sigma: 0.70,
            },
            Imt::Sa0P5 => Coefficients {
                c0: -0.05,
                c1: 0.86,
                c2: -0.05,
                c3: -1.00,
                c4: -0.0016,
                h: 5.0,
                site: -0.35,
                sigma: 0.72,
            },
            Imt::Sa1P0 => Coefficients {
                c0: -0.85,
                c1: 0.96,
                c2: -0.04,
                c3: -0.95,
                c4: -0.0012,
                h: 4.5,
                site: -0.45,
                sigma: 0.74,
            },
            Imt::Sa2P0 => Coefficients {
                c0: -1.70,
                c1: 1.05,
                c2: -0.03,
                c3: -0.90,
                c4: -0.0009,
                h: 4.0,
                site: -0.50,
                sigma: 0.76,
            },
        }
    }
}

impl GroundMotionModeling for StableCrustGmpe {
    fn evaluate(&self, input: &GmmInput, imt: Imt) -> GroundMotion {
        Self::coefficients(imt).evaluate(
            input.mag,
            input.r_rup,
            input.vs30_or_reference(),
            6.0,
            2000.0,
        )
    }
}

/// Attenuation relation for subduction interface and intraslab ruptures.
///
/// Rupture distance metric with a hypocentral-depth term that strengthens
/// deep intraslab motions.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SubductionGmpe;

impl SubductionGmpe {
    /// Depth scaling applied on top of the common form, per km of
    /// hypocentral depth below the 20 km reference.
    const DEPTH_SCALING: f64 = 0.012;

    const fn coefficients(imt: Imt) -> Coefficients {
        match imt {
            Imt::Pga => Coefficients {
                c0: 0.55,
                c1: 0.65,
                c2: -0.05,
                c3: -1.00,
                c4: -0.0025,
                h: 8.0,
                site: -0.50,
                sigma: 0.62,
            },
            Imt::Pgv => Coefficients {
                c0: 3.05,
                c1: 0.90,
                c2: -0.04,
                c3: -1.00,
                c4: -0.0015,
                h: 7.0,
                site: -0.60,
                sigma: 0.64,
            },
            Imt::Sa0P2 => Coefficients {
                c0: 1.10,
                c1: 0.70,
                c2: -0.06,
                c3: -1.05,
                c4: -0.0030,
                h: 8.5,
                site: -0.40,
                sigma: 0.64,
            },
            Imt::Sa0P5 => Coefficients {
                c0: 0.40,
                c1: 0.82,
                c2: -0.05,
                c3: -1.00,
                c4: -0.0022,
                h: 8.0,
                site: -0.55,
                sigma: 0.66,
            },
            Imt::Sa1P0 => Coefficients {
                c0: -0.40,
                c1: 0.93,
                c2: -0.04,
                c3: -0.95,
                c4: -0.0016,
                h: 7.5,
                site: -0.65,
                sigma: 0.68,
            },
            Imt::Sa2P0 => Coefficients {
                c0: -1.25,
                c1: 1.02,
                c2: -0.03,
                c3: -0.90,
                c4: -0.0011,
                h: 7.0,
                site: -0.70,
                sigma: 0.70,
            },
        }
    }
}

impl GroundMotionModeling for SubductionGmpe {
    fn evaluate(&self, input: &GmmInput, imt: Imt) -> GroundMotion {
        let base = Self::coefficients(imt).evaluate(
            input.mag,
            input.r_rup,
            input.vs30_or_reference(),
            7.0,
            VS30_REFERENCE,
        );

        GroundMotion {
            mean: Self::DEPTH_SCALING.mul_add(input.z_hyp - 20.0, base.mean),
            sigma: base.sigma,
        }
    }
}

/// Reference model with a fixed median and sigma, independent of the input.
///
/// Useful for calibrating weight handling: the curve produced through this
/// model is an analytic function of the exceedance model alone.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FixedMedianGmpe;

impl FixedMedianGmpe {
    /// Median ground motion reported for acceleration IMTs, in g.
    pub const MEDIAN: f64 = 0.1;
    /// Median ground motion reported for PGV, in cm/s.
    pub const MEDIAN_PGV: f64 = 10.0;
    /// Reported aleatory standard deviation.
    pub const SIGMA: f64 = 0.6;
}

impl GroundMotionModeling for FixedMedianGmpe {
    fn evaluate(&self, _input: &GmmInput, imt: Imt) -> GroundMotion {
        let median = match imt {
            Imt::Pgv => Self::MEDIAN_PGV,
            _ => Self::MEDIAN,
        };

        GroundMotion {
            mean: median.ln(),
            sigma: Self::SIGMA,
        }
    }
}

/// Enum which lists all ground-motion models known to the crate.
///
/// The variants carry no state; a `Gmm` doubles as the identity curves and
/// deaggregation datasets are keyed by.
#[enum_dispatch(GroundMotionModeling)]
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Gmm {
    /// Active crustal regions.
    ActiveCrustGmpe,
    /// Stable continental regions.
    StableCrustGmpe,
    /// Subduction interface and intraslab.
    SubductionGmpe,
    /// Fixed-median reference model.
    FixedMedianGmpe,
}

impl fmt::Display for Gmm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ActiveCrustGmpe(_) => "ActiveCrust",
            Self::StableCrustGmpe(_) => "StableCrust",
            Self::SubductionGmpe(_) => "Subduction",
            Self::FixedMedianGmpe(_) => "FixedMedian",
        };
        f.write_str(label)
    }
}

/// A weighted set of ground-motion models with distance-dependent weights.
///
/// Weights are piecewise in distance: each band applies out to its maximum
/// distance and its weights sum to one. A model absent from the band a
/// source falls in contributes nothing for that source, which restricts
/// far-field sources to the models applicable at long distance.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GmmSet {
    gmms: Vec<Gmm>,
    bands: Vec<WeightBand>,
}

/// One distance band of a [`GmmSet`]: the model weights applying out to
/// `max_distance`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WeightBand {
    max_distance: f64,
    weights: Vec<(Gmm, f64)>,
}

impl WeightBand {
    /// Creates a band applying out to `max_distance` km.
    #[must_use]
    pub const fn new(max_distance: f64, weights: Vec<(Gmm, f64)>) -> Self {
        Self {
            max_distance,
            weights,
        }
    }
}

impl GmmSet {
    /// Creates a set from distance bands ordered by increasing maximum
    /// distance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if there are no bands, if band
    /// distances are not strictly increasing, if a band repeats a model, or
    /// if any band's weights do not sum to one.
    pub fn new(bands: Vec<WeightBand>) -> Result<Self> {
        if bands.is_empty() {
            return Err(Error::config("GMM set without weight bands"));
        }

        for pair in bands.windows(2) {
            if pair[0].max_distance >= pair[1].max_distance {
                return Err(Error::config(
                    "GMM weight bands must have strictly increasing distances",
                ));
            }
        }

        let mut gmms: Vec<Gmm> = Vec::new();

        for band in &bands {
            let sum: f64 = band.weights.iter().map(|(_, weight)| weight).sum();
            if !approx_eq!(f64, sum, 1.0, epsilon = 1e-9) {
                return Err(Error::config(format!(
                    "GMM weights at {} km sum to {sum}, not 1",
                    band.max_distance
                )));
            }

            for &(gmm, weight) in &band.weights {
                if !(weight > 0.0 && weight <= 1.0) {
                    return Err(Error::config(format!(
                        "weight {weight} for {gmm} outside (0, 1]"
                    )));
                }
                if band.weights.iter().filter(|(g, _)| *g == gmm).count() > 1 {
                    return Err(Error::config(format!("{gmm} repeated within one band")));
                }
                if !gmms.contains(&gmm) {
                    gmms.push(gmm);
                }
            }
        }

        Ok(Self { gmms, bands })
    }

    /// Creates a set of a single model with weight one at all distances.
    #[must_use]
    pub fn single(gmm: Gmm) -> Self {
        Self {
            gmms: vec![gmm],
            bands: vec![WeightBand::new(f64::MAX, vec![(gmm, 1.0)])],
        }
    }

    /// Returns the models of this set, in first-appearance order.
    #[must_use]
    pub fn gmms(&self) -> &[Gmm] {
        &self.gmms
    }

    /// Returns the model weights applying at `distance` km. Beyond the last
    /// band the returned map is empty.
    #[must_use]
    pub fn weights(&self, distance: f64) -> &[(Gmm, f64)] {
        self.bands
            .iter()
            .find(|band| distance <= band.max_distance)
            .map_or(&[], |band| &band.weights)
    }

    /// Returns the weight of `gmm` at `distance` km, or `None` if the model
    /// does not apply there.
    #[must_use]
    pub fn weight(&self, gmm: Gmm, distance: f64) -> Option<f64> {
        self.weights(distance)
            .iter()
            .find(|(g, _)| *g == gmm)
            .map(|&(_, weight)| weight)
    }
}
