//! Module containing the intensity measure types supported by hazard
//! calculations.

use super::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Intensity measure type (IMT): the ground-motion quantity whose exceedance
/// is being computed.
///
/// The declaration order (peak measures first, then spectral accelerations by
/// increasing period) is the order keyed maps iterate in.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Imt {
    /// Peak ground acceleration, in units of g.
    Pga,
    /// Peak ground velocity, in cm/s.
    Pgv,
    /// 0.2 s spectral acceleration, in units of g.
    Sa0P2,
    /// 0.5 s spectral acceleration, in units of g.
    Sa0P5,
    /// 1.0 s spectral acceleration, in units of g.
    Sa1P0,
    /// 2.0 s spectral acceleration, in units of g.
    Sa2P0,
}

impl Imt {
    /// Returns the spectral period of this IMT in seconds, or `None` for the
    /// peak measures.
    #[must_use]
    pub const fn period(self) -> Option<f64> {
        match self {
            Self::Pga | Self::Pgv => None,
            Self::Sa0P2 => Some(0.2),
            Self::Sa0P5 => Some(0.5),
            Self::Sa1P0 => Some(1.0),
            Self::Sa2P0 => Some(2.0),
        }
    }

    /// Returns the maximum physically credible intensity for this IMT, if one
    /// is defined. Exceedance models that clamp use this value as a hard
    /// upper cutoff.
    #[must_use]
    pub const fn max_intensity(self) -> Option<f64> {
        match self {
            // 3 g for peak acceleration, 6 g for short-period response
            Self::Pga => Some(3.0),
            Self::Sa0P2 | Self::Sa0P5 => Some(6.0),
            Self::Pgv | Self::Sa1P0 | Self::Sa2P0 => None,
        }
    }

    /// Returns the default intensity levels hazard curves for this IMT are
    /// evaluated at. Acceleration grids span 0.0025 g to 10 g, the velocity
    /// grid 0.01 cm/s to 500 cm/s, both with 20 log-spaced points.
    #[must_use]
    pub fn default_levels(self) -> Vec<f64> {
        match self {
            Self::Pgv => log_spaced(0.01, 500.0, 20),
            _ => log_spaced(0.0025, 10.0, 20),
        }
    }
}

/// Returns `n` log-spaced values from `min` to `max`, both inclusive.
///
/// # Panics
///
/// Panics if `min` or `max` are not positive or if `n < 2`.
#[must_use]
pub fn log_spaced(min: f64, max: f64, n: usize) -> Vec<f64> {
    assert!(min > 0.0 && max > min);
    assert!(n >= 2);

    let log_min = min.ln();
    let step = (max.ln() - log_min) / super::convert::f64_from_usize(n - 1);

    (0..n)
        .map(|i| super::convert::f64_from_usize(i).mul_add(step, log_min).exp())
        .collect()
}

impl fmt::Display for Imt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pga => "PGA",
            Self::Pgv => "PGV",
            Self::Sa0P2 => "SA0P2",
            Self::Sa0P5 => "SA0P5",
            Self::Sa1P0 => "SA1P0",
            Self::Sa2P0 => "SA2P0",
        };
        f.write_str(label)
    }
}

impl FromStr for Imt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PGA" => Ok(Self::Pga),
            "PGV" => Ok(Self::Pgv),
            "SA0P2" => Ok(Self::Sa0P2),
            "SA0P5" => Ok(Self::Sa0P5),
            "SA1P0" => Ok(Self::Sa1P0),
            "SA2P0" => Ok(Self::Sa2P0),
            _ => Err(Error::config(format!("unknown IMT: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn log_spaced_endpoints() {
        let levels = log_spaced(0.0025, 10.0, 20);

        assert_eq!(levels.len(), 20);
        assert_approx_eq!(f64, levels[0], 0.0025, ulps = 8);
        assert_approx_eq!(f64, levels[19], 10.0, ulps = 8);
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn ordering_follows_period() {
        assert!(Imt::Pga < Imt::Sa0P2);
        assert!(Imt::Sa0P2 < Imt::Sa1P0);
        assert!(Imt::Sa1P0 < Imt::Sa2P0);
    }

    #[test]
    fn roundtrip_names() {
        for imt in [
            Imt::Pga,
            Imt::Pgv,
            Imt::Sa0P2,
            Imt::Sa0P5,
            Imt::Sa1P0,
            Imt::Sa2P0,
        ] {
            assert_eq!(imt.to_string().parse::<Imt>().unwrap(), imt);
        }
    }
}
