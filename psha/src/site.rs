//! Module containing the site and its characteristics.

use super::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Allowed range for `vs30`, in m/s.
pub const VS30_RANGE: (f64, f64) = (150.0, 2000.0);
/// Allowed range for `z1p0`, in km.
pub const Z1P0_RANGE: (f64, f64) = (0.0, 2.0);
/// Allowed range for `z2p5`, in km.
pub const Z2P5_RANGE: (f64, f64) = (0.0, 5.0);

/// A geographic location in decimal degrees.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Location {
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Latitude in decimal degrees.
    pub lat: f64,
}

/// The site a hazard calculation is performed for: a location plus the
/// characteristics ground-motion models condition on.
///
/// `NaN` site characteristics are sentinels meaning "use the model default"
/// and always validate.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Site {
    name: String,
    location: Location,
    vs30: f64,
    vs_inferred: bool,
    z1p0: f64,
    z2p5: f64,
}

impl Site {
    /// Returns a builder with the reference-rock defaults: `vs30` of 760 m/s,
    /// inferred, basin depths deferred to the models.
    #[must_use]
    pub fn builder() -> SiteBuilder {
        SiteBuilder {
            name: "site".to_string(),
            location: Location { lon: 0.0, lat: 0.0 },
            vs30: 760.0,
            vs_inferred: true,
            z1p0: f64::NAN,
            z2p5: f64::NAN,
        }
    }

    /// Returns the site name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the site location.
    #[must_use]
    pub const fn location(&self) -> Location {
        self.location
    }

    /// Returns the average shear-wave velocity over the top 30 m, in m/s.
    #[must_use]
    pub const fn vs30(&self) -> f64 {
        self.vs30
    }

    /// Returns whether `vs30` was inferred rather than measured.
    #[must_use]
    pub const fn vs_inferred(&self) -> bool {
        self.vs_inferred
    }

    /// Returns the depth to the 1.0 km/s shear-wave horizon, in km, or `NaN`
    /// when deferred to the models.
    #[must_use]
    pub const fn z1p0(&self) -> f64 {
        self.z1p0
    }

    /// Returns the depth to the 2.5 km/s shear-wave horizon, in km, or `NaN`
    /// when deferred to the models.
    #[must_use]
    pub const fn z2p5(&self) -> f64 {
        self.z2p5
    }
}

/// Builder for [`Site`], validating characteristics on `build`.
#[derive(Clone, Debug)]
pub struct SiteBuilder {
    name: String,
    location: Location,
    vs30: f64,
    vs_inferred: bool,
    z1p0: f64,
    z2p5: f64,
}

impl SiteBuilder {
    /// Sets the site name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the site location.
    #[must_use]
    pub const fn location(mut self, lon: f64, lat: f64) -> Self {
        self.location = Location { lon, lat };
        self
    }

    /// Sets `vs30` in m/s and whether it was inferred.
    #[must_use]
    pub const fn vs30(mut self, vs30: f64, inferred: bool) -> Self {
        self.vs30 = vs30;
        self.vs_inferred = inferred;
        self
    }

    /// Sets the depth to the 1.0 km/s horizon, in km.
    #[must_use]
    pub const fn z1p0(mut self, z1p0: f64) -> Self {
        self.z1p0 = z1p0;
        self
    }

    /// Sets the depth to the 2.5 km/s horizon, in km.
    #[must_use]
    pub const fn z2p5(mut self, z2p5: f64) -> Self {
        self.z2p5 = z2p5;
        self
    }

    /// Validates the characteristics and builds the site.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if any non-`NaN` characteristic is
    /// outside its allowed range.
    pub fn build(self) -> Result<Site> {
        check_range("vs30", self.vs30, VS30_RANGE)?;
        check_range("z1p0", self.z1p0, Z1P0_RANGE)?;
        check_range("z2p5", self.z2p5, Z2P5_RANGE)?;

        Ok(Site {
            name: self.name,
            location: self.location,
            vs30: self.vs30,
            vs_inferred: self.vs_inferred,
            z1p0: self.z1p0,
            z2p5: self.z2p5,
        })
    }
}

fn check_range(name: &str, value: f64, (min, max): (f64, f64)) -> Result<()> {
    // NaN defers to the model default
    if value.is_nan() || (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{name} of {value} outside [{min}, {max}]"
        )))
    }
}
