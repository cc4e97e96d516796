//! Module containing the per-source input lists the pipeline assembles.

use super::error::{Error, Result};
use super::gmm::GmmInput;
use super::model::Rupture;
use super::site::Site;
use serde::{Deserialize, Serialize};
use std::slice::Iter;

/// The provenance of an input list.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Parent {
    /// Backed by a single named source.
    Source {
        /// The source name.
        name: String,
    },
    /// Backed by a whole system source set.
    System {
        /// The source-set name.
        set_name: String,
    },
}

/// Assembles the predictor parameters for one rupture at one site.
#[must_use]
pub fn gmm_input(rupture: &Rupture, site: &Site) -> GmmInput {
    GmmInput {
        rate: rupture.rate,
        mag: rupture.mag,
        r_jb: rupture.r_jb,
        r_rup: rupture.r_rup,
        r_x: rupture.r_x,
        dip: rupture.dip,
        width: rupture.width,
        z_top: rupture.z_top,
        z_hyp: rupture.z_hyp,
        rake: rupture.rake,
        vs30: site.vs30(),
        vs_inferred: site.vs_inferred(),
        z1p0: site.z1p0(),
        z2p5: site.z2p5(),
    }
}

/// An append-only ordered list of hazard inputs with a cached minimum
/// Joyner-Boore distance.
///
/// A list may be partitioned into contiguous sub-lists for parallel
/// processing; partitions expose the same parent as the original but are
/// frozen and share no mutable state with it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct InputList {
    parent: Parent,
    inputs: Vec<GmmInput>,
    min_distance: f64,
    partitioned: bool,
}

impl InputList {
    /// Creates an empty list backed by the source named `name`.
    #[must_use]
    pub fn source_backed(name: impl Into<String>) -> Self {
        Self::empty(Parent::Source { name: name.into() })
    }

    /// Creates an empty list backed by the system source set named
    /// `set_name`.
    #[must_use]
    pub fn system_backed(set_name: impl Into<String>) -> Self {
        Self::empty(Parent::System {
            set_name: set_name.into(),
        })
    }

    const fn empty(parent: Parent) -> Self {
        Self {
            parent,
            inputs: Vec::new(),
            min_distance: f64::INFINITY,
            partitioned: false,
        }
    }

    /// Returns the name of the parent source or source set.
    #[must_use]
    pub fn parent_name(&self) -> &str {
        match &self.parent {
            Parent::Source { name } => name,
            Parent::System { set_name } => set_name,
        }
    }

    /// Returns the provenance of this list.
    #[must_use]
    pub const fn parent(&self) -> &Parent {
        &self.parent
    }

    /// Appends `input`, updating the cached minimum distance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuilderMisuse`] if this list is a partition.
    pub fn add(&mut self, input: GmmInput) -> Result<()> {
        if self.partitioned {
            return Err(Error::misuse(format!(
                "input list partition of '{}' is frozen",
                self.parent_name()
            )));
        }

        self.min_distance = self.min_distance.min(input.r_jb);
        self.inputs.push(input);
        Ok(())
    }

    /// Returns the minimum Joyner-Boore distance over the inputs, or
    /// infinity for an empty list.
    #[must_use]
    pub const fn min_distance(&self) -> f64 {
        self.min_distance
    }

    /// Returns the number of inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Returns `true` if the list holds no inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Returns the inputs as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[GmmInput] {
        &self.inputs
    }

    /// Returns an iterator over the inputs.
    pub fn iter(&self) -> Iter<'_, GmmInput> {
        self.inputs.iter()
    }

    /// Splits the list into consecutive sub-lists of `chunk_size` inputs,
    /// the last possibly shorter. The partitions carry the parent of the
    /// original and are frozen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if `chunk_size` is zero.
    pub fn partition(&self, chunk_size: usize) -> Result<Vec<Self>> {
        if chunk_size == 0 {
            return Err(Error::config("partition size of 0"));
        }

        Ok(self
            .inputs
            .chunks(chunk_size)
            .map(|chunk| Self {
                parent: self.parent.clone(),
                inputs: chunk.to_vec(),
                min_distance: chunk
                    .iter()
                    .map(|input| input.r_jb)
                    .fold(f64::INFINITY, f64::min),
                partitioned: true,
            })
            .collect())
    }
}

impl<'a> IntoIterator for &'a InputList {
    type Item = &'a GmmInput;
    type IntoIter = Iter<'a, GmmInput>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(rate: f64, r_jb: f64) -> GmmInput {
        GmmInput {
            rate,
            mag: 6.5,
            r_jb,
            r_rup: r_jb,
            r_x: r_jb,
            dip: 90.0,
            width: 12.0,
            z_top: 1.0,
            z_hyp: 8.0,
            rake: 0.0,
            vs30: 760.0,
            vs_inferred: true,
            z1p0: f64::NAN,
            z2p5: f64::NAN,
        }
    }

    #[test]
    fn add_tracks_min_distance() {
        let mut list = InputList::source_backed("hayward");
        assert_eq!(list.min_distance(), f64::INFINITY);

        list.add(input(1e-3, 25.0)).unwrap();
        list.add(input(1e-4, 10.0)).unwrap();
        list.add(input(1e-5, 40.0)).unwrap();

        assert_eq!(list.min_distance(), 10.0);
        assert_eq!(list.len(), 3);
        assert_eq!(list.parent_name(), "hayward");
    }

    #[test]
    fn partitions_are_contiguous_and_frozen() {
        let mut list = InputList::system_backed("ucerf");
        for i in 0..10 {
            list.add(input(1e-4, f64::from(i) + 1.0)).unwrap();
        }

        let parts = list.partition(4).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 4);
        assert_eq!(parts[2].len(), 2);
        assert_eq!(parts[0].min_distance(), 1.0);
        assert_eq!(parts[2].min_distance(), 9.0);

        for part in &parts {
            assert_eq!(part.parent_name(), "ucerf");
        }

        let mut frozen = parts.into_iter().next().unwrap();
        assert!(matches!(
            frozen.add(input(1e-4, 1.0)),
            Err(Error::BuilderMisuse { .. })
        ));
    }

    #[test]
    fn partition_copies_share_no_state() {
        let mut list = InputList::source_backed("s");
        list.add(input(1e-3, 5.0)).unwrap();

        let parts = list.partition(1).unwrap();
        list.add(input(1e-3, 1.0)).unwrap();

        assert_eq!(parts[0].len(), 1);
        assert_eq!(parts[0].min_distance(), 5.0);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let list = InputList::source_backed("s");
        assert!(list.partition(0).is_err());
    }
}
