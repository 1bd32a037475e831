//! Transformation of atomic environments into fixed-size fingerprints.

mod cutoff;
mod fingerprints;
mod symmetry_function;

pub use cutoff::CutoffFunction;
pub use fingerprints::{Fingerprint, Fingerprints, Normalizer};
pub use symmetry_function::{SymmetryFunction, SymmetryFunctionTerm};

use nalgebra::DMatrix;

use crate::{configuration::Configuration, Result};

/// Descriptor values of every contributing atom of a configuration.
#[derive(Clone, Debug)]
pub struct DescriptorOutput {
    /// One row per contributing atom
    pub zeta: DMatrix<f64>,
    /// Per atom, the derivative of its descriptor with respect to the
    /// coordinates of all contributing atoms: `num_descriptors x 3N`
    pub dzeta_dr: Option<Vec<DMatrix<f64>>>,
    /// Per atom, the derivative with respect to strain divided by the cell
    /// volume: `num_descriptors x 6`
    pub dzeta_dstress: Option<Vec<DMatrix<f64>>>,
}

pub trait Descriptor {
    fn num_descriptors(&self) -> usize;

    /// Largest interaction range of any species pair
    fn cutoff(&self) -> f64;

    fn transform(
        &self,
        config: &Configuration,
        fit_forces: bool,
        fit_stress: bool,
    ) -> Result<DescriptorOutput>;
}
