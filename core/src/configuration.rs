use std::collections::BTreeSet;

use nalgebra::{Matrix3, Vector3};

use crate::{KliffError, Result};

/// Index pairs of the Voigt components, in the order `xx yy zz yz xz xy`.
pub const VOIGT: [(usize, usize); 6] = [(0, 0), (1, 1), (2, 2), (1, 2), (0, 2), (0, 1)];

/// Represents an atomic configuration together with the reference data it
/// is fitted against.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    /// Lattice vectors, one per row
    pub(crate) cell: Matrix3<f64>,
    pub(crate) pbc: [bool; 3],
    pub(crate) species: Vec<String>,
    /// Absolute cartesian coordinates
    pub(crate) coords: Vec<Vector3<f64>>,
    pub(crate) energy: Option<f64>,
    pub(crate) forces: Option<Vec<Vector3<f64>>>,
    /// Voigt notation, see [`VOIGT`]
    pub(crate) stress: Option<[f64; 6]>,
    pub(crate) weight: f64,
    pub(crate) identifier: Option<String>,
}

impl Configuration {
    pub fn new(
        cell: Matrix3<f64>,
        pbc: [bool; 3],
        species: Vec<String>,
        coords: Vec<Vector3<f64>>,
    ) -> Result<Self> {
        if species.len() != coords.len() {
            return Err(KliffError::InvalidParameter(format!(
                "{} species given for {} coordinates",
                species.len(),
                coords.len()
            )));
        }

        Ok(Self {
            cell,
            pbc,
            species,
            coords,
            energy: None,
            forces: None,
            stress: None,
            weight: 1.0,
            identifier: None,
        })
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn with_forces(mut self, forces: Vec<Vector3<f64>>) -> Result<Self> {
        if forces.len() != self.coords.len() {
            return Err(KliffError::InvalidParameter(format!(
                "{} forces given for {} atoms",
                forces.len(),
                self.coords.len()
            )));
        }
        self.forces = Some(forces);
        Ok(self)
    }

    pub fn with_stress(mut self, stress: [f64; 6]) -> Self {
        self.stress = Some(stress);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn num_atoms(&self) -> usize {
        self.coords.len()
    }

    pub fn cell(&self) -> &Matrix3<f64> {
        &self.cell
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn coords(&self) -> &[Vector3<f64>] {
        &self.coords
    }

    pub fn energy(&self) -> Option<f64> {
        self.energy
    }

    pub fn forces(&self) -> Option<&[Vector3<f64>]> {
        self.forces.as_deref()
    }

    pub fn stress(&self) -> Option<&[f64; 6]> {
        self.stress.as_ref()
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// The distinct species present in this configuration, sorted
    pub fn species_set(&self) -> BTreeSet<&str> {
        self.species.iter().map(String::as_str).collect()
    }

    /// Volume of the parallelepiped spanned by the lattice vectors
    pub fn volume(&self) -> f64 {
        let (a0, a1, a2) = lattice_vectors(&self.cell);
        a0.dot(&a1.cross(&a2)).abs()
    }

    /// Coordinates in units of the lattice vectors. Fails for a singular cell.
    pub fn fractional_coords(&self) -> Result<Vec<Vector3<f64>>> {
        let inverse = inverse_lattice(&self.cell)?;
        Ok(self.coords.iter().map(|r| inverse * r).collect())
    }

    /// Cartesian coordinates with every atom brought into the cell by a
    /// lattice translation along the periodic axes. Atoms already inside
    /// keep their coordinates bit for bit.
    pub fn wrapped_coords(&self) -> Result<Vec<Vector3<f64>>> {
        if !self.pbc.iter().any(|&periodic| periodic) {
            return Ok(self.coords.clone());
        }

        let to_fractional = inverse_lattice(&self.cell)?;
        let to_cartesian = self.cell.transpose();
        Ok(self
            .coords
            .iter()
            .map(|r| {
                let frac = to_fractional * r;
                let shift = Vector3::from_fn(|axis, _| {
                    if self.pbc[axis] {
                        frac[axis].floor()
                    } else {
                        0.0
                    }
                });
                if shift == Vector3::zeros() {
                    *r
                } else {
                    r - to_cartesian * shift
                }
            })
            .collect())
    }

    /// Apply the homogeneous deformation `r -> F r` to the atoms and the cell.
    /// Reference data is carried over unchanged.
    pub fn deformed(&self, deformation: &Matrix3<f64>) -> Self {
        Self {
            cell: self.cell * deformation.transpose(),
            coords: self.coords.iter().map(|r| deformation * r).collect(),
            ..self.clone()
        }
    }
}

/// Rows of the cell matrix as vectors
pub(crate) fn lattice_vectors(cell: &Matrix3<f64>) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    (
        cell.row(0).transpose(),
        cell.row(1).transpose(),
        cell.row(2).transpose(),
    )
}

/// The matrix that maps cartesian coordinates to fractional coordinates
pub(crate) fn inverse_lattice(cell: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    cell.transpose()
        .try_inverse()
        .ok_or(KliffError::SingularCell)
}
