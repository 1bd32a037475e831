//! Full neighbor lists over contributing and padding atoms.

mod cell_list;
pub mod padding;

pub use padding::{face_distances, PaddingAtoms};

use nalgebra::Vector3;
use smallvec::SmallVec;

use crate::{configuration::Configuration, parallel, KliffError, Result};

use cell_list::CellList;

/// Neighbors of a single atom. Most atoms in condensed phases have a few
/// dozen neighbors within typical cutoffs.
pub type Neighbors = SmallVec<[usize; 32]>;

/// The atoms of a configuration, extended by padding atoms, together with
/// the full neighbor list (each pair appears from both sides) of every atom
/// that needs one.
///
/// Atoms `0..num_contributing()` are the contributing atoms of the
/// configuration in their original order, the rest are padding atoms.
#[derive(Clone, Debug)]
pub struct NeighborList {
    cutoff: f64,
    num_contributing: usize,
    coords: Vec<Vector3<f64>>,
    species: Vec<String>,
    /// for padding atoms, the contributing atom they replicate. Contributing
    /// atoms are their own image.
    image: Vec<usize>,
    neighbors: Vec<Neighbors>,
}

impl NeighborList {
    /// Create padding atoms (if any direction is periodic) and build the
    /// neighbor lists. Padding atoms only get neighbors if
    /// `padding_need_neigh` is set.
    ///
    /// Contributing atoms outside the cell are first wrapped into it along
    /// the periodic axes, and [`Self::coords`] holds the wrapped positions.
    pub fn new(config: &Configuration, cutoff: f64, padding_need_neigh: bool) -> Result<Self> {
        if !cutoff.is_finite() {
            return Err(KliffError::InvalidParameter(format!(
                "neighbor cutoff must be finite, got {cutoff}"
            )));
        }
        let num_contributing = config.num_atoms();
        let mut coords = config.wrapped_coords()?;

        let padding = if config.pbc.iter().any(|&periodic| periodic) {
            PaddingAtoms::generate(&config.cell, config.pbc, &config.species, &coords, cutoff)?
        } else {
            PaddingAtoms::default()
        };

        coords.extend_from_slice(&padding.coords);
        let mut species = config.species.clone();
        species.extend(padding.species);
        let mut image = (0..num_contributing).collect::<Vec<_>>();
        image.extend(padding.image);

        let need_neighbors = if padding_need_neigh {
            coords.len()
        } else {
            num_contributing
        };

        let mut neighbors = if cutoff > 0.0 {
            let cells = CellList::new(&coords, cutoff);
            let atoms = (0..need_neighbors).collect::<Vec<_>>();
            parallel::map(&atoms, |&i| cells.query(i, &coords, cutoff))
        } else {
            Vec::new()
        };
        neighbors.resize(coords.len(), Neighbors::new());

        log::debug!(
            "neighbor list: {} contributing, {} padding atoms, {} pairs within {cutoff}",
            num_contributing,
            coords.len() - num_contributing,
            neighbors.iter().map(|n| n.len()).sum::<usize>()
        );

        Ok(Self {
            cutoff,
            num_contributing,
            coords,
            species,
            image,
            neighbors,
        })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn num_contributing(&self) -> usize {
        self.num_contributing
    }

    /// Number of contributing + padding atoms
    pub fn num_atoms(&self) -> usize {
        self.coords.len()
    }

    pub fn num_padding(&self) -> usize {
        self.coords.len() - self.num_contributing
    }

    pub fn coords(&self) -> &[Vector3<f64>] {
        &self.coords
    }

    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn image(&self) -> &[usize] {
        &self.image
    }

    pub fn is_contributing(&self, atom: usize) -> bool {
        atom < self.num_contributing
    }

    /// `true` for contributing atoms, `false` for padding atoms
    pub fn status(&self) -> Vec<bool> {
        (0..self.num_atoms())
            .map(|atom| self.is_contributing(atom))
            .collect()
    }

    /// Neighbors of `atom` sorted by index. Empty for padding atoms unless
    /// the list was built with `padding_need_neigh`.
    pub fn neighbors(&self, atom: usize) -> &[usize] {
        &self.neighbors[atom]
    }

    /// Add the forces on padding atoms onto the atoms they are images of,
    /// and return the forces on the contributing atoms only.
    pub fn assemble_padding_forces(&self, forces: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        debug_assert_eq!(forces.len(), self.num_atoms());

        let mut assembled = forces[..self.num_contributing].to_vec();
        for (force, &image) in forces.iter().zip(&self.image).skip(self.num_contributing) {
            assembled[image] += force;
        }
        assembled
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    use super::NeighborList;
    use crate::{configuration::Configuration, testing};

    /// every pair within the cutoff, found by checking all periodic images
    fn brute_force_count(config: &Configuration, atom: usize, cutoff: f64) -> usize {
        let lattice = config.cell().transpose();
        let range = -3..=3;
        let mut count = 0;
        for (i, j, k) in itertools::iproduct!(range.clone(), range.clone(), range) {
            let shift = lattice * Vector3::new(i as f64, j as f64, k as f64);
            for (other, r) in config.coords().iter().enumerate() {
                if other == atom && (i, j, k) == (0, 0, 0) {
                    continue;
                }
                if (r + shift - config.coords()[atom]).norm() < cutoff {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn diamond_has_four_nearest_neighbors() {
        let config = testing::diamond_silicon(5.43, 1);
        let list = NeighborList::new(&config, 2.5, false).unwrap();

        assert_eq!(list.num_contributing(), 8);
        for atom in 0..list.num_contributing() {
            assert_eq!(list.neighbors(atom).len(), 4);
        }
        for atom in list.num_contributing()..list.num_atoms() {
            assert!(list.neighbors(atom).is_empty());
        }
    }

    #[test]
    fn matches_brute_force_search() {
        let config = testing::diamond_silicon(5.43, 1);
        let config = testing::rattled(&config, 0.2, 7);
        let cutoff = 4.5;
        let list = NeighborList::new(&config, cutoff, false).unwrap();

        for atom in 0..list.num_contributing() {
            assert_eq!(
                list.neighbors(atom).len(),
                brute_force_count(&config, atom, cutoff)
            );
            for &neighbor in list.neighbors(atom) {
                let distance = (list.coords()[neighbor] - list.coords()[atom]).norm();
                assert!(distance < cutoff && neighbor != atom);
            }
        }
    }

    #[test]
    fn atoms_outside_the_cell_keep_their_neighbors() {
        let config = testing::rattled(&testing::diamond_silicon(5.43, 1), 0.2, 7);
        let cutoff = 4.5;
        let inside = NeighborList::new(&config, cutoff, false).unwrap();

        let mut outside = config.clone();
        let lattice = config.cell().transpose();
        for (atom, r) in outside.coords.iter_mut().enumerate() {
            let shift = Vector3::new(atom as f64 - 3.0, -2.0, (atom % 3) as f64 + 1.0);
            *r += lattice * shift;
        }
        let shifted = NeighborList::new(&outside, cutoff, false).unwrap();

        for atom in 0..config.num_atoms() {
            assert_eq!(shifted.neighbors(atom).len(), inside.neighbors(atom).len());
            assert_relative_eq!(shifted.coords()[atom], inside.coords()[atom], epsilon = 1e-10);
        }
    }

    #[test]
    fn non_finite_cutoff_is_rejected() {
        let config = testing::diamond_silicon(5.43, 1);
        assert!(NeighborList::new(&config, f64::INFINITY, false).is_err());
        assert!(NeighborList::new(&config, f64::NAN, false).is_err());
    }

    #[test]
    fn padding_neighbors_on_request() {
        let config = testing::diamond_silicon(5.43, 1);
        let list = NeighborList::new(&config, 2.5, true).unwrap();
        assert!(list.num_padding() > 0);
        assert!((list.num_contributing()..list.num_atoms()).any(|atom| !list.neighbors(atom).is_empty()));
    }

    #[test]
    fn isolated_cluster_has_no_padding() {
        let config = Configuration::new(
            Matrix3::zeros(),
            [false; 3],
            vec!["Ar".into(), "Ar".into(), "Ar".into()],
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(5.0, 0.0, 0.0),
            ],
        )
        .unwrap();
        let list = NeighborList::new(&config, 2.0, false).unwrap();

        assert_eq!(list.num_padding(), 0);
        assert_eq!(list.neighbors(0), &[1]);
        assert_eq!(list.neighbors(1), &[0]);
        assert!(list.neighbors(2).is_empty());
        assert_eq!(list.status(), vec![true, true, true]);
    }

    #[test]
    fn zero_cutoff_has_no_neighbors() {
        let config = testing::diamond_silicon(5.43, 1);
        let list = NeighborList::new(&config, 0.0, false).unwrap();
        assert_eq!(list.num_padding(), 0);
        assert!((0..list.num_atoms()).all(|atom| list.neighbors(atom).is_empty()));
    }

    #[test]
    fn tiny_cutoff_over_a_wide_cluster() {
        let config = Configuration::new(
            Matrix3::zeros(),
            [false; 3],
            vec!["Ar".into(), "Ar".into(), "Ar".into()],
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(10.0, 0.0, 0.0),
                Vector3::new(10.0, 5e-10, 0.0),
            ],
        )
        .unwrap();
        let list = NeighborList::new(&config, 1e-9, false).unwrap();

        assert!(list.neighbors(0).is_empty());
        assert_eq!(list.neighbors(1), &[2]);
        assert_eq!(list.neighbors(2), &[1]);
    }

    #[test]
    fn padding_forces_fold_onto_images() {
        let config = testing::diamond_silicon(5.43, 1);
        let list = NeighborList::new(&config, 3.0, false).unwrap();

        let forces = (0..list.num_atoms())
            .map(|atom| Vector3::new(1.0, atom as f64, 0.0))
            .collect::<Vec<_>>();
        let assembled = list.assemble_padding_forces(&forces);

        assert_eq!(assembled.len(), list.num_contributing());
        let total = forces.iter().sum::<Vector3<f64>>();
        let assembled_total = assembled.iter().sum::<Vector3<f64>>();
        assert_relative_eq!(total, assembled_total, epsilon = 1e-9);

        let padding_of_zero = list.image().iter().filter(|&&image| image == 0).count();
        assert_relative_eq!(assembled[0].x, padding_of_zero as f64);
    }
}
