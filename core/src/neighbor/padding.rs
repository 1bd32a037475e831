//! Padding (ghost) atoms for periodic cells.
//!
//! A neighbor search that only knows about the atoms inside the cell misses
//! every interaction that crosses a periodic boundary. The padding atoms
//! generated here are images of the contributing atoms, placed in a shell of
//! thickness `cutoff` around the cell, so that a plain cartesian search over
//! contributing + padding atoms sees every neighbor within the cutoff.

use nalgebra::{Matrix3, Vector3};

use crate::{
    configuration::{inverse_lattice, lattice_vectors},
    KliffError, Result,
};

/// Added to the ceiling of `cutoff / face_distance` so that a ratio that is
/// an integer up to rounding does not lose a shell.
const SHELL_EPSILON: f64 = 1e-10;

/// Image atoms surrounding a periodic cell. The three vectors are parallel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaddingAtoms {
    /// Cartesian coordinates of the padding atoms
    pub coords: Vec<Vector3<f64>>,
    /// Species of each padding atom, copied from its image
    pub species: Vec<String>,
    /// Index of the contributing atom each padding atom is an image of
    pub image: Vec<usize>,
}

impl PaddingAtoms {
    /// Create the padding atoms of a cell.
    ///
    /// This works no matter whether `cutoff` is smaller or larger than the
    /// cell: as many periodic repeats are generated along each periodic axis
    /// as are needed to cover the cutoff sphere. Along non-periodic axes no
    /// translation is ever applied.
    ///
    /// Atoms in the outermost shell are only kept if their image falls
    /// within `cutoff` (measured perpendicular to the cell faces) of the
    /// cell. The comparisons at the shell boundary are strict, so an atom
    /// exactly at the extended boundary is kept. Pruning assumes fractional
    /// coordinates in `[0, 1]`; [`super::NeighborList`] wraps atoms into
    /// the cell first.
    ///
    /// Face distances are taken from the unsigned cell volume. With the
    /// signed volume a left-handed cell would give negative distances and
    /// no padding at all; here it pads like its mirror image.
    ///
    /// Fails if the cell is singular or `cutoff` is not finite.
    pub fn generate(
        cell: &Matrix3<f64>,
        pbc: [bool; 3],
        species: &[String],
        coords: &[Vector3<f64>],
        cutoff: f64,
    ) -> Result<Self> {
        debug_assert_eq!(species.len(), coords.len());
        if !cutoff.is_finite() {
            return Err(KliffError::InvalidParameter(format!(
                "padding cutoff must be finite, got {cutoff}"
            )));
        }

        let to_fractional = inverse_lattice(cell)?;
        let frac_coords = coords
            .iter()
            .map(|r| to_fractional * r)
            .collect::<Vec<_>>();

        let ratio = face_distances(cell).map(|distance| cutoff / distance);
        let size = ratio.map(|ratio| (ratio.ceil() + SHELL_EPSILON) as i32);
        log::debug!("padding: cutoff ratios {ratio:?}, shells {size:?}, pbc {pbc:?}");

        let mut padding = Self::default();
        for (i, j, k) in itertools::iproduct!(
            -size[0]..=size[0],
            -size[1]..=size[1],
            -size[2]..=size[2]
        ) {
            // the zero translation are the contributing atoms themselves
            if i == 0 && j == 0 && k == 0 {
                continue;
            }
            if (!pbc[0] && i != 0) || (!pbc[1] && j != 0) || (!pbc[2] && k != 0) {
                continue;
            }

            let shift = Vector3::new(i, j, k);
            for (at, frac) in frac_coords.iter().enumerate() {
                if is_outside_shell(&shift, frac, &size, &ratio) {
                    continue;
                }

                padding.coords.push(frac + shift.map(f64::from));
                padding.species.push(species[at].clone());
                padding.image.push(at);
            }
        }

        let to_cartesian = cell.transpose();
        for r in &mut padding.coords {
            *r = to_cartesian * *r;
        }

        log::debug!(
            "padding: {} padding atoms for {} contributing atoms",
            padding.len(),
            coords.len()
        );
        Ok(padding)
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}

/// Distances between opposite faces of the parallelepiped spanned by the
/// lattice vectors. Entry `k` is measured along the direction of `a_k`.
/// Left-handed cells give the same distances as their mirror image.
pub fn face_distances(cell: &Matrix3<f64>) -> [f64; 3] {
    let (a0, a1, a2) = lattice_vectors(cell);
    let volume = a0.dot(&a1.cross(&a2)).abs();

    [
        volume / a1.cross(&a2).norm(),
        volume / a2.cross(&a0).norm(),
        volume / a0.cross(&a1).norm(),
    ]
}

/// Whether the image of an atom at fractional coordinate `frac` translated
/// by `shift` lies beyond the cutoff-extended cell. Only the outermost shell
/// along each axis can be pruned.
fn is_outside_shell(
    shift: &Vector3<i32>,
    frac: &Vector3<f64>,
    size: &[i32; 3],
    ratio: &[f64; 3],
) -> bool {
    (0..3).any(|axis| {
        let (n, x, size, ratio) = (shift[axis], frac[axis], size[axis], ratio[axis]);
        (n == -size && x < size as f64 - ratio) || (n == size && x > 1.0 + ratio - size as f64)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    use super::{face_distances, PaddingAtoms};

    fn generate(
        cell: &Matrix3<f64>,
        pbc: [bool; 3],
        coords: &[Vector3<f64>],
        cutoff: f64,
    ) -> PaddingAtoms {
        let species = vec!["Ar".to_string(); coords.len()];
        PaddingAtoms::generate(cell, pbc, &species, coords, cutoff).unwrap()
    }

    /// integer translation of every padding atom relative to its image
    fn translations(
        cell: &Matrix3<f64>,
        coords: &[Vector3<f64>],
        padding: &PaddingAtoms,
    ) -> Vec<Vector3<i32>> {
        let inverse = cell.transpose().try_inverse().unwrap();
        padding
            .coords
            .iter()
            .zip(&padding.image)
            .map(|(r, &at)| (inverse * (r - coords[at])).map(|x| x.round() as i32))
            .collect()
    }

    fn grid(side: f64, n: usize) -> Vec<Vector3<f64>> {
        let step = side / n as f64;
        itertools::iproduct!(0..n, 0..n, 0..n)
            .map(|(i, j, k)| {
                Vector3::new(
                    (i as f64 + 0.5) * step,
                    (j as f64 + 0.5) * step,
                    (k as f64 + 0.5) * step,
                )
            })
            .collect()
    }

    #[test]
    fn cubic_face_distances() {
        let cell = Matrix3::from_diagonal_element(10.0);
        assert_eq!(face_distances(&cell), [10.0, 10.0, 10.0]);
    }

    #[test]
    fn triclinic_face_distances() {
        let cell = Matrix3::new(4.0, 0.0, 0.0, 1.0, 5.0, 0.0, 0.5, 0.3, 6.0);
        let [d0, d1, d2] = face_distances(&cell);

        // distance between the planes spanned by the other two vectors
        let normal0 = Vector3::new(1.0, 5.0, 0.0)
            .cross(&Vector3::new(0.5, 0.3, 6.0))
            .normalize();
        assert_relative_eq!(d0, Vector3::new(4.0, 0.0, 0.0).dot(&normal0), epsilon = 1e-12);
        assert_relative_eq!(d2, 6.0, epsilon = 1e-12);
        assert!(d1 < 5.0);
    }

    #[test]
    fn left_handed_cell() {
        let cell = Matrix3::new(0.0, 5.0, 0.0, 4.0, 0.0, 0.0, 0.0, 0.0, 6.0);
        assert_eq!(face_distances(&cell), [5.0, 4.0, 6.0]);

        let padding = generate(&cell, [true; 3], &[Vector3::new(2.0, 2.5, 3.0)], 3.5);
        assert_eq!(padding.len(), 26);
    }

    #[test]
    fn zero_cutoff_creates_nothing() {
        let cell = Matrix3::from_diagonal_element(10.0);
        let coords = grid(10.0, 3);

        for pbc in [[true; 3], [false; 3], [true, false, true]] {
            let padding = generate(&cell, pbc, &coords, 0.0);
            assert!(padding.is_empty());
        }
    }

    #[test]
    fn no_padding_without_pbc() {
        let cell = Matrix3::from_diagonal_element(10.0);
        let padding = generate(&cell, [false; 3], &grid(10.0, 3), 4.5);
        assert!(padding.is_empty());
    }

    #[test]
    fn non_periodic_axes_are_never_translated() {
        let cell = Matrix3::new(6.0, 0.0, 0.0, 1.5, 7.0, 0.0, 0.0, 0.0, 8.0);
        let coords = grid(6.0, 3);
        let padding = generate(&cell, [true, false, true], &coords, 5.0);

        assert!(!padding.is_empty());
        for shift in translations(&cell, &coords, &padding) {
            assert_eq!(shift.y, 0);
        }
    }

    #[test]
    fn cubic_cell_symmetric_shell() {
        let cell = Matrix3::from_diagonal_element(10.0);
        let coords = grid(10.0, 4);
        let padding = generate(&cell, [true; 3], &coords, 4.5);

        let shifts = translations(&cell, &coords, &padding)
            .into_iter()
            .collect::<HashSet<_>>();

        let expected = itertools::iproduct!(-1..=1, -1..=1, -1..=1)
            .filter(|&(i, j, k)| (i, j, k) != (0, 0, 0))
            .map(|(i, j, k)| Vector3::new(i, j, k))
            .collect::<HashSet<_>>();
        assert_eq!(shifts, expected);

        // pruning keeps images inside [-ratio, 1 + ratio]
        let ratio = 0.45;
        for r in &padding.coords {
            let frac = r / 10.0;
            for x in frac.iter() {
                assert!(*x >= -ratio && *x <= 1.0 + ratio, "{frac:?}");
            }
        }
    }

    #[test]
    fn cubic_cell_pruning_of_single_atoms() {
        let cell = Matrix3::from_diagonal_element(10.0);

        // fractional 0.5 is farther than the cutoff from every face
        let centered = generate(&cell, [true; 3], &[Vector3::new(5.0, 5.0, 5.0)], 4.5);
        assert!(centered.is_empty());

        // near the origin, only the images towards +x, +y, +z survive
        let coords = [Vector3::new(1.0, 1.0, 1.0)];
        let corner = generate(&cell, [true; 3], &coords, 4.5);
        assert_eq!(corner.len(), 7);
        for shift in translations(&cell, &coords, &corner) {
            assert!(shift.iter().all(|&n| n == 0 || n == 1));
        }

        let coords = [Vector3::new(9.0, 9.0, 9.0)];
        let corner = generate(&cell, [true; 3], &coords, 4.5);
        assert_eq!(corner.len(), 7);
        for shift in translations(&cell, &coords, &corner) {
            assert!(shift.iter().all(|&n| n == 0 || n == -1));
        }
    }

    #[test]
    fn shell_count_matches_ratio() {
        let cell = Matrix3::from_diagonal_element(3.0);
        let coords = grid(3.0, 2);
        // ceil(7.0 / 3.0) = 3 repeats in each direction
        let padding = generate(&cell, [true; 3], &coords, 7.0);

        let max_shift = translations(&cell, &coords, &padding)
            .into_iter()
            .flat_map(|shift| shift.iter().map(|n| n.abs()).collect::<Vec<_>>())
            .max()
            .unwrap();
        assert_eq!(max_shift, 3);
    }

    fn max_shift(cell: &Matrix3<f64>, coords: &[Vector3<f64>], cutoff: f64) -> i32 {
        let padding = generate(cell, [true; 3], coords, cutoff);
        translations(cell, coords, &padding)
            .into_iter()
            .flat_map(|shift| shift.iter().map(|n| n.abs()).collect::<Vec<_>>())
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn cutoff_equal_to_the_cell_side() {
        let cell = Matrix3::from_diagonal_element(10.0);
        let coords = grid(10.0, 2);

        // ratio is exactly 1: a single shell, nothing pruned
        let padding = generate(&cell, [true; 3], &coords, 10.0);
        assert_eq!(padding.len(), 26 * coords.len());
        assert_eq!(max_shift(&cell, &coords, 10.0), 1);

        // an atom on the face reaches into a second shell only once the
        // cutoff exceeds the side
        let on_face = [Vector3::new(0.0, 5.0, 5.0)];
        assert_eq!(max_shift(&cell, &on_face, 10.0), 1);
        assert_eq!(max_shift(&cell, &on_face, 10.0 + 1e-6), 2);
    }

    #[test]
    fn pruning_uses_coordinates_as_given() {
        let cell = Matrix3::from_diagonal_element(10.0);

        // fractional x = 2.1 keeps only the image one cell down, at 1.1,
        // and nothing lands at 0.1 next to the -x face
        let outside = generate(&cell, [true; 3], &[Vector3::new(21.0, 5.0, 5.0)], 4.5);
        assert_eq!(outside.len(), 1);
        assert_relative_eq!(outside.coords[0], Vector3::new(11.0, 5.0, 5.0), epsilon = 1e-12);

        // the same atom wrapped to 0.1 sits next to the -x face itself
        let inside = generate(&cell, [true; 3], &[Vector3::new(1.0, 5.0, 5.0)], 4.5);
        assert_eq!(inside.len(), 1);
        assert_relative_eq!(inside.coords[0], Vector3::new(11.0, 5.0, 5.0), epsilon = 1e-12);
    }

    #[test]
    fn non_finite_cutoff_fails() {
        let cell = Matrix3::from_diagonal_element(10.0);
        let species = vec!["Ar".to_string()];
        for cutoff in [f64::INFINITY, f64::NAN] {
            let result = PaddingAtoms::generate(&cell, [true; 3], &species, &[Vector3::zeros()], cutoff);
            assert!(result.is_err());
        }
    }

    #[test]
    fn every_face_receives_padding() {
        let side = 10.0;
        let cell = Matrix3::from_diagonal_element(side);
        let coords = grid(side, 4);
        let cutoff = 3.0;
        let padding = generate(&cell, [true; 3], &coords, cutoff);

        for axis in 0..3 {
            assert!(padding.coords.iter().any(|r| r[axis] < 0.0));
            assert!(padding.coords.iter().any(|r| r[axis] > side));
        }
    }

    #[test]
    fn images_and_round_trip() {
        let cell = Matrix3::new(5.0, 0.0, 0.0, 2.0, 4.5, 0.0, 0.7, 1.1, 6.0);
        let coords = vec![
            Vector3::new(0.2, 0.4, 0.1),
            Vector3::new(3.0, 2.5, 3.0),
            Vector3::new(6.0, 4.0, 5.5),
        ];
        let species = vec!["Mo".to_string(), "S".to_string(), "S".to_string()];
        let padding = PaddingAtoms::generate(&cell, [true; 3], &species, &coords, 4.0).unwrap();

        assert_eq!(padding.coords.len(), padding.len());
        assert_eq!(padding.species.len(), padding.len());

        let inverse = cell.transpose().try_inverse().unwrap();
        for ((r, s), &at) in padding.coords.iter().zip(&padding.species).zip(&padding.image) {
            assert!(at < coords.len());
            assert_eq!(s, &species[at]);

            let back = cell.transpose() * (inverse * r);
            assert_relative_eq!(back, *r, epsilon = 1e-10);
        }

        // every image is a lattice translation of its source atom
        for ((r, &at), shift) in padding
            .coords
            .iter()
            .zip(&padding.image)
            .zip(translations(&cell, &coords, &padding))
        {
            let expected = coords[at] + cell.transpose() * shift.map(f64::from);
            assert_relative_eq!(*r, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn singular_cell_fails() {
        let cell = Matrix3::new(1.0, 1.0, 0.0, 2.0, 2.0, 0.0, 0.0, 0.0, 1.0);
        let species = vec!["Ar".to_string()];
        let result = PaddingAtoms::generate(&cell, [true; 3], &species, &[Vector3::zeros()], 1.0);
        assert!(result.is_err());
    }
}
