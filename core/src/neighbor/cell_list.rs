use std::collections::HashMap;

use nalgebra::Vector3;

use super::Neighbors;

/// Bin index in the cartesian grid
type Bin = (i64, i64, i64);

/// Bins are widened beyond the cutoff when the atoms would otherwise span
/// more than this many bins along an axis.
const MAX_BINS_PER_AXIS: f64 = 1048576.0;

/// Spatial hash of atoms into cubic bins with a side of at least the cutoff,
/// so that all neighbors of an atom are in the 27 bins around it.
/// Only occupied bins are stored.
pub(super) struct CellList {
    bin_size: f64,
    origin: Vector3<f64>,
    bins: HashMap<Bin, Vec<usize>>,
}

impl CellList {
    pub(super) fn new(coords: &[Vector3<f64>], cutoff: f64) -> Self {
        let origin = coords
            .iter()
            .fold(Vector3::repeat(f64::INFINITY), |min, r| min.inf(r));
        let extent = coords
            .iter()
            .fold(Vector3::zeros(), |max: Vector3<f64>, r| max.sup(&(r - origin)));
        let bin_size = cutoff.max(extent.max() / MAX_BINS_PER_AXIS);

        let mut cells = Self {
            bin_size,
            origin,
            bins: HashMap::new(),
        };
        for (atom, r) in coords.iter().enumerate() {
            let bin = cells.bin_of(r);
            cells.bins.entry(bin).or_default().push(atom);
        }
        cells
    }

    fn bin_of(&self, r: &Vector3<f64>) -> Bin {
        let index = ((r - self.origin) / self.bin_size).map(|x| x.floor() as i64);
        (index.x, index.y, index.z)
    }

    /// All atoms other than `atom` closer to it than `cutoff`, sorted.
    /// `cutoff` must not exceed the bin size.
    pub(super) fn query(&self, atom: usize, coords: &[Vector3<f64>], cutoff: f64) -> Neighbors {
        debug_assert!(cutoff <= self.bin_size);
        let center = coords[atom];
        let (x, y, z) = self.bin_of(&center);
        let cutoff_sq = cutoff * cutoff;

        let mut neighbors = Neighbors::new();
        for (dx, dy, dz) in itertools::iproduct!(-1..=1, -1..=1, -1..=1) {
            let Some(members) = self.bins.get(&(x + dx, y + dy, z + dz)) else {
                continue;
            };

            neighbors.extend(members.iter().copied().filter(|&other| {
                other != atom && (coords[other] - center).norm_squared() < cutoff_sq
            }));
        }

        neighbors.sort_unstable();
        neighbors
    }
}
