pub mod calculator;
pub mod config;
pub mod configuration;
pub mod dataset;
pub mod descriptors;
mod error;
pub mod loss;
pub mod minimize;
pub mod models;
pub mod neighbor;
pub mod parallel;

pub use error::{KliffError, Quantity, Result};

pub mod testing {
    //! Reference crystals shared by the tests and benchmarks.
    use nalgebra::{Matrix3, Vector3};

    use crate::configuration::Configuration;

    /// Conventional 8-atom cubic cell of diamond silicon, repeated `reps`
    /// times along each axis.
    pub fn diamond_silicon(lattice_constant: f64, reps: usize) -> Configuration {
        const BASIS: [[f64; 3]; 8] = [
            [0.0, 0.0, 0.0],
            [0.0, 0.5, 0.5],
            [0.5, 0.0, 0.5],
            [0.5, 0.5, 0.0],
            [0.25, 0.25, 0.25],
            [0.25, 0.75, 0.75],
            [0.75, 0.25, 0.75],
            [0.75, 0.75, 0.25],
        ];

        cubic_crystal("Si", &BASIS, lattice_constant, reps)
    }

    /// Conventional 4-atom cubic cell of fcc argon, repeated `reps` times
    /// along each axis.
    pub fn fcc_argon(lattice_constant: f64, reps: usize) -> Configuration {
        const BASIS: [[f64; 3]; 4] = [
            [0.0, 0.0, 0.0],
            [0.0, 0.5, 0.5],
            [0.5, 0.0, 0.5],
            [0.5, 0.5, 0.0],
        ];

        cubic_crystal("Ar", &BASIS, lattice_constant, reps)
    }

    fn cubic_crystal(
        species: &str,
        basis: &[[f64; 3]],
        lattice_constant: f64,
        reps: usize,
    ) -> Configuration {
        let mut coords = Vec::with_capacity(basis.len() * reps.pow(3));
        for (i, j, k) in itertools::iproduct!(0..reps, 0..reps, 0..reps) {
            for [x, y, z] in basis {
                coords.push(
                    lattice_constant
                        * Vector3::new(x + i as f64, y + j as f64, z + k as f64),
                );
            }
        }

        Configuration {
            cell: Matrix3::from_diagonal_element(lattice_constant * reps as f64),
            pbc: [true; 3],
            species: vec![species.to_string(); coords.len()],
            coords,
            energy: None,
            forces: None,
            stress: None,
            weight: 1.0,
            identifier: None,
        }
    }

    /// Displace every atom by a uniformly random vector with components in
    /// `[-amplitude, amplitude)`.
    #[cfg(test)]
    pub(crate) fn rattled(config: &Configuration, amplitude: f64, seed: u64) -> Configuration {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(seed);
        let mut rattled = config.clone();
        for r in &mut rattled.coords {
            *r += Vector3::from_fn(|_, _| rng.gen_range(-amplitude..amplitude));
        }
        rattled
    }
}
