use crate::Result;

use super::{Model, ModelInput, ModelOutput, ModelParams};

/// Truncated 12-6 Lennard-Jones pair potential
/// `4 epsilon ((sigma/r)^12 - (sigma/r)^6)` for `r < cutoff`.
#[derive(Clone, Debug)]
pub struct LennardJones {
    species: Vec<String>,
    params: ModelParams,
}

impl LennardJones {
    pub fn new(species: &str, epsilon: f64, sigma: f64, cutoff: f64) -> Self {
        let mut params = ModelParams::new();
        params.push("epsilon", vec![epsilon], "depth of the potential well");
        params.push("sigma", vec![sigma], "distance at which the potential is zero");
        params.push("cutoff", vec![cutoff], "interaction range");

        Self {
            species: vec![species.to_string()],
            params,
        }
    }

    /// Parameters for argon
    pub fn argon() -> Self {
        Self::new("Ar", 0.0104, 3.40, 8.15)
    }

    /// Pair energy and its radial derivative
    #[inline]
    fn pair(epsilon: f64, sigma: f64, r: f64) -> (f64, f64) {
        let sr6 = (sigma / r).powi(6);
        let sr12 = sr6 * sr6;
        (
            4.0 * epsilon * (sr12 - sr6),
            24.0 * epsilon * (sr6 - 2.0 * sr12) / r,
        )
    }
}

impl Model for LennardJones {
    fn name(&self) -> &str {
        "LJ"
    }

    fn species(&self) -> &[String] {
        &self.species
    }

    fn params(&self) -> &ModelParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ModelParams {
        &mut self.params
    }

    fn compute(&self, input: &ModelInput, output: &mut ModelOutput) -> Result<()> {
        let epsilon = self.params.scalar("epsilon")?;
        let sigma = self.params.scalar("sigma")?;
        let cutoff = self.params.scalar("cutoff")?;

        let list = input.neighbors;
        let coords = list.coords();
        for i in 0..list.num_contributing() {
            for &j in list.neighbors(i) {
                let bond = coords[j] - coords[i];
                let r = bond.norm();
                if r >= cutoff {
                    continue;
                }

                // every pair is visited from both sides
                let (energy, de_dr) = Self::pair(epsilon, sigma, r);
                output.add_energy(i, 0.5 * energy);
                output.add_bond(input, i, j, &bond, r, 0.5 * de_dr);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    use super::LennardJones;
    use crate::{
        configuration::Configuration,
        models::{testing, Model},
        testing as crystals,
    };

    fn dimer(r: f64) -> Configuration {
        Configuration::new(
            Matrix3::zeros(),
            [false; 3],
            vec!["Ar".into(), "Ar".into()],
            vec![Vector3::zeros(), Vector3::new(r, 0.0, 0.0)],
        )
        .unwrap()
    }

    #[test]
    fn dimer_minimum() {
        let model = LennardJones::argon();
        let r_min = 2f64.powf(1.0 / 6.0) * 3.40;
        let (energy, forces, _) = testing::evaluate(&model, &dimer(r_min));

        assert_relative_eq!(energy, -0.0104, epsilon = 1e-12);
        assert_relative_eq!(forces[0].norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(forces[1].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn repulsive_dimer_pushes_apart() {
        let model = LennardJones::argon();
        let (_, forces, _) = testing::evaluate(&model, &dimer(3.0));
        assert!(forces[0].x < 0.0 && forces[1].x > 0.0);
        assert_relative_eq!(forces[0] + forces[1], Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn truncated_at_cutoff() {
        let model = LennardJones::argon();
        let (energy, _, _) = testing::evaluate(&model, &dimer(8.2));
        assert_eq!(energy, 0.0);
    }

    #[test]
    fn crystal_derivatives() {
        let model = LennardJones::argon();
        let config = crystals::rattled(&crystals::fcc_argon(5.26, 2), 0.1, 3);
        assert_eq!(model.name(), "LJ");
        testing::check_derivatives(&model, &config);
    }
}
