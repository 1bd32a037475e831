//! Native interatomic potentials with fittable parameters.

mod lennard_jones;
mod neural_network;
mod params;
mod stillinger_weber;

pub use lennard_jones::LennardJones;
pub use neural_network::{NetworkOutput, NeuralNetwork};
pub use params::{ComponentFit, FitSpec, ModelParams, Parameter};
pub use stillinger_weber::StillingerWeber;

use nalgebra::Vector3;

use crate::{configuration::VOIGT, neighbor::NeighborList, KliffError, Quantity, Result};

/// What a model is asked to evaluate
#[derive(Copy, Clone, Debug)]
pub struct ModelInput<'a> {
    /// Contributing and padding atoms. Only contributing atoms need
    /// neighbors; the energy is the sum of their site energies.
    pub neighbors: &'a NeighborList,
    pub compute_forces: bool,
    pub compute_virial: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelOutput {
    pub energy: f64,
    /// Site energies, zero for padding atoms. They add up to `energy`.
    pub particle_energy: Vec<f64>,
    /// One entry per contributing and padding atom
    pub forces: Vec<Vector3<f64>>,
    /// `sum (dE/dd)_a d_b` over all bond vectors `d`, Voigt order
    pub virial: [f64; 6],
}

impl ModelOutput {
    pub fn new(num_atoms: usize) -> Self {
        Self {
            energy: 0.0,
            particle_energy: vec![0.0; num_atoms],
            forces: vec![Vector3::zeros(); num_atoms],
            virial: [0.0; 6],
        }
    }

    #[inline]
    pub(crate) fn add_energy(&mut self, atom: usize, energy: f64) {
        self.energy += energy;
        self.particle_energy[atom] += energy;
    }

    /// Record the derivative `de_dr` of the energy with respect to the
    /// length `r` of `bond = r_to - r_from`.
    #[inline]
    pub(crate) fn add_bond(
        &mut self,
        input: &ModelInput,
        from: usize,
        to: usize,
        bond: &Vector3<f64>,
        r: f64,
        de_dr: f64,
    ) {
        let gradient = bond * (de_dr / r);

        if input.compute_forces {
            self.forces[to] -= gradient;
            self.forces[from] += gradient;
        }

        if input.compute_virial {
            for (virial, &(alpha, beta)) in self.virial.iter_mut().zip(&VOIGT) {
                *virial += gradient[alpha] * bond[beta];
            }
        }
    }
}

pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    /// Species the parameters are defined for
    fn species(&self) -> &[String];

    fn supports_species(&self, species: &str) -> bool {
        self.species().iter().any(|s| s == species)
    }

    /// Interaction range, read from the `cutoff` parameter
    fn cutoff(&self) -> f64 {
        self.params().scalar("cutoff").unwrap_or(0.0)
    }

    fn supported_quantities(&self) -> &[Quantity] {
        &[
            Quantity::Energy,
            Quantity::ParticleEnergy,
            Quantity::Forces,
            Quantity::Stress,
        ]
    }

    fn params(&self) -> &ModelParams;

    fn params_mut(&mut self) -> &mut ModelParams;

    /// Evaluate with the current parameters. `output` must be zeroed and
    /// sized for all atoms of the neighbor list.
    fn compute(&self, input: &ModelInput, output: &mut ModelOutput) -> Result<()>;

    fn echo_model_params(&self) -> String {
        self.params().echo_model_params(self.name())
    }

    fn echo_fitting_params(&self) -> String {
        self.params().echo_fitting_params()
    }
}

/// One of the models shipped with this crate, selected by name
#[derive(Clone, Debug)]
pub enum BuiltinModel {
    LennardJones(LennardJones),
    StillingerWeber(StillingerWeber),
}

impl BuiltinModel {
    pub const NAMES: [&'static str; 2] = ["LJ", "SW"];

    /// Default parameters of `name` for `species`
    pub fn from_name(name: &str, species: &str) -> Result<Self> {
        match name {
            "LJ" => Ok(Self::LennardJones(LennardJones::new(species, 0.0104, 3.40, 8.15))),
            "SW" => Ok(Self::StillingerWeber(StillingerWeber::new(species))),
            _ => Err(KliffError::InvalidParameter(format!(
                "unknown model {name:?}, expected one of {:?}",
                Self::NAMES
            ))),
        }
    }

    fn inner(&self) -> &dyn Model {
        match self {
            Self::LennardJones(model) => model,
            Self::StillingerWeber(model) => model,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Model {
        match self {
            Self::LennardJones(model) => model,
            Self::StillingerWeber(model) => model,
        }
    }
}

impl Model for BuiltinModel {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn species(&self) -> &[String] {
        self.inner().species()
    }

    fn params(&self) -> &ModelParams {
        self.inner().params()
    }

    fn params_mut(&mut self) -> &mut ModelParams {
        self.inner_mut().params_mut()
    }

    fn compute(&self, input: &ModelInput, output: &mut ModelOutput) -> Result<()> {
        self.inner().compute(input, output)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    use super::{Model, ModelInput, ModelOutput};
    use crate::{
        configuration::{Configuration, VOIGT},
        neighbor::NeighborList,
    };

    /// Energy, padding-assembled forces and virial of a configuration
    pub(crate) fn evaluate(
        model: &impl Model,
        config: &Configuration,
    ) -> (f64, Vec<Vector3<f64>>, [f64; 6]) {
        let neighbors = NeighborList::new(config, model.cutoff(), false).unwrap();
        let input = ModelInput {
            neighbors: &neighbors,
            compute_forces: true,
            compute_virial: true,
        };
        let mut output = ModelOutput::new(neighbors.num_atoms());
        model.compute(&input, &mut output).unwrap();
        let forces = neighbors.assemble_padding_forces(&output.forces);
        (output.energy, forces, output.virial)
    }

    /// Compare forces and virial against central differences of the energy
    pub(crate) fn check_derivatives(model: &impl Model, config: &Configuration) {
        let (_, forces, virial) = evaluate(model, config);

        let h = 1e-5;
        for (atom, dim) in itertools::iproduct!(0..config.num_atoms(), 0..3) {
            let mut plus = config.clone();
            plus.coords[atom][dim] += h;
            let mut minus = config.clone();
            minus.coords[atom][dim] -= h;

            let numerical = -(evaluate(model, &plus).0 - evaluate(model, &minus).0) / (2.0 * h);
            assert_relative_eq!(forces[atom][dim], numerical, epsilon = 1e-6, max_relative = 1e-5);
        }

        for (voigt, &(alpha, beta)) in VOIGT.iter().enumerate() {
            let mut strain = Matrix3::zeros();
            strain[(alpha, beta)] = h;

            let plus = config.deformed(&(Matrix3::identity() + strain));
            let minus = config.deformed(&(Matrix3::identity() - strain));
            let numerical = (evaluate(model, &plus).0 - evaluate(model, &minus).0) / (2.0 * h);
            assert_relative_eq!(virial[voigt], numerical, epsilon = 1e-6, max_relative = 1e-5);
        }
    }
}
