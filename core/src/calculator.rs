//! Evaluation of a model over a set of configurations.

use nalgebra::Vector3;

use crate::{
    configuration::Configuration,
    models::{Model, ModelInput, ModelOutput},
    neighbor::NeighborList,
    parallel, KliffError, Quantity, Result,
};

/// Everything needed to evaluate a model on one configuration: the atoms,
/// their neighbor list, the requested quantities and the latest results.
#[derive(Clone, Debug)]
pub struct ComputeArguments {
    config: Configuration,
    neighbors: NeighborList,
    use_energy: bool,
    use_forces: bool,
    use_stress: bool,
    use_particle_energy: bool,
    energy: Option<f64>,
    particle_energy: Option<Vec<f64>>,
    forces: Option<Vec<Vector3<f64>>>,
    stress: Option<[f64; 6]>,
}

impl ComputeArguments {
    /// Check that `model` can evaluate the requested quantities on `config`
    /// and build the neighbor list.
    pub fn new(
        config: Configuration,
        model: &impl Model,
        use_energy: bool,
        use_forces: bool,
        use_stress: bool,
    ) -> Result<Self> {
        let fail = |reason: String| KliffError::Initialization {
            model: model.name().to_string(),
            reason,
        };

        let cutoff = model.cutoff();
        if !(cutoff > 0.0) {
            return Err(fail(format!("cutoff must be positive, got {cutoff}")));
        }

        if let Some(species) = config.species_set().into_iter().find(|s| !model.supports_species(s)) {
            return Err(fail(format!("species {species:?} not supported")));
        }

        let requested = [
            (use_energy, Quantity::Energy),
            (use_forces, Quantity::Forces),
            (use_stress, Quantity::Stress),
        ];
        for (_, quantity) in requested.iter().filter(|(used, _)| *used) {
            if !model.supported_quantities().contains(quantity) {
                return Err(fail(format!("{quantity} requested but not provided")));
            }
        }

        if use_stress && config.volume() == 0.0 {
            return Err(fail("stress requires a cell with nonzero volume".to_string()));
        }

        let neighbors = NeighborList::new(&config, cutoff, false)?;

        Ok(Self {
            config,
            neighbors,
            use_energy,
            use_forces,
            use_stress,
            use_particle_energy: false,
            energy: None,
            particle_energy: None,
            forces: None,
            stress: None,
        })
    }

    /// Also keep the energy of every contributing atom. Not part of the
    /// prediction.
    pub fn with_particle_energy(mut self, model: &impl Model) -> Result<Self> {
        if !model.supported_quantities().contains(&Quantity::ParticleEnergy) {
            return Err(KliffError::Initialization {
                model: model.name().to_string(),
                reason: format!("{} requested but not provided", Quantity::ParticleEnergy),
            });
        }
        self.use_particle_energy = true;
        Ok(self)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn neighbors(&self) -> &NeighborList {
        &self.neighbors
    }

    pub fn compute(&mut self, model: &impl Model) -> Result<()> {
        let cutoff = model.cutoff();
        if cutoff > self.neighbors.cutoff() {
            log::debug!(
                "cutoff grew from {} to {cutoff}, rebuilding neighbor list",
                self.neighbors.cutoff()
            );
            self.neighbors = NeighborList::new(&self.config, cutoff, false)?;
        }

        let input = ModelInput {
            neighbors: &self.neighbors,
            compute_forces: self.use_forces,
            compute_virial: self.use_stress,
        };
        let mut output = ModelOutput::new(self.neighbors.num_atoms());
        model.compute(&input, &mut output)?;

        self.energy = self.use_energy.then_some(output.energy);
        self.particle_energy = self
            .use_particle_energy
            .then(|| output.particle_energy[..self.neighbors.num_contributing()].to_vec());
        self.forces = self
            .use_forces
            .then(|| self.neighbors.assemble_padding_forces(&output.forces));
        self.stress = if self.use_stress {
            let volume = self.config.volume();
            Some(output.virial.map(|w| w / volume))
        } else {
            None
        };

        Ok(())
    }

    pub fn get_energy(&self) -> Result<f64> {
        self.energy.ok_or(KliffError::Unsupported(Quantity::Energy))
    }

    /// Site energies of the contributing atoms
    pub fn get_particle_energy(&self) -> Result<&[f64]> {
        self.particle_energy
            .as_deref()
            .ok_or(KliffError::Unsupported(Quantity::ParticleEnergy))
    }

    /// Forces on the contributing atoms
    pub fn get_forces(&self) -> Result<&[Vector3<f64>]> {
        self.forces
            .as_deref()
            .ok_or(KliffError::Unsupported(Quantity::Forces))
    }

    /// Virial divided by the cell volume, Voigt order
    pub fn get_stress(&self) -> Result<&[f64; 6]> {
        self.stress
            .as_ref()
            .ok_or(KliffError::Unsupported(Quantity::Stress))
    }

    /// The requested quantities of the last evaluation, flattened: energy,
    /// then forces, then stress
    pub fn get_prediction(&self) -> Result<Vec<f64>> {
        let mut prediction = Vec::new();
        if self.use_energy {
            prediction.push(self.get_energy()?);
        }
        if self.use_forces {
            prediction.extend(self.get_forces()?.iter().flat_map(|f| f.iter().copied()));
        }
        if self.use_stress {
            prediction.extend_from_slice(self.get_stress()?);
        }
        Ok(prediction)
    }

    /// Reference data laid out like [`Self::get_prediction`]
    pub fn get_reference(&self) -> Result<Vec<f64>> {
        let missing = |quantity: Quantity| {
            KliffError::InvalidParameter(format!(
                "configuration {} has no reference {quantity}",
                self.config.identifier().unwrap_or("<unnamed>")
            ))
        };

        let mut reference = Vec::new();
        if self.use_energy {
            reference.push(self.config.energy().ok_or_else(|| missing(Quantity::Energy))?);
        }
        if self.use_forces {
            let forces = self.config.forces().ok_or_else(|| missing(Quantity::Forces))?;
            reference.extend(forces.iter().flat_map(|f| f.iter().copied()));
        }
        if self.use_stress {
            reference.extend_from_slice(self.config.stress().ok_or_else(|| missing(Quantity::Stress))?);
        }
        Ok(reference)
    }

    pub fn uses(&self, quantity: Quantity) -> bool {
        match quantity {
            Quantity::Energy => self.use_energy,
            Quantity::ParticleEnergy => self.use_particle_energy,
            Quantity::Forces => self.use_forces,
            Quantity::Stress => self.use_stress,
        }
    }
}

/// A model together with the configurations it is evaluated on
#[derive(Clone, Debug)]
pub struct Calculator<M> {
    model: M,
    compute_arguments: Vec<ComputeArguments>,
}

impl<M: Model> Calculator<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            compute_arguments: Vec::new(),
        }
    }

    /// Prepare the compute arguments of every configuration
    pub fn create(
        &mut self,
        configs: &[Configuration],
        use_energy: bool,
        use_forces: bool,
        use_stress: bool,
    ) -> Result<()> {
        let model = &self.model;
        self.compute_arguments = parallel::try_map(configs, |config| {
            ComputeArguments::new(config.clone(), model, use_energy, use_forces, use_stress)
        })?;

        log::info!(
            "{} calculator created for {} configurations",
            self.model.name(),
            self.compute_arguments.len()
        );
        Ok(())
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn compute_arguments(&self) -> &[ComputeArguments] {
        &self.compute_arguments
    }

    pub fn compute(&self, ca: &mut ComputeArguments) -> Result<()> {
        ca.compute(&self.model)
    }

    /// Evaluate every configuration, in parallel if enabled
    pub fn compute_all(&mut self) -> Result<()> {
        let model = &self.model;
        parallel::try_map_mut(&mut self.compute_arguments, |ca| ca.compute(model))?;
        Ok(())
    }

    pub fn get_opt_params(&self) -> Vec<f64> {
        self.model.params().opt_params()
    }

    pub fn get_opt_bounds(&self) -> Vec<(Option<f64>, Option<f64>)> {
        self.model.params().opt_bounds()
    }

    pub fn update_opt_params(&mut self, x: &[f64]) -> Result<()> {
        self.model.params_mut().update_opt_params(x)
    }
}
