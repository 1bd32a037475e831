//! Least-squares loss of a model against the reference data.

use serde::{Deserialize, Serialize};

use crate::{
    calculator::{Calculator, ComputeArguments},
    descriptors::Fingerprints,
    minimize::Objective,
    models::{Model, NeuralNetwork},
    parallel, KliffError, Quantity, Result,
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualWeights {
    pub energy_weight: f64,
    pub forces_weight: f64,
    pub stress_weight: f64,
    /// Divide the energy residual by the number of atoms
    pub normalize_by_natoms: bool,
}

impl Default for ResidualWeights {
    fn default() -> Self {
        Self {
            energy_weight: 1.0,
            forces_weight: 1.0,
            stress_weight: 1.0,
            normalize_by_natoms: true,
        }
    }
}

impl ResidualWeights {
    /// Weighted difference between prediction and reference of one
    /// configuration
    pub fn residual(&self, ca: &ComputeArguments) -> Result<Vec<f64>> {
        let config = ca.configuration();
        self.weigh(
            &ca.get_prediction()?,
            &ca.get_reference()?,
            config.num_atoms(),
            config.weight(),
            |quantity| ca.uses(quantity),
        )
    }

    /// Weighted residual of vectors laid out as `[energy, forces..., stress...]`
    /// with the quantities for which `uses` holds
    pub fn weigh(
        &self,
        prediction: &[f64],
        reference: &[f64],
        num_atoms: usize,
        config_weight: f64,
        uses: impl Fn(Quantity) -> bool,
    ) -> Result<Vec<f64>> {
        // per component weights in the layout of the prediction
        let mut weights = Vec::with_capacity(prediction.len());
        if uses(Quantity::Energy) {
            let scale = if self.normalize_by_natoms { num_atoms as f64 } else { 1.0 };
            weights.push(self.energy_weight / scale);
        }
        if uses(Quantity::Forces) {
            weights.extend(std::iter::repeat(self.forces_weight).take(3 * num_atoms));
        }
        if uses(Quantity::Stress) {
            weights.extend([self.stress_weight; 6]);
        }

        if prediction.len() != weights.len() || reference.len() != weights.len() {
            return Err(KliffError::InvalidParameter(format!(
                "prediction has {} components and reference {}, expected {}",
                prediction.len(),
                reference.len(),
                weights.len()
            )));
        }

        Ok(itertools::izip!(prediction, reference, &weights)
            .map(|(p, r, w)| config_weight * w * (p - r))
            .collect())
    }
}

fn half_sum_of_squares(residuals: &[Vec<f64>]) -> f64 {
    residuals.iter().flatten().map(|r| r * r).sum::<f64>() * 0.5
}

/// Central differences of `f` with relative step `step`, one-sided at the
/// bounds
fn finite_difference_gradient(
    x: &[f64],
    bounds: &[(Option<f64>, Option<f64>)],
    step: f64,
    mut f: impl FnMut(&[f64]) -> Result<f64>,
) -> Result<Vec<f64>> {
    let mut gradient = Vec::with_capacity(x.len());
    let mut shifted = x.to_vec();

    for (i, &(lower, upper)) in bounds.iter().enumerate() {
        let h = step * x[i].abs().max(1.0);
        let plus = upper.map_or(x[i] + h, |upper| (x[i] + h).min(upper));
        let minus = lower.map_or(x[i] - h, |lower| (x[i] - h).max(lower));

        shifted[i] = plus;
        let value_plus = f(&shifted)?;
        shifted[i] = minus;
        let value_minus = f(&shifted)?;
        shifted[i] = x[i];

        gradient.push(if plus > minus {
            (value_plus - value_minus) / (plus - minus)
        } else {
            0.0
        });
    }

    Ok(gradient)
}

/// `1/2 sum r^2` over all residual components of all configurations
pub struct Loss<M> {
    calculator: Calculator<M>,
    weights: ResidualWeights,
    /// relative step of the finite difference gradient
    step: f64,
}

impl<M: Model> Loss<M> {
    pub fn new(calculator: Calculator<M>, weights: ResidualWeights) -> Self {
        Self {
            calculator,
            weights,
            step: 1e-6,
        }
    }

    pub fn calculator(&self) -> &Calculator<M> {
        &self.calculator
    }

    pub fn into_calculator(self) -> Calculator<M> {
        self.calculator
    }

    pub fn num_opt_params(&self) -> usize {
        self.calculator.model().params().num_opt_params()
    }

    /// Residual of every configuration at `x`
    pub fn residuals(&mut self, x: &[f64]) -> Result<Vec<Vec<f64>>> {
        self.calculator.update_opt_params(x)?;
        self.calculator.compute_all()?;

        let weights = &self.weights;
        parallel::try_map(self.calculator.compute_arguments(), |ca| weights.residual(ca))
    }

    pub fn value(&mut self, x: &[f64]) -> Result<f64> {
        let value = half_sum_of_squares(&self.residuals(x)?);
        log::trace!("loss {value:.10e} at {x:?}");
        Ok(value)
    }

    /// Central differences, one-sided at the parameter bounds
    pub fn gradient(&mut self, x: &[f64]) -> Result<Vec<f64>> {
        let bounds = self.calculator.get_opt_bounds();
        let gradient = finite_difference_gradient(x, &bounds, self.step, |x| self.value(x))?;

        // leave the model at x
        self.calculator.update_opt_params(x)?;
        Ok(gradient)
    }
}

impl<M: Model> Objective for Loss<M> {
    fn value(&mut self, x: &[f64]) -> Result<f64> {
        Loss::value(self, x)
    }

    fn gradient(&mut self, x: &[f64]) -> Result<Vec<f64>> {
        Loss::gradient(self, x)
    }

    fn bounds(&self) -> Vec<(Option<f64>, Option<f64>)> {
        self.calculator.get_opt_bounds()
    }
}

/// Same loss for a [`NeuralNetwork`] evaluated on precomputed fingerprints
pub struct NetworkLoss<'a> {
    network: NeuralNetwork,
    fingerprints: &'a Fingerprints,
    weights: ResidualWeights,
    use_energy: bool,
    use_forces: bool,
    use_stress: bool,
    step: f64,
}

impl<'a> NetworkLoss<'a> {
    pub fn new(
        network: NeuralNetwork,
        fingerprints: &'a Fingerprints,
        weights: ResidualWeights,
        use_energy: bool,
        use_forces: bool,
        use_stress: bool,
    ) -> Result<Self> {
        let fail = |reason: String| KliffError::Initialization {
            model: NeuralNetwork::NAME.to_string(),
            reason,
        };

        if fingerprints.num_descriptors != network.num_descriptors() {
            return Err(fail(format!(
                "network takes {} descriptors, fingerprints have {}",
                network.num_descriptors(),
                fingerprints.num_descriptors
            )));
        }
        for (index, fingerprint) in fingerprints.fingerprints.iter().enumerate() {
            if use_forces && fingerprint.dzeta_dr.is_none() {
                return Err(fail(format!("fingerprint {index} has no coordinate derivatives")));
            }
            if use_stress && fingerprint.dzeta_dstress.is_none() {
                return Err(fail(format!("fingerprint {index} has no strain derivatives")));
            }
            fingerprint.reference(use_energy, use_forces, use_stress)?;
        }

        Ok(Self {
            network,
            fingerprints,
            weights,
            use_energy,
            use_forces,
            use_stress,
            step: 1e-6,
        })
    }

    pub fn network(&self) -> &NeuralNetwork {
        &self.network
    }

    pub fn into_network(self) -> NeuralNetwork {
        self.network
    }

    fn uses(&self, quantity: Quantity) -> bool {
        match quantity {
            Quantity::Energy => self.use_energy,
            Quantity::Forces => self.use_forces,
            Quantity::Stress => self.use_stress,
            Quantity::ParticleEnergy => false,
        }
    }

    /// Residual of every fingerprint at `x`
    pub fn residuals(&mut self, x: &[f64]) -> Result<Vec<Vec<f64>>> {
        self.network.params_mut().update_opt_params(x)?;

        let this = &*self;
        parallel::try_map(&this.fingerprints.fingerprints, |fingerprint| {
            let output = this
                .network
                .evaluate(fingerprint, this.use_forces, this.use_stress)?;

            let mut prediction = Vec::new();
            if this.use_energy {
                prediction.push(output.energy);
            }
            if let Some(forces) = &output.forces {
                prediction.extend(forces.iter().flat_map(|f| f.iter().copied()));
            }
            if let Some(stress) = &output.stress {
                prediction.extend_from_slice(stress);
            }

            let reference = fingerprint.reference(this.use_energy, this.use_forces, this.use_stress)?;
            this.weights.weigh(
                &prediction,
                &reference,
                fingerprint.zeta.nrows(),
                fingerprint.weight,
                |quantity| this.uses(quantity),
            )
        })
    }

    pub fn value(&mut self, x: &[f64]) -> Result<f64> {
        let value = half_sum_of_squares(&self.residuals(x)?);
        log::trace!("network loss {value:.10e}");
        Ok(value)
    }

    pub fn gradient(&mut self, x: &[f64]) -> Result<Vec<f64>> {
        let bounds = self.network.params().opt_bounds();
        let gradient = finite_difference_gradient(x, &bounds, self.step, |x| self.value(x))?;
        self.network.params_mut().update_opt_params(x)?;
        Ok(gradient)
    }
}

impl Objective for NetworkLoss<'_> {
    fn value(&mut self, x: &[f64]) -> Result<f64> {
        NetworkLoss::value(self, x)
    }

    fn gradient(&mut self, x: &[f64]) -> Result<Vec<f64>> {
        NetworkLoss::gradient(self, x)
    }

    fn bounds(&self) -> Vec<(Option<f64>, Option<f64>)> {
        self.network.params().opt_bounds()
    }
}
