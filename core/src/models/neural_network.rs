use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use nalgebra::{DMatrix, DVector, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{descriptors::Fingerprint, KliffError, Quantity, Result};

use super::{FitSpec, ModelParams};

/// Feed-forward network giving the energy of every atom from its
/// fingerprint. Hidden layers use `tanh`, the output layer is linear and
/// the energy of a configuration is the sum over its atoms.
///
/// Layer `l` maps `a` to `W_l a + b_l`. `W_l` is stored row by row in the
/// parameter `weight_l`, `b_l` in `bias_l`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetwork {
    /// Widths from the number of descriptors to the single output
    layers: Vec<usize>,
    params: ModelParams,
}

/// Energy and derivatives of one configuration
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkOutput {
    pub energy: f64,
    pub particle_energy: Vec<f64>,
    pub forces: Option<Vec<Vector3<f64>>>,
    /// `(1/V) dE/de`, Voigt order
    pub stress: Option<[f64; 6]>,
}

struct Layer {
    weight: DMatrix<f64>,
    bias: DVector<f64>,
}

impl NeuralNetwork {
    pub const NAME: &'static str = "NN";

    /// A network with the given hidden layer widths. Weights are drawn
    /// from the Glorot uniform distribution, biases start at zero, and all
    /// of them are selected for fitting.
    pub fn new(num_descriptors: usize, hidden: &[usize], rng: &mut impl Rng) -> Result<Self> {
        if num_descriptors == 0 || hidden.contains(&0) {
            return Err(KliffError::InvalidParameter(format!(
                "layer widths must be positive, got {num_descriptors} inputs and hidden layers {hidden:?}"
            )));
        }

        let mut layers = vec![num_descriptors];
        layers.extend_from_slice(hidden);
        layers.push(1);

        let mut params = ModelParams::new();
        for (l, widths) in layers.windows(2).enumerate() {
            let (inputs, outputs) = (widths[0], widths[1]);
            let limit = (6.0 / (inputs + outputs) as f64).sqrt();
            let weight = (0..inputs * outputs)
                .map(|_| rng.gen_range(-limit..limit))
                .collect();

            params.push(
                &format!("weight_{l}"),
                weight,
                &format!("{outputs}x{inputs} weights of layer {l}, row major"),
            );
            params.push(&format!("bias_{l}"), vec![0.0; outputs], &format!("biases of layer {l}"));
        }

        let sizes = params
            .iter()
            .map(|param| (param.name.clone(), param.value.len()))
            .collect::<Vec<_>>();
        for (name, size) in sizes {
            params.set_fitting(&name, &vec![FitSpec::default(); size])?;
        }

        Ok(Self { layers, params })
    }

    pub fn layers(&self) -> &[usize] {
        &self.layers
    }

    pub fn num_descriptors(&self) -> usize {
        self.layers[0]
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ModelParams {
        &mut self.params
    }

    pub fn echo_model_params(&self) -> String {
        self.params.echo_model_params(Self::NAME)
    }

    pub fn echo_fitting_params(&self) -> String {
        self.params.echo_fitting_params()
    }

    fn unpack(&self) -> Result<Vec<Layer>> {
        self.layers
            .windows(2)
            .enumerate()
            .map(|(l, widths)| {
                let (inputs, outputs) = (widths[0], widths[1]);
                let weight = self.params.value(&format!("weight_{l}"))?;
                let bias = self.params.value(&format!("bias_{l}"))?;
                if weight.len() != inputs * outputs || bias.len() != outputs {
                    return Err(KliffError::InvalidParameter(format!(
                        "layer {l} should map {inputs} to {outputs} values"
                    )));
                }

                Ok(Layer {
                    weight: DMatrix::from_row_slice(outputs, inputs, weight),
                    bias: DVector::from_column_slice(bias),
                })
            })
            .collect()
    }

    /// Energy of every atom (one per row of `zeta`) and its gradient with
    /// respect to the descriptors of that atom
    fn atomic_energies(&self, zeta: &DMatrix<f64>) -> Result<(DVector<f64>, DMatrix<f64>)> {
        if zeta.ncols() != self.num_descriptors() {
            return Err(KliffError::InvalidDescriptor(format!(
                "network expects {} descriptors, got {}",
                self.num_descriptors(),
                zeta.ncols()
            )));
        }

        let layers = self.unpack()?;
        let ones = DVector::from_element(zeta.nrows(), 1.0);

        // inputs of every layer, kept for the backward pass
        let mut inputs = Vec::with_capacity(layers.len());
        let mut activation = zeta.clone();
        for (l, layer) in layers.iter().enumerate() {
            let z = &activation * layer.weight.transpose() + &ones * layer.bias.transpose();
            inputs.push(activation);
            activation = if l + 1 < layers.len() {
                z.map(f64::tanh)
            } else {
                z
            };
        }

        let mut gradient = DMatrix::from_element(zeta.nrows(), 1, 1.0);
        for (l, layer) in layers.iter().enumerate().rev() {
            gradient = &gradient * &layer.weight;
            if l > 0 {
                gradient.component_mul_assign(&inputs[l].map(|a| 1.0 - a * a));
            }
        }

        Ok((activation.column(0).into_owned(), gradient))
    }

    /// Evaluate one configuration. Forces and stress need the matching
    /// descriptor derivatives in `fingerprint`.
    pub fn evaluate(
        &self,
        fingerprint: &Fingerprint,
        compute_forces: bool,
        compute_stress: bool,
    ) -> Result<NetworkOutput> {
        let num_atoms = fingerprint.zeta.nrows();
        let (particle_energy, gradient) = self.atomic_energies(&fingerprint.zeta)?;

        let forces = if compute_forces {
            let dzeta_dr = derivatives(fingerprint.dzeta_dr.as_deref(), Quantity::Forces, num_atoms, 3 * num_atoms)?;
            let mut total = DVector::<f64>::zeros(3 * num_atoms);
            for (atom, dzeta) in dzeta_dr.iter().enumerate() {
                total -= dzeta.tr_mul(&gradient.row(atom).transpose());
            }
            Some(
                total
                    .as_slice()
                    .chunks_exact(3)
                    .map(Vector3::from_column_slice)
                    .collect(),
            )
        } else {
            None
        };

        let stress = if compute_stress {
            let dzeta_dstress = derivatives(fingerprint.dzeta_dstress.as_deref(), Quantity::Stress, num_atoms, 6)?;
            let mut total = DVector::<f64>::zeros(6);
            for (atom, dzeta) in dzeta_dstress.iter().enumerate() {
                total += dzeta.tr_mul(&gradient.row(atom).transpose());
            }
            let mut stress = [0.0; 6];
            stress.copy_from_slice(total.as_slice());
            Some(stress)
        } else {
            None
        };

        Ok(NetworkOutput {
            energy: particle_energy.sum(),
            particle_energy: particle_energy.as_slice().to_vec(),
            forces,
            stress,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let network: Self = serde_json::from_reader(reader)?;
        network.unpack()?;
        Ok(network)
    }
}

/// Descriptor derivatives of every atom, checked against the expected shape
fn derivatives(
    derivatives: Option<&[DMatrix<f64>]>,
    quantity: Quantity,
    num_atoms: usize,
    columns: usize,
) -> Result<&[DMatrix<f64>]> {
    let derivatives = derivatives.ok_or_else(|| {
        KliffError::InvalidDescriptor(format!("fingerprint computed without the derivatives for {quantity}"))
    })?;
    if derivatives.len() != num_atoms || derivatives.iter().any(|d| d.ncols() != columns) {
        return Err(KliffError::InvalidDescriptor(format!(
            "derivatives for {quantity} do not match {num_atoms} atoms"
        )));
    }
    Ok(derivatives)
}
