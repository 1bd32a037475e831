use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::{configuration::Configuration, parallel, KliffError, Quantity, Result};

use super::Descriptor;

/// Standard scores of the descriptor components
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    pub mean: DVector<f64>,
    pub stdev: DVector<f64>,
}

impl Normalizer {
    /// Components varying less than this are only shifted
    const MIN_STDEV: f64 = 1e-12;

    /// Fit to all rows of all matrices. `None` if there are no rows.
    pub fn fit<'a>(zetas: impl IntoIterator<Item = &'a DMatrix<f64>> + Clone) -> Option<Self> {
        let mut count = 0;
        let mut sum: Option<DVector<f64>> = None;
        for zeta in zetas.clone() {
            count += zeta.nrows();
            let column_sums = zeta.row_sum().transpose();
            sum = Some(match sum {
                Some(sum) => sum + column_sums,
                None => column_sums,
            });
        }
        if count == 0 {
            return None;
        }
        let mean = sum? / count as f64;

        let mut squares = DVector::zeros(mean.len());
        for zeta in zetas {
            for row in zeta.row_iter() {
                squares += (row.transpose() - &mean).map(|x| x * x);
            }
        }
        let stdev = (squares / count as f64).map(|variance| {
            let stdev = variance.sqrt();
            if stdev < Self::MIN_STDEV {
                1.0
            } else {
                stdev
            }
        });

        Some(Self { mean, stdev })
    }

    pub fn normalize(&self, fingerprint: &mut Fingerprint) {
        for mut row in fingerprint.zeta.row_iter_mut() {
            for (d, x) in row.iter_mut().enumerate() {
                *x = (*x - self.mean[d]) / self.stdev[d];
            }
        }

        let derivatives = fingerprint
            .dzeta_dr
            .iter_mut()
            .chain(fingerprint.dzeta_dstress.iter_mut())
            .flatten();
        for derivative in derivatives {
            for (d, mut row) in derivative.row_iter_mut().enumerate() {
                row /= self.stdev[d];
            }
        }
    }
}

/// The descriptor of a configuration together with its reference data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub identifier: Option<String>,
    pub species: Vec<String>,
    pub zeta: DMatrix<f64>,
    pub dzeta_dr: Option<Vec<DMatrix<f64>>>,
    pub dzeta_dstress: Option<Vec<DMatrix<f64>>>,
    pub energy: Option<f64>,
    pub forces: Option<Vec<Vector3<f64>>>,
    pub stress: Option<[f64; 6]>,
    pub weight: f64,
}

impl Fingerprint {
    /// Reference data laid out as `[energy, forces..., stress...]` with the
    /// requested quantities
    pub fn reference(&self, use_energy: bool, use_forces: bool, use_stress: bool) -> Result<Vec<f64>> {
        let missing = |quantity: Quantity| {
            KliffError::InvalidParameter(format!(
                "{quantity} requested but fingerprint {} has no reference {quantity}",
                self.identifier.as_deref().unwrap_or("<unnamed>")
            ))
        };

        let mut reference = Vec::new();
        if use_energy {
            reference.push(self.energy.ok_or_else(|| missing(Quantity::Energy))?);
        }
        if use_forces {
            let forces = self.forces.as_ref().ok_or_else(|| missing(Quantity::Forces))?;
            reference.extend(forces.iter().flat_map(|f| f.iter().copied()));
        }
        if use_stress {
            reference.extend_from_slice(&self.stress.ok_or_else(|| missing(Quantity::Stress))?);
        }
        Ok(reference)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fingerprints {
    pub num_descriptors: usize,
    pub normalizer: Option<Normalizer>,
    pub fingerprints: Vec<Fingerprint>,
}

impl Fingerprints {
    pub fn generate<D>(
        configs: &[Configuration],
        descriptor: &D,
        fit_forces: bool,
        fit_stress: bool,
        normalize: bool,
    ) -> Result<Self>
    where
        D: Descriptor + Sync,
    {
        let mut fingerprints = parallel::try_map(configs, |config| {
            let output = descriptor.transform(config, fit_forces, fit_stress)?;
            Ok(Fingerprint {
                identifier: config.identifier.clone(),
                species: config.species.clone(),
                zeta: output.zeta,
                dzeta_dr: output.dzeta_dr,
                dzeta_dstress: output.dzeta_dstress,
                energy: config.energy,
                forces: config.forces.clone(),
                stress: config.stress,
                weight: config.weight,
            })
        })?;

        let normalizer = if normalize {
            Normalizer::fit(fingerprints.iter().map(|f| &f.zeta))
        } else {
            None
        };
        if let Some(normalizer) = &normalizer {
            log::debug!("descriptor mean {:.4}", normalizer.mean.transpose());
            log::debug!("descriptor stdev {:.4}", normalizer.stdev.transpose());
            for fingerprint in &mut fingerprints {
                normalizer.normalize(fingerprint);
            }
        }

        log::info!(
            "generated fingerprints of {} configurations ({} atoms)",
            fingerprints.len(),
            fingerprints.iter().map(|f| f.zeta.nrows()).sum::<usize>()
        );

        Ok(Self {
            num_descriptors: descriptor.num_descriptors(),
            normalizer,
            fingerprints,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
