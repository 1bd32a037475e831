//! Atom-centered symmetry functions of Behler and Parrinello.
//!
//! J. Behler, J. Chem. Phys. 134, 074106 (2011).

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector, Vector3};

use crate::{
    configuration::{Configuration, VOIGT},
    neighbor::NeighborList,
    KliffError, Result,
};

use super::{CutoffFunction, Descriptor, DescriptorOutput};

/// A single symmetry function and its hyper-parameters
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SymmetryFunctionTerm {
    /// `sum_j fc(r_ij)`
    G1,
    /// `sum_j exp(-eta (r_ij - rs)^2) fc(r_ij)`
    G2 { eta: f64, rs: f64 },
    /// `sum_j cos(kappa r_ij) fc(r_ij)`
    G3 { kappa: f64 },
    /// `2^(1-zeta) sum_{j<k} (1 + lambda cos)^zeta exp(-eta (r_ij^2 + r_ik^2 + r_jk^2)) fc(r_ij) fc(r_ik) fc(r_jk)`
    G4 { zeta: f64, lambda: f64, eta: f64 },
    /// `2^(1-zeta) sum_{j<k} (1 + lambda cos)^zeta exp(-eta (r_ij^2 + r_ik^2)) fc(r_ij) fc(r_ik)`
    G5 { zeta: f64, lambda: f64, eta: f64 },
}

impl SymmetryFunctionTerm {
    fn is_angular(&self) -> bool {
        matches!(self, Self::G4 { .. } | Self::G5 { .. })
    }
}

#[derive(Clone, Debug)]
pub struct SymmetryFunction {
    cutoff_function: CutoffFunction,
    /// cutoff of every species pair, stored in both orders
    cutoffs: HashMap<(String, String), f64>,
    terms: Vec<SymmetryFunctionTerm>,
}

impl SymmetryFunction {
    /// `cutoffs` maps species pairs written as `"A-B"` to their cutoff radius.
    pub fn new(
        cutoffs: &HashMap<String, f64>,
        cutoff_function: CutoffFunction,
        terms: Vec<SymmetryFunctionTerm>,
    ) -> Result<Self> {
        if terms.is_empty() {
            return Err(KliffError::InvalidDescriptor(
                "no symmetry functions given".to_string(),
            ));
        }

        let mut pair_cutoffs = HashMap::with_capacity(2 * cutoffs.len());
        for (pair, &rcut) in cutoffs {
            let Some((a, b)) = pair.split_once('-') else {
                return Err(KliffError::InvalidDescriptor(format!(
                    "species pair {pair:?} is not of the form \"A-B\""
                )));
            };
            if !(rcut > 0.0) {
                return Err(KliffError::InvalidDescriptor(format!(
                    "cutoff of {pair:?} must be positive, got {rcut}"
                )));
            }

            pair_cutoffs.insert((a.trim().to_string(), b.trim().to_string()), rcut);
            pair_cutoffs.insert((b.trim().to_string(), a.trim().to_string()), rcut);
        }

        Ok(Self {
            cutoff_function,
            cutoffs: pair_cutoffs,
            terms,
        })
    }

    pub fn terms(&self) -> &[SymmetryFunctionTerm] {
        &self.terms
    }

    /// Cutoff matrix indexed by the position of the species in `species_set`
    fn cutoff_table(&self, species_set: &[&str]) -> Result<DMatrix<f64>> {
        let n = species_set.len();
        let mut table = DMatrix::zeros(n, n);
        for (i, j) in itertools::iproduct!(0..n, 0..n) {
            let key = (species_set[i].to_string(), species_set[j].to_string());
            table[(i, j)] = *self.cutoffs.get(&key).ok_or_else(|| {
                KliffError::InvalidDescriptor(format!(
                    "no cutoff for species pair {}-{}",
                    species_set[i], species_set[j]
                ))
            })?;
        }
        Ok(table)
    }

    fn atom_terms(
        &self,
        i: usize,
        list: &NeighborList,
        kinds: &[usize],
        rcut: &DMatrix<f64>,
        accumulator: &mut Accumulator,
    ) {
        let coords = list.coords();
        let neighbors = list.neighbors(i);
        let ri = coords[i];

        // two-body terms
        for &j in neighbors {
            let rcut_ij = rcut[(kinds[i], kinds[j])];
            let rij = coords[j] - ri;
            let r = rij.norm();
            if r >= rcut_ij {
                continue;
            }
            let (fc, dfc) = self.cutoff_function.evaluate(r, rcut_ij);

            for (index, term) in self.terms.iter().enumerate() {
                let (value, derivative) = match *term {
                    SymmetryFunctionTerm::G1 => (fc, dfc),
                    SymmetryFunctionTerm::G2 { eta, rs } => {
                        let gauss = (-eta * (r - rs).powi(2)).exp();
                        (
                            gauss * fc,
                            gauss * (-2.0 * eta * (r - rs) * fc + dfc),
                        )
                    }
                    SymmetryFunctionTerm::G3 { kappa } => {
                        let (sin, cos) = (kappa * r).sin_cos();
                        (cos * fc, -kappa * sin * fc + cos * dfc)
                    }
                    _ => continue,
                };

                accumulator.zeta[index] += value;
                accumulator.add_bond(index, i, j, &rij, rij * (derivative / r));
            }
        }

        if !self.terms.iter().any(SymmetryFunctionTerm::is_angular) {
            return;
        }

        // three-body terms, each unordered pair of neighbors once
        for (jj, &j) in neighbors.iter().enumerate() {
            let rcut_ij = rcut[(kinds[i], kinds[j])];
            let rij = coords[j] - ri;
            let a = rij.norm();
            if a >= rcut_ij {
                continue;
            }
            let (fc_a, dfc_a) = self.cutoff_function.evaluate(a, rcut_ij);

            for &k in &neighbors[jj + 1..] {
                let rcut_ik = rcut[(kinds[i], kinds[k])];
                let rik = coords[k] - ri;
                let b = rik.norm();
                if b >= rcut_ik {
                    continue;
                }
                let (fc_b, dfc_b) = self.cutoff_function.evaluate(b, rcut_ik);

                let rjk = coords[k] - coords[j];
                let c = rjk.norm();
                if c == 0.0 {
                    continue;
                }
                let (fc_c, dfc_c) = self
                    .cutoff_function
                    .evaluate(c, rcut[(kinds[j], kinds[k])]);

                // the angle at i as a function of the three distances
                let cos = (a * a + b * b - c * c) / (2.0 * a * b);
                let dcos_da = (a * a - b * b + c * c) / (2.0 * a * a * b);
                let dcos_db = (b * b - a * a + c * c) / (2.0 * a * b * b);
                let dcos_dc = -c / (a * b);

                for (index, term) in self.terms.iter().enumerate() {
                    let (zeta, lambda, eta, three_cutoffs) = match *term {
                        SymmetryFunctionTerm::G4 { zeta, lambda, eta } => (zeta, lambda, eta, true),
                        SymmetryFunctionTerm::G5 { zeta, lambda, eta } => (zeta, lambda, eta, false),
                        _ => continue,
                    };

                    let base = 1.0 + lambda * cos;
                    if base <= 0.0 {
                        continue;
                    }
                    if three_cutoffs && fc_c == 0.0 {
                        continue;
                    }

                    let prefactor = 2f64.powf(1.0 - zeta);
                    let angular = base.powf(zeta);
                    let dangular_dcos = zeta * lambda * base.powf(zeta - 1.0);

                    let (exponent, cutoffs, dt_da, dt_db, dt_dc) = if three_cutoffs {
                        let exponent = (-eta * (a * a + b * b + c * c)).exp();
                        let cutoffs = fc_a * fc_b * fc_c;
                        (
                            exponent,
                            cutoffs,
                            angular * exponent * (-2.0 * eta * a * cutoffs + dfc_a * fc_b * fc_c),
                            angular * exponent * (-2.0 * eta * b * cutoffs + fc_a * dfc_b * fc_c),
                            angular * exponent * (-2.0 * eta * c * cutoffs + fc_a * fc_b * dfc_c),
                        )
                    } else {
                        let exponent = (-eta * (a * a + b * b)).exp();
                        let cutoffs = fc_a * fc_b;
                        (
                            exponent,
                            cutoffs,
                            angular * exponent * (-2.0 * eta * a * cutoffs + dfc_a * fc_b),
                            angular * exponent * (-2.0 * eta * b * cutoffs + fc_a * dfc_b),
                            0.0,
                        )
                    };

                    // angular dependence enters through all three distances
                    let dt_dcos = dangular_dcos * exponent * cutoffs;
                    let dt_da = prefactor * (dt_da + dt_dcos * dcos_da);
                    let dt_db = prefactor * (dt_db + dt_dcos * dcos_db);
                    let dt_dc = prefactor * (dt_dc + dt_dcos * dcos_dc);

                    accumulator.zeta[index] += prefactor * angular * exponent * cutoffs;
                    accumulator.add_bond(index, i, j, &rij, rij * (dt_da / a));
                    accumulator.add_bond(index, i, k, &rik, rik * (dt_db / b));
                    accumulator.add_bond(index, j, k, &rjk, rjk * (dt_dc / c));
                }
            }
        }
    }
}

impl Descriptor for SymmetryFunction {
    fn num_descriptors(&self) -> usize {
        self.terms.len()
    }

    fn cutoff(&self) -> f64 {
        self.cutoffs.values().copied().fold(0.0, f64::max)
    }

    fn transform(
        &self,
        config: &Configuration,
        fit_forces: bool,
        fit_stress: bool,
    ) -> Result<DescriptorOutput> {
        let volume = if fit_stress {
            let volume = config.volume();
            if volume == 0.0 {
                return Err(KliffError::InvalidDescriptor(
                    "stress derivatives need a cell with nonzero volume".to_string(),
                ));
            }
            volume
        } else {
            1.0
        };

        let list = NeighborList::new(config, self.cutoff(), false)?;

        let species_set = config.species_set().into_iter().collect::<Vec<_>>();
        let rcut = self.cutoff_table(&species_set)?;
        let kinds = list
            .species()
            .iter()
            .map(|s| species_set.iter().position(|known| known == s))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| KliffError::InvalidDescriptor("unknown padding species".to_string()))?;

        let n_contrib = list.num_contributing();
        let n_desc = self.num_descriptors();

        let mut zeta = DMatrix::zeros(n_contrib, n_desc);
        let mut dzeta_dr = fit_forces.then(|| Vec::with_capacity(n_contrib));
        let mut dzeta_dstress = fit_stress.then(|| Vec::with_capacity(n_contrib));

        for i in 0..n_contrib {
            let mut accumulator = Accumulator {
                image: list.image(),
                zeta: DVector::zeros(n_desc),
                dzeta_dr: fit_forces.then(|| DMatrix::zeros(n_desc, 3 * n_contrib)),
                dzeta_dstrain: fit_stress.then(|| DMatrix::zeros(n_desc, 6)),
            };
            self.atom_terms(i, &list, &kinds, &rcut, &mut accumulator);

            zeta.set_row(i, &accumulator.zeta.transpose());
            if let (Some(all), Some(atom)) = (&mut dzeta_dr, accumulator.dzeta_dr) {
                all.push(atom);
            }
            if let (Some(all), Some(atom)) = (&mut dzeta_dstress, accumulator.dzeta_dstrain) {
                all.push(atom / volume);
            }
        }

        log::trace!("symmetry functions of {n_contrib} atoms: {zeta:0.4}");

        Ok(DescriptorOutput {
            zeta,
            dzeta_dr,
            dzeta_dstress,
        })
    }
}

/// Descriptor values and derivatives of a single atom
struct Accumulator<'a> {
    image: &'a [usize],
    zeta: DVector<f64>,
    /// derivative with respect to the contributing atom coordinates
    dzeta_dr: Option<DMatrix<f64>>,
    /// derivative with respect to a homogeneous strain, Voigt order
    dzeta_dstrain: Option<DMatrix<f64>>,
}

impl Accumulator<'_> {
    /// Record `gradient`, the derivative of descriptor `index` with respect
    /// to `bond = r_to - r_from`. Padding atoms act on their images.
    fn add_bond(
        &mut self,
        index: usize,
        from: usize,
        to: usize,
        bond: &Vector3<f64>,
        gradient: Vector3<f64>,
    ) {
        if let Some(dzeta_dr) = &mut self.dzeta_dr {
            let (from, to) = (self.image[from], self.image[to]);
            for dim in 0..3 {
                dzeta_dr[(index, 3 * to + dim)] += gradient[dim];
                dzeta_dr[(index, 3 * from + dim)] -= gradient[dim];
            }
        }

        if let Some(dzeta_dstrain) = &mut self.dzeta_dstrain {
            for (voigt, &(alpha, beta)) in VOIGT.iter().enumerate() {
                dzeta_dstrain[(index, voigt)] += gradient[alpha] * bond[beta];
            }
        }
    }
}
