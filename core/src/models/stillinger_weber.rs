use crate::Result;

use super::{Model, ModelInput, ModelOutput, ModelParams};

/// Stillinger-Weber potential for a single species, with the energy scale
/// folded into `A` and `lambda`:
///
/// ```text
/// phi2(r) = A (B (sigma/r)^p - (sigma/r)^q) exp(sigma / (r - rc))
/// phi3(rij, rik, cos) = lambda exp(gamma sigma / (rij - rc) + gamma sigma / (rik - rc)) (cos - costheta0)^2
/// ```
///
/// F. H. Stillinger and T. A. Weber, Phys. Rev. B 31, 5262 (1985).
#[derive(Clone, Debug)]
pub struct StillingerWeber {
    species: Vec<String>,
    params: ModelParams,
}

struct Coefficients {
    a: f64,
    b: f64,
    p: f64,
    q: f64,
    sigma: f64,
    lambda: f64,
    gamma: f64,
    costheta0: f64,
    cutoff: f64,
}

impl StillingerWeber {
    /// Stillinger and Weber's 1985 silicon parameterization
    pub fn silicon() -> Self {
        Self::new("Si")
    }

    pub fn new(species: &str) -> Self {
        let mut params = ModelParams::new();
        params.push("A", vec![15.2848], "two-body energy scale");
        params.push("B", vec![0.6022245584], "repulsive two-body coefficient");
        params.push("p", vec![4.0], "repulsive two-body exponent");
        params.push("q", vec![0.0], "attractive two-body exponent");
        params.push("sigma", vec![2.0951], "length scale");
        params.push("lambda", vec![45.5322], "three-body energy scale");
        params.push("gamma", vec![1.2], "three-body decay");
        params.push("costheta0", vec![-1.0 / 3.0], "cosine of the preferred bond angle");
        params.push("cutoff", vec![3.77118], "interaction range");

        Self {
            species: vec![species.to_string()],
            params,
        }
    }

    fn coefficients(&self) -> Result<Coefficients> {
        let params = &self.params;
        Ok(Coefficients {
            a: params.scalar("A")?,
            b: params.scalar("B")?,
            p: params.scalar("p")?,
            q: params.scalar("q")?,
            sigma: params.scalar("sigma")?,
            lambda: params.scalar("lambda")?,
            gamma: params.scalar("gamma")?,
            costheta0: params.scalar("costheta0")?,
            cutoff: params.scalar("cutoff")?,
        })
    }
}

impl Coefficients {
    fn two_body(&self, r: f64) -> (f64, f64) {
        let sr = self.sigma / r;
        let repulsive = self.b * sr.powf(self.p);
        let attractive = sr.powf(self.q);
        let polynomial = self.a * (repulsive - attractive);
        let dpolynomial = self.a * (-self.p * repulsive + self.q * attractive) / r;

        let dr = r - self.cutoff;
        let decay = (self.sigma / dr).exp();
        let ddecay = -decay * self.sigma / (dr * dr);

        (polynomial * decay, dpolynomial * decay + polynomial * ddecay)
    }

    /// Energy and derivatives with respect to `rij`, `rik` and `rjk`
    fn three_body(&self, rij: f64, rik: f64, rjk: f64) -> (f64, [f64; 3]) {
        let gs = self.gamma * self.sigma;
        let (dij, dik) = (rij - self.cutoff, rik - self.cutoff);
        let decay = (gs / dij + gs / dik).exp();

        let cos = (rij * rij + rik * rik - rjk * rjk) / (2.0 * rij * rik);
        let dcos_dij = (rij * rij - rik * rik + rjk * rjk) / (2.0 * rij * rij * rik);
        let dcos_dik = (rik * rik - rij * rij + rjk * rjk) / (2.0 * rij * rik * rik);
        let dcos_djk = -rjk / (rij * rik);

        let angular = cos - self.costheta0;
        let energy = self.lambda * decay * angular * angular;
        let de_dcos = 2.0 * self.lambda * decay * angular;

        (
            energy,
            [
                -energy * gs / (dij * dij) + de_dcos * dcos_dij,
                -energy * gs / (dik * dik) + de_dcos * dcos_dik,
                de_dcos * dcos_djk,
            ],
        )
    }
}

impl Model for StillingerWeber {
    fn name(&self) -> &str {
        "SW"
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
        let sw = self.coefficients()?;

        let list = input.neighbors;
        let coords = list.coords();
        for i in 0..list.num_contributing() {
            let neighbors = list.neighbors(i);

            for (jj, &j) in neighbors.iter().enumerate() {
                let rij = coords[j] - coords[i];
                let dij = rij.norm();
                if dij >= sw.cutoff {
                    continue;
                }

                // pairs are visited from both sides
                let (energy, de_dr) = sw.two_body(dij);
                output.add_energy(i, 0.5 * energy);
                output.add_bond(input, i, j, &rij, dij, 0.5 * de_dr);

                // triplets with i at the vertex
                for &k in &neighbors[jj + 1..] {
                    let rik = coords[k] - coords[i];
                    let dik = rik.norm();
                    if dik >= sw.cutoff {
                        continue;
                    }
                    let rjk = coords[k] - coords[j];
                    let djk = rjk.norm();

                    let (energy, [de_dij, de_dik, de_djk]) = sw.three_body(dij, dik, djk);
                    output.add_energy(i, energy);
                    output.add_bond(input, i, j, &rij, dij, de_dij);
                    output.add_bond(input, i, k, &rik, dik, de_dik);
                    output.add_bond(input, j, k, &rjk, djk, de_djk);
                }
            }
        }

        log::trace!("{} energy {:.8}", self.name(), output.energy);
        Ok(())
    }
}
