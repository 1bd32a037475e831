use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use crate::{
    descriptors::{CutoffFunction, SymmetryFunction, SymmetryFunctionTerm},
    KliffError,
};

/// Symmetry function settings:
///
/// ```json
/// {
///     "cutoff": {"Si-Si": 4.5},
///     "cutoff_function": "cos",
///     "g1": null,
///     "g2": [{"eta": 0.0009, "Rs": 0.0}],
///     "g3": [{"kappa": 0.03214}],
///     "g4": [{"zeta": 1, "lambda": -1, "eta": 0.0001}],
///     "g5": [{"zeta": 2, "lambda": 1, "eta": 0.003}]
/// }
/// ```
///
/// A `g1` key enables G1 whatever its value, unless it is `false`.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDescriptor {
    pub cutoff: HashMap<String, f64>,
    #[serde(default)]
    pub cutoff_function: CutoffFunction,
    #[serde(default, deserialize_with = "key_present")]
    pub g1: bool,
    #[serde(default)]
    pub g2: Option<Vec<ConfigG2>>,
    #[serde(default)]
    pub g3: Option<Vec<ConfigG3>>,
    #[serde(default)]
    pub g4: Option<Vec<ConfigAngular>>,
    #[serde(default)]
    pub g5: Option<Vec<ConfigAngular>>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
pub struct ConfigG2 {
    pub eta: f64,
    #[serde(rename = "Rs", alias = "rs")]
    pub rs: f64,
}

#[derive(Copy, Clone, Debug, Deserialize)]
pub struct ConfigG3 {
    pub kappa: f64,
}

#[derive(Copy, Clone, Debug, Deserialize)]
pub struct ConfigAngular {
    pub zeta: f64,
    pub lambda: f64,
    pub eta: f64,
}

fn key_present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(!matches!(value, serde_json::Value::Bool(false)))
}

impl TryFrom<ConfigDescriptor> for SymmetryFunction {
    type Error = KliffError;

    fn try_from(value: ConfigDescriptor) -> Result<Self, Self::Error> {
        let mut terms = Vec::new();
        if value.g1 {
            terms.push(SymmetryFunctionTerm::G1);
        }
        for g2 in value.g2.unwrap_or_default() {
            terms.push(SymmetryFunctionTerm::G2 { eta: g2.eta, rs: g2.rs });
        }
        for g3 in value.g3.unwrap_or_default() {
            terms.push(SymmetryFunctionTerm::G3 { kappa: g3.kappa });
        }
        for g4 in value.g4.unwrap_or_default() {
            terms.push(SymmetryFunctionTerm::G4 {
                zeta: g4.zeta,
                lambda: g4.lambda,
                eta: g4.eta,
            });
        }
        for g5 in value.g5.unwrap_or_default() {
            terms.push(SymmetryFunctionTerm::G5 {
                zeta: g5.zeta,
                lambda: g5.lambda,
                eta: g5.eta,
            });
        }

        SymmetryFunction::new(&value.cutoff, value.cutoff_function, terms)
    }
}
