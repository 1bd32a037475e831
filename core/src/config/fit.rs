use std::{collections::BTreeMap, path::PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    loss::ResidualWeights,
    minimize::MinimizerSettings,
    models::{BuiltinModel, ComponentFit, FitSpec, Model},
    KliffError, Result,
};

/// Settings of a fitting run:
///
/// ```json
/// {
///     "model": {"name": "SW", "species": "Si"},
///     "params": {
///         "A": [[5.0, 1.0, 20]],
///         "B": [["default"]],
///         "sigma": [[2.0951, "fix"]],
///         "gamma": [[1.5]]
///     },
///     "dataset": "training_set",
///     "residual": {"energy_weight": 1.0, "forces_weight": 0.1},
///     "nprocs": 2
/// }
/// ```
///
/// Each fitted parameter lists one entry per component: the initial value
/// (or `"default"` to keep the model's), followed by either `"fix"` or a
/// lower and an upper bound (`null` for none).
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFit {
    pub model: ConfigModel,
    #[serde(default)]
    pub params: BTreeMap<String, Vec<Vec<Value>>>,
    pub dataset: PathBuf,
    #[serde(default = "enabled")]
    pub use_energy: bool,
    #[serde(default = "enabled")]
    pub use_forces: bool,
    #[serde(default)]
    pub use_stress: bool,
    #[serde(default)]
    pub residual: ResidualWeights,
    #[serde(default)]
    pub minimizer: MinimizerSettings,
    /// Worker threads, `0` for one per core
    #[serde(default)]
    pub nprocs: usize,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigModel {
    pub name: String,
    pub species: String,
}

fn enabled() -> bool {
    true
}

fn default_output() -> PathBuf {
    PathBuf::from("kliff_model.json")
}

impl TryFrom<&ConfigModel> for BuiltinModel {
    type Error = KliffError;

    fn try_from(value: &ConfigModel) -> Result<Self> {
        BuiltinModel::from_name(&value.name, &value.species)
    }
}

/// Interpret one component entry such as `[5.0, 1.0, 20]`, `["default"]`
/// or `[2.0951, "fix"]`.
fn component_spec(name: &str, entry: &[Value]) -> Result<FitSpec> {
    let invalid = |reason: &str| {
        KliffError::InvalidParameter(format!("fitting entry {entry:?} of {name:?}: {reason}"))
    };

    let initial = match entry.first() {
        Some(Value::Number(value)) => value.as_f64(),
        Some(Value::String(keyword)) if keyword == "default" => None,
        _ => return Err(invalid("expected an initial value or \"default\"")),
    };

    let bound = |value: &Value| match value {
        Value::Null => Ok(None),
        Value::Number(bound) => Ok(bound.as_f64()),
        _ => Err(invalid("bounds must be numbers or null")),
    };

    let fit = match &entry[1..] {
        [] => ComponentFit::default(),
        [Value::String(keyword)] if keyword == "fix" => ComponentFit {
            fixed: true,
            ..Default::default()
        },
        [lower, upper] => ComponentFit {
            fixed: false,
            lower: bound(lower)?,
            upper: bound(upper)?,
        },
        _ => return Err(invalid("expected \"fix\" or lower and upper bounds")),
    };

    Ok(FitSpec { initial, fit })
}

impl ConfigFit {
    /// The selected model with the fitting specification applied
    pub fn build_model(&self) -> Result<BuiltinModel> {
        let mut model = BuiltinModel::try_from(&self.model)?;

        for (name, entries) in &self.params {
            let specs = entries
                .iter()
                .map(|entry| component_spec(name, entry))
                .collect::<Result<Vec<_>>>()?;
            model.params_mut().set_fitting(name, &specs)?;
        }

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{component_spec, ConfigFit};
    use crate::{
        minimize::Method,
        models::{ComponentFit, Model},
    };

    const SILICON: &str = r#"{
        "model": {"name": "SW", "species": "Si"},
        "params": {
            "A": [[5.0, 1.0, 20]],
            "B": [["default"]],
            "sigma": [[2.0951, "fix"]],
            "gamma": [[1.5]]
        },
        "dataset": "training_set",
        "residual": {"energy_weight": 1.0, "forces_weight": 0.1},
        "minimizer": {"method": "steepest-descent", "max_iterations": 10},
        "nprocs": 2
    }"#;

    #[test]
    fn component_forms() {
        let spec = component_spec("A", &[json!(5.0), json!(1.0), json!(20)]).unwrap();
        assert_eq!(spec.initial, Some(5.0));
        assert_eq!(spec.fit.lower, Some(1.0));
        assert_eq!(spec.fit.upper, Some(20.0));

        let spec = component_spec("B", &[json!("default")]).unwrap();
        assert_eq!(spec.initial, None);
        assert_eq!(spec.fit, ComponentFit::default());

        let spec = component_spec("sigma", &[json!(2.0951), json!("fix")]).unwrap();
        assert!(spec.fit.fixed);

        let spec = component_spec("p", &[json!(4.0), json!(null), json!(5.0)]).unwrap();
        assert_eq!((spec.fit.lower, spec.fit.upper), (None, Some(5.0)));

        assert!(component_spec("A", &[]).is_err());
        assert!(component_spec("A", &[json!("fix")]).is_err());
        assert!(component_spec("A", &[json!(1.0), json!("free")]).is_err());
        assert!(component_spec("A", &[json!(1.0), json!(0.0), json!(2.0), json!(3.0)]).is_err());
    }

    #[test]
    fn builds_the_fitted_model() {
        let config: ConfigFit = serde_json::from_str(SILICON).unwrap();
        assert_eq!(config.residual.forces_weight, 0.1);
        assert_eq!(config.residual.stress_weight, 1.0);
        assert_eq!(config.minimizer.method, Method::SteepestDescent);
        assert_eq!(config.minimizer.max_iterations, 10);
        assert!(config.use_energy && config.use_forces && !config.use_stress);
        assert_eq!(config.nprocs, 2);

        let model = config.build_model().unwrap();
        assert_eq!(model.name(), "SW");
        // optimized components follow the parameter order of the model
        assert_eq!(model.params().opt_params(), vec![5.0, 0.6022245584, 1.5]);
        assert_eq!(model.params().opt_bounds()[0], (Some(1.0), Some(20.0)));
        assert_eq!(model.params().value("sigma").unwrap(), &[2.0951]);
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let config: ConfigFit = serde_json::from_str(
            r#"{"model": {"name": "LJ", "species": "Ar"}, "params": {"A": [[1.0]]}, "dataset": "x"}"#,
        )
        .unwrap();
        assert!(config.build_model().is_err());
    }
}
