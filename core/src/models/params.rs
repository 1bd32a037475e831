use std::{
    fmt,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{KliffError, Result};

/// How a single component of a parameter is treated by the optimizer
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentFit {
    pub fixed: bool,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ComponentFit {
    fn clamp(&self, value: f64) -> f64 {
        let value = self.lower.map_or(value, |lower| value.max(lower));
        self.upper.map_or(value, |upper| value.min(upper))
    }
}

/// Fitting instruction of a single component: an initial value (`None`
/// keeps the current one) and its treatment
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FitSpec {
    pub initial: Option<f64>,
    pub fit: ComponentFit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Vec<f64>,
    pub description: String,
    /// Set for the parameters selected for fitting, one entry per component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<Vec<ComponentFit>>,
}

/// Named model parameters in a fixed order. The components of the
/// parameters selected for fitting that are not fixed form the flat
/// optimization vector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    params: Vec<Parameter>,
}

impl ModelParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: Vec<f64>, description: &str) {
        self.params.push(Parameter {
            name: name.to_string(),
            value,
            description: description.to_string(),
            fit: None,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Parameter> {
        self.params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| KliffError::InvalidParameter(format!("unknown parameter {name:?}")))
    }

    pub fn value(&self, name: &str) -> Result<&[f64]> {
        self.get(name)
            .map(|p| p.value.as_slice())
            .ok_or_else(|| KliffError::InvalidParameter(format!("unknown parameter {name:?}")))
    }

    /// First component of a parameter
    pub fn scalar(&self, name: &str) -> Result<f64> {
        self.value(name)?
            .first()
            .copied()
            .ok_or_else(|| KliffError::InvalidParameter(format!("parameter {name:?} is empty")))
    }

    pub fn set_value(&mut self, name: &str, value: Vec<f64>) -> Result<()> {
        let param = self.get_mut(name)?;
        if value.len() != param.value.len() {
            return Err(KliffError::InvalidParameter(format!(
                "parameter {name:?} has {} components, got {}",
                param.value.len(),
                value.len()
            )));
        }
        param.value = value;
        Ok(())
    }

    /// Select a parameter for fitting, one spec per component.
    pub fn set_fitting(&mut self, name: &str, specs: &[FitSpec]) -> Result<()> {
        let param = self.get_mut(name)?;
        if specs.len() != param.value.len() {
            return Err(KliffError::InvalidParameter(format!(
                "parameter {name:?} has {} components, {} fitting specs given",
                param.value.len(),
                specs.len()
            )));
        }

        for (component, spec) in specs.iter().enumerate() {
            if let (Some(lower), Some(upper)) = (spec.fit.lower, spec.fit.upper) {
                if lower > upper {
                    return Err(KliffError::InvalidParameter(format!(
                        "{name}[{component}]: lower bound {lower} above upper bound {upper}"
                    )));
                }
            }
            if let Some(initial) = spec.initial {
                param.value[component] = initial;
            }
        }
        param.fit = Some(specs.iter().map(|spec| spec.fit).collect());
        Ok(())
    }

    fn optimized(&self) -> impl Iterator<Item = (&Parameter, usize, &ComponentFit)> {
        self.params.iter().flat_map(|param| {
            param
                .fit
                .iter()
                .flat_map(|fit| fit.iter().enumerate())
                .filter(|(_, fit)| !fit.fixed)
                .map(move |(component, fit)| (param, component, fit))
        })
    }

    pub fn num_opt_params(&self) -> usize {
        self.optimized().count()
    }

    pub fn opt_params(&self) -> Vec<f64> {
        self.optimized()
            .map(|(param, component, _)| param.value[component])
            .collect()
    }

    /// Lower and upper bound of every optimized component
    pub fn opt_bounds(&self) -> Vec<(Option<f64>, Option<f64>)> {
        self.optimized()
            .map(|(_, _, fit)| (fit.lower, fit.upper))
            .collect()
    }

    /// Write back the optimization vector. Bounded components are clamped.
    pub fn update_opt_params(&mut self, x: &[f64]) -> Result<()> {
        let expected = self.num_opt_params();
        if x.len() != expected {
            return Err(KliffError::InvalidParameter(format!(
                "expected {expected} optimizing parameters, got {}",
                x.len()
            )));
        }

        let mut values = x.iter();
        for param in &mut self.params {
            let Some(fit) = &param.fit else { continue };
            for (value, fit) in param.value.iter_mut().zip(fit) {
                if fit.fixed {
                    continue;
                }
                if let Some(&new) = values.next() {
                    *value = fit.clamp(new);
                }
            }
        }
        Ok(())
    }

    pub fn echo_model_params(&self, model: &str) -> String {
        ModelParamsTable { params: self, model }.to_string()
    }

    pub fn echo_fitting_params(&self) -> String {
        FittingTable(self).to_string()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

struct ModelParamsTable<'a> {
    params: &'a ModelParams,
    model: &'a str,
}

impl fmt::Display for ModelParamsTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(79);
        writeln!(f, "#{rule}")?;
        writeln!(f, "# Available parameters to optimize.")?;
        writeln!(f, "# Model: {}", self.model)?;
        writeln!(f, "#{rule}")?;
        for param in self.params.iter() {
            writeln!(f)?;
            writeln!(f, "name: {}", param.name)?;
            writeln!(f, "value: {:?}", param.value)?;
            writeln!(f, "size: {}", param.value.len())?;
            writeln!(f, "description: {}", param.description)?;
        }
        Ok(())
    }
}

struct FittingTable<'a>(&'a ModelParams);

impl fmt::Display for FittingTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(79);
        writeln!(f, "#{rule}")?;
        writeln!(f, "# Model parameters that are optimized.")?;
        writeln!(f, "#{rule}")?;
        for param in self.0.iter() {
            let Some(fit) = &param.fit else { continue };
            writeln!(f)?;
            writeln!(f, "{} {}", param.name, param.value.len())?;
            for (value, fit) in param.value.iter().zip(fit) {
                write!(f, "  {value:23.15e}")?;
                if fit.fixed {
                    write!(f, " fix")?;
                } else if fit.lower.is_some() || fit.upper.is_some() {
                    let bound = |b: Option<f64>| b.map_or("None".to_string(), |b| format!("{b:23.15e}"));
                    write!(f, " {} {}", bound(fit.lower), bound(fit.upper))?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
