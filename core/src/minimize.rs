//! Gradient based minimization on a box.

use serde::{Deserialize, Serialize};

use crate::Result;

/// A function to minimize
pub trait Objective {
    fn value(&mut self, x: &[f64]) -> Result<f64>;

    fn gradient(&mut self, x: &[f64]) -> Result<Vec<f64>>;

    /// Lower and upper bound of every component, `None` for unbounded
    fn bounds(&self) -> Vec<(Option<f64>, Option<f64>)>;
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    SteepestDescent,
    /// Polak-Ribiere with restarts whenever `beta` would be negative
    #[default]
    ConjugateGradient,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerSettings {
    pub method: Method,
    pub max_iterations: usize,
    /// Stop when the norm of the projected gradient falls below this
    pub grad_tol: f64,
    /// Stop when an iteration changes the value by less than this fraction
    pub value_rel_tol: f64,
    pub initial_step: f64,
    /// Sufficient decrease parameter of the Armijo condition
    pub armijo: f64,
    pub backtrack_factor: f64,
    pub max_backtracks: usize,
}

impl Default for MinimizerSettings {
    fn default() -> Self {
        Self {
            method: Method::default(),
            max_iterations: 1000,
            grad_tol: 1e-8,
            value_rel_tol: 1e-12,
            initial_step: 1.0,
            armijo: 1e-4,
            backtrack_factor: 0.5,
            max_backtracks: 60,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    GradientNorm,
    ValueChange,
    MaxIterations,
    /// No step along the steepest descent direction decreases the value
    LineSearchFailed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StopReason::GradientNorm => "gradient norm below tolerance",
            StopReason::ValueChange => "relative change of the value below tolerance",
            StopReason::MaxIterations => "maximum number of iterations reached",
            StopReason::LineSearchFailed => "line search failed",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MinimizeOutcome {
    pub x: Vec<f64>,
    pub value: f64,
    pub gradient_norm: f64,
    pub iterations: usize,
    pub stop: StopReason,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn project(x: &mut [f64], bounds: &[(Option<f64>, Option<f64>)]) {
    for (x, (lower, upper)) in x.iter_mut().zip(bounds) {
        if let Some(lower) = lower {
            *x = x.max(*lower);
        }
        if let Some(upper) = upper {
            *x = x.min(*upper);
        }
    }
}

/// Gradient with the components removed that point out of the box at an
/// active bound
fn projected_gradient(x: &[f64], gradient: &[f64], bounds: &[(Option<f64>, Option<f64>)]) -> Vec<f64> {
    itertools::izip!(x, gradient, bounds)
        .map(|(&x, &g, &(lower, upper))| {
            let at_lower = lower.is_some_and(|lower| x <= lower && g > 0.0);
            let at_upper = upper.is_some_and(|upper| x >= upper && g < 0.0);
            if at_lower || at_upper {
                0.0
            } else {
                g
            }
        })
        .collect()
}

pub fn minimize(
    objective: &mut impl Objective,
    x0: &[f64],
    settings: &MinimizerSettings,
) -> Result<MinimizeOutcome> {
    let bounds = objective.bounds();
    let mut x = x0.to_vec();
    project(&mut x, &bounds);

    let mut value = objective.value(&x)?;
    let mut gradient = projected_gradient(&x, &objective.gradient(&x)?, &bounds);
    let mut direction = gradient.iter().map(|g| -g).collect::<Vec<_>>();
    let mut step = settings.initial_step;

    log::info!("minimizing {} parameters with {:?}, initial value {value:.8e}", x.len(), settings.method);

    let mut iterations = 0;
    let stop = loop {
        let gradient_norm = dot(&gradient, &gradient).sqrt();
        if gradient_norm < settings.grad_tol {
            break StopReason::GradientNorm;
        }
        if iterations == settings.max_iterations {
            break StopReason::MaxIterations;
        }
        iterations += 1;

        if dot(&direction, &gradient) >= 0.0 {
            direction = gradient.iter().map(|g| -g).collect();
        }

        // backtracking along the projected path, restarting once along the
        // steepest descent direction
        let mut accepted = None;
        for restart in [false, true] {
            if restart {
                if direction.iter().zip(&gradient).all(|(d, g)| *d == -g) {
                    break;
                }
                log::debug!("line search failed, restarting along the steepest descent");
                direction = gradient.iter().map(|g| -g).collect();
                step = settings.initial_step;
            }

            let mut trial_step = step;
            for _ in 0..settings.max_backtracks {
                let mut trial = x.iter().zip(&direction).map(|(x, d)| x + trial_step * d).collect::<Vec<_>>();
                project(&mut trial, &bounds);

                let displacement = trial.iter().zip(&x).map(|(t, x)| t - x).collect::<Vec<_>>();
                let decrease = dot(&gradient, &displacement);
                if decrease < 0.0 {
                    let trial_value = objective.value(&trial)?;
                    if trial_value <= value + settings.armijo * decrease {
                        accepted = Some((trial, trial_value, trial_step));
                        break;
                    }
                }
                trial_step *= settings.backtrack_factor;
            }

            if accepted.is_some() {
                break;
            }
        }

        let Some((new_x, new_value, accepted_step)) = accepted else {
            break StopReason::LineSearchFailed;
        };

        let new_gradient = projected_gradient(&new_x, &objective.gradient(&new_x)?, &bounds);
        let change = (value - new_value).abs();
        let scale = value.abs().max(new_value.abs());

        direction = match settings.method {
            Method::SteepestDescent => new_gradient.iter().map(|g| -g).collect(),
            Method::ConjugateGradient => {
                let difference = new_gradient.iter().zip(&gradient).map(|(n, o)| n - o).collect::<Vec<_>>();
                let beta = (dot(&new_gradient, &difference) / dot(&gradient, &gradient)).max(0.0);
                new_gradient.iter().zip(&direction).map(|(g, d)| -g + beta * d).collect()
            }
        };

        x = new_x;
        value = new_value;
        gradient = new_gradient;
        step = 2.0 * accepted_step;

        log::debug!(
            "iteration {iterations}: value {value:.10e}, |g| {:.3e}, step {accepted_step:.3e}",
            dot(&gradient, &gradient).sqrt()
        );

        if change <= settings.value_rel_tol * scale {
            break StopReason::ValueChange;
        }
    };

    let gradient_norm = dot(&gradient, &gradient).sqrt();
    log::info!("minimization stopped after {iterations} iterations ({stop}), value {value:.8e}");

    Ok(MinimizeOutcome {
        x,
        value,
        gradient_norm,
        iterations,
        stop,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::{minimize, Method, MinimizerSettings, Objective, StopReason};
    use crate::Result;

    struct Rosenbrock;

    impl Objective for Rosenbrock {
        fn value(&mut self, x: &[f64]) -> Result<f64> {
            Ok((1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2))
        }

        fn gradient(&mut self, x: &[f64]) -> Result<Vec<f64>> {
            let inner = x[1] - x[0] * x[0];
            Ok(vec![-2.0 * (1.0 - x[0]) - 400.0 * x[0] * inner, 200.0 * inner])
        }

        fn bounds(&self) -> Vec<(Option<f64>, Option<f64>)> {
            vec![(None, None); 2]
        }
    }

    /// `sum (x_i - i)^2`, optionally boxed
    struct Shifted {
        bounds: Vec<(Option<f64>, Option<f64>)>,
    }

    impl Objective for Shifted {
        fn value(&mut self, x: &[f64]) -> Result<f64> {
            Ok(x.iter().enumerate().map(|(i, x)| (x - i as f64).powi(2)).sum())
        }

        fn gradient(&mut self, x: &[f64]) -> Result<Vec<f64>> {
            Ok(x.iter().enumerate().map(|(i, x)| 2.0 * (x - i as f64)).collect())
        }

        fn bounds(&self) -> Vec<(Option<f64>, Option<f64>)> {
            self.bounds.clone()
        }
    }

    #[test]
    fn conjugate_gradient_rosenbrock() {
        let settings = MinimizerSettings {
            max_iterations: 20000,
            grad_tol: 1e-7,
            value_rel_tol: 0.0,
            ..Default::default()
        };
        let outcome = minimize(&mut Rosenbrock, &[-1.2, 1.0], &settings).unwrap();

        assert_ne!(outcome.stop, StopReason::MaxIterations);
        assert_relative_eq!(outcome.x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(outcome.x[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn steepest_descent_quadratic() {
        let settings = MinimizerSettings {
            method: Method::SteepestDescent,
            ..Default::default()
        };
        let mut objective = Shifted {
            bounds: vec![(None, None); 3],
        };
        let outcome = minimize(&mut objective, &[5.0, -3.0, 0.5], &settings).unwrap();

        for (i, x) in outcome.x.iter().enumerate() {
            assert_relative_eq!(*x, i as f64, epsilon = 1e-6);
        }
    }

    #[test]
    fn bounds_are_respected() {
        let mut objective = Shifted {
            bounds: vec![(Some(0.5), None), (None, Some(0.25)), (Some(1.0), Some(3.0))],
        };
        let settings = MinimizerSettings {
            value_rel_tol: 0.0,
            ..Default::default()
        };
        let outcome = minimize(&mut objective, &[4.0, -2.0, 10.0], &settings).unwrap();

        assert_eq!(outcome.x[0], 0.5);
        assert_eq!(outcome.x[1], 0.25);
        assert_relative_eq!(outcome.x[2], 2.0, epsilon = 1e-6);
        assert_ne!(outcome.stop, StopReason::MaxIterations);
    }

    #[test]
    fn iteration_limit() {
        let settings = MinimizerSettings {
            max_iterations: 3,
            value_rel_tol: 0.0,
            ..Default::default()
        };
        let outcome = minimize(&mut Rosenbrock, &[-1.2, 1.0], &settings).unwrap();
        assert_eq!(outcome.stop, StopReason::MaxIterations);
        assert_eq!(outcome.iterations, 3);
    }
}
