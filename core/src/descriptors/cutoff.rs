use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Smooth function going to zero (with zero slope) at the cutoff radius.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CutoffFunction {
    /// `0.5 * (cos(pi r / rc) + 1)`
    #[default]
    Cos,
}

impl CutoffFunction {
    /// Value and radial derivative at `r`. Both are zero beyond `rcut`.
    #[inline]
    pub fn evaluate(self, r: f64, rcut: f64) -> (f64, f64) {
        if r >= rcut {
            return (0.0, 0.0);
        }

        match self {
            CutoffFunction::Cos => {
                let x = PI * r / rcut;
                (0.5 * (x.cos() + 1.0), -0.5 * PI / rcut * x.sin())
            }
        }
    }
}
