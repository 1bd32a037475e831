use std::path::PathBuf;

use thiserror::Error;

/// A quantity that can be requested from a model evaluation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Quantity {
    Energy,
    /// Energy of every contributing atom
    ParticleEnergy,
    Forces,
    Stress,
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Quantity::Energy => "energy",
            Quantity::ParticleEnergy => "particle energy",
            Quantity::Forces => "forces",
            Quantity::Stress => "stress",
        })
    }
}

#[derive(Error, Debug)]
pub enum KliffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("'{0}' computation not supported by model")]
    Unsupported(Quantity),
    #[error("{model:?} initialization failed: {reason}")]
    Initialization { model: String, reason: String },
    #[error("singular cell: lattice vectors are linearly dependent")]
    SingularCell,
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

pub type Result<T> = std::result::Result<T, KliffError>;
