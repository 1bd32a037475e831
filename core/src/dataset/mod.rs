//! Reference configurations read from disk.

pub mod extxyz;

use std::path::Path;

use crate::{configuration::Configuration, parallel, Result};

#[derive(Clone, Debug, Default)]
pub struct Dataset {
    configs: Vec<Configuration>,
}

impl Dataset {
    /// Read a single extended XYZ file, or every `.xyz` file of a
    /// directory in sorted order.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let files = if path.is_dir() {
            extxyz::files_in(path)?
        } else {
            vec![path.to_path_buf()]
        };

        let configs = parallel::try_map(&files, |file| extxyz::read(file))?;
        log::info!("{} configurations read from {}", configs.len(), path.display());

        Ok(Self { configs })
    }

    pub fn configs(&self) -> &[Configuration] {
        &self.configs
    }

    pub fn into_configs(self) -> Vec<Configuration> {
        self.configs
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl From<Vec<Configuration>> for Dataset {
    fn from(configs: Vec<Configuration>) -> Self {
        Self { configs }
    }
}
