//! Settings files, deserialized into `Config*` structs and converted into
//! the domain types.

mod descriptor;
mod fit;

pub use descriptor::{ConfigAngular, ConfigDescriptor, ConfigG2, ConfigG3};
pub use fit::{ConfigFit, ConfigModel};

use std::{fs::File, io::BufReader, path::Path};

use serde::de::DeserializeOwned;

use crate::Result;

/// Read a JSON settings file
pub fn read<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
