// src/registry.rs

use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};
use tracing::debug;

use crate::error::{Error, Result};

/// One catalogued dataset: a display name and the provider's `owner/slug` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub dataset_id: String,
}

/// Accepts both `{"datasets": [...]}` and a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryDocument {
    Wrapped { datasets: Vec<Descriptor> },
    Bare(Vec<Descriptor>),
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    datasets: Vec<Descriptor>,
}

impl Registry {
    #[cfg(test)]
    pub(crate) fn new(datasets: Vec<Descriptor>) -> Self {
        Self { datasets }
    }

    /// Read the registry document at `path`. Nothing is cached; callers
    /// load it again for every request.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::configuration(path.display(), e))?;
        let doc: RegistryDocument = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::configuration(path.display(), e))?;

        let datasets = match doc {
            RegistryDocument::Wrapped { datasets } | RegistryDocument::Bare(datasets) => datasets,
        };
        debug!(path = %path.display(), count = datasets.len(), "loaded dataset registry");
        Ok(Self { datasets })
    }

    pub fn datasets(&self) -> &[Descriptor] {
        &self.datasets
    }

    /// First descriptor whose name equals `name` ignoring case. Whitespace
    /// is significant.
    pub fn lookup(&self, name: &str) -> Result<&Descriptor> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("dataset name must not be empty".into()));
        }
        let wanted = name.to_lowercase();

        self.datasets
            .iter()
            .find(|d| d.name.to_lowercase() == wanted)
            .ok_or_else(|| Error::DatasetNotFound(name.to_string()))
    }
}

/// Load the registry at `path` and resolve `name` against it.
pub fn lookup<P: AsRef<Path>>(path: P, name: &str) -> Result<Descriptor> {
    Registry::load(path)?.lookup(name).cloned()
}
