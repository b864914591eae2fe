//! Regions — source → region-name map.
//!
//! File format:
//!
//! ```toml
//! [names]
//! 0a1b2c3d = "us-east"
//! 4e5f6a7b = "us-east-monster"
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::ConfigError;

#[derive(Debug, Default, Deserialize)]
struct RegionFile {
    #[serde(default)]
    names: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegionMap {
    names: HashMap<String, String>,
    staging_suffix: String,
}

impl RegionMap {
    pub fn new(names: HashMap<String, String>, staging_suffix: impl Into<String>) -> Self {
        Self {
            names,
            staging_suffix: staging_suffix.into(),
        }
    }

    /// Load the file at `path` (if any) and merge `inline` entries over it.
    pub fn load(
        path: Option<&Path>,
        inline: &HashMap<String, String>,
        staging_suffix: &str,
    ) -> Result<Self, ConfigError> {
        let mut names = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::RegionFile {
                    path: path.to_path_buf(),
                    source,
                })?;
                let file: RegionFile = toml::from_str(&contents).map_err(|source| ConfigError::RegionParse {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!("Loaded {} regions from {}", file.names.len(), path.display());
                file.names
            }
            None => HashMap::new(),
        };
        names.extend(inline.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(Self::new(names, staging_suffix))
    }

    pub fn region_for(&self, source: &str) -> Option<&str> {
        self.names.get(source).map(String::as_str)
    }

    pub fn is_staging(&self, region: &str) -> bool {
        !self.staging_suffix.is_empty() && region.ends_with(&self.staging_suffix)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
