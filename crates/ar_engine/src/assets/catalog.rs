//! Model catalogue
//!
//! Maps model identifiers to their OBJ file and the normalisation applied at
//! load time. Lives in the configuration file under `[models.<name>]`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::AssetError;

/// One catalogue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// OBJ file path
    pub path: PathBuf,
    /// Uniform scale baked into the geometry so it fits the marker
    pub scale: f32,
    /// Swap Y and Z on load for Z-up exports
    #[serde(default = "ModelEntry::default_swap_yz")]
    pub swap_yz: bool,
}

impl ModelEntry {
    fn default_swap_yz() -> bool {
        true
    }

    /// Entry for `path` with the default axis swap
    pub fn new(path: impl Into<PathBuf>, scale: f32) -> Self {
        Self {
            path: path.into(),
            scale,
            swap_yz: true,
        }
    }
}

/// A catalogue row as shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct ModelListing {
    /// Model identifier
    pub identifier: String,
    /// Resolved path
    pub path: PathBuf,
    /// Load-time scale
    pub scale: f32,
    /// Whether the OBJ file is present on disk
    pub exists: bool,
}

/// Identifier to model entry mapping, ordered by identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    entries: BTreeMap<String, ModelEntry>,
}

impl ModelCatalog {
    /// Catalogue with no models
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace an entry
    pub fn insert(&mut self, identifier: impl Into<String>, entry: ModelEntry) {
        self.entries.insert(identifier.into(), entry);
    }

    /// Look up an entry
    pub fn get(&self, identifier: &str) -> Option<&ModelEntry> {
        self.entries.get(identifier)
    }

    /// Look up an entry, failing for unknown identifiers
    pub fn resolve(&self, identifier: &str) -> Result<&ModelEntry, AssetError> {
        self.get(identifier)
            .ok_or_else(|| AssetError::UnknownModel(identifier.to_string()))
    }

    /// Whether `identifier` is catalogued
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// All identifiers in order
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalogue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the catalogue with relative paths resolved against `root`
    pub fn rebased(&self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let entries = self
            .entries
            .iter()
            .map(|(id, entry)| {
                let path = if entry.path.is_relative() {
                    root.join(&entry.path)
                } else {
                    entry.path.clone()
                };
                (id.clone(), ModelEntry { path, ..entry.clone() })
            })
            .collect();
        Self { entries }
    }

    /// Every entry with whether its file is present
    pub fn listing(&self) -> Vec<ModelListing> {
        self.entries
            .iter()
            .map(|(identifier, entry)| ModelListing {
                identifier: identifier.clone(),
                path: entry.path.clone(),
                scale: entry.scale,
                exists: entry.path.is_file(),
            })
            .collect()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        const MODELS: [(&str, f32); 13] = [
            ("bulbasaur", 0.05),
            ("arceus", 0.03),
            ("zekrom", 0.10),
            ("gyarados", 0.10),
            ("dragonite", 0.0012),
            ("magikarp", 0.037),
            ("pokemon", 0.40),
            ("umbreon", 0.018),
            ("mew", 0.0010),
            ("lunala", 6.23),
            ("lapras", 0.0318),
            ("golbat", 0.04),
            ("rocket_orbiting_moon", 0.04),
        ];

        let mut catalog = Self::empty();
        for (name, scale) in MODELS {
            catalog.insert(
                name,
                ModelEntry::new(format!("models/{name}/{name}.obj"), scale),
            );
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalogue() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.len(), 13);
        let rocket = catalog.get("rocket_orbiting_moon").unwrap();
        assert_eq!(rocket.scale, 0.04);
        assert!(rocket.swap_yz);
        assert_eq!(
            rocket.path,
            PathBuf::from("models/rocket_orbiting_moon/rocket_orbiting_moon.obj")
        );
    }

    #[test]
    fn test_unknown_model() {
        let catalog = ModelCatalog::default();
        assert_eq!(
            catalog.resolve("pikachu"),
            Err(AssetError::UnknownModel("pikachu".to_string()))
        );
    }

    #[test]
    fn test_listing_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("models/mew")).unwrap();
        std::fs::write(dir.path().join("models/mew/mew.obj"), "v 0 0 0\n").unwrap();

        let listing = ModelCatalog::default().rebased(dir.path()).listing();
        let mew = listing.iter().find(|l| l.identifier == "mew").unwrap();
        let golbat = listing.iter().find(|l| l.identifier == "golbat").unwrap();
        assert!(mew.exists);
        assert!(!golbat.exists);
    }

    #[test]
    fn test_toml_entries_default_swap() {
        let catalog: ModelCatalog =
            toml::from_str("[fox]\npath = \"fox.obj\"\nscale = 0.5\n").unwrap();
        let fox = catalog.get("fox").unwrap();
        assert!(fox.swap_yz);
        assert_eq!(fox.scale, 0.5);
    }
}
