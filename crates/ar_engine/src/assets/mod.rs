//! Asset loading and caching
//!
//! Models are resolved through the [`ModelCatalog`], parsed by a
//! [`GeometryLoader`] and a [`MaterialLoader`], and kept resident in the
//! [`AssetCache`] together with their uploaded textures.

pub mod cache;
pub mod catalog;
pub mod geometry;
pub mod mtl_parser;
pub mod obj_loader;

use std::path::PathBuf;

use thiserror::Error;

pub use cache::{AssetCache, CachedAsset};
pub use catalog::{ModelCatalog, ModelEntry, ModelListing};
pub use geometry::{
    GeometryData, LoadOptions, MaterialAsset, MaterialData, MaterialRange, ModelAsset,
    TexturePixels, Vertex,
};
pub use mtl_parser::{MaterialLoader, MtlLoader};
pub use obj_loader::{GeometryLoader, ObjLoader};

/// Why an asset could not be loaded
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    /// The identifier is not in the model catalogue
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    /// A referenced file does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// A file exists but could not be read
    #[error("IO error reading {path}: {message}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// A file is malformed
    #[error("Parse error in {path} line {line}: {message}")]
    Parse {
        /// Offending file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },

    /// A texture could not be decoded
    #[error("Texture decode failed for {path}: {message}")]
    Texture {
        /// Texture file
        path: PathBuf,
        /// Decoder error
        message: String,
    },

    /// Texture upload to the graphics backend failed
    #[error("Texture upload failed: {0}")]
    Upload(String),

    /// Every resident entry is pinned, so nothing can make room
    #[error("Asset cache full: all {capacity} entries are pinned")]
    CacheFull {
        /// Configured capacity
        capacity: usize,
    },
}

impl AssetError {
    pub(crate) fn io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        if error.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io {
                path,
                message: error.to_string(),
            }
        }
    }
}

/// An asset failed to load; nothing was cached for it
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to load asset '{identifier}': {cause}")]
pub struct AssetLoadError {
    /// Identifier that was requested
    pub identifier: String,
    /// Why it failed
    #[source]
    pub cause: AssetError,
}

impl AssetLoadError {
    /// Attach an identifier to a cause
    pub fn new(identifier: impl Into<String>, cause: AssetError) -> Self {
        Self {
            identifier: identifier.into(),
            cause,
        }
    }
}
