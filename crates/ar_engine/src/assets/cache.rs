//! Bounded model cache
//!
//! Keeps loaded models, their materials and the backend textures those
//! materials use. Entries are replaced least-recently-used first, except
//! entries the orchestrator has pinned. A load either completes (geometry,
//! every material library, every texture upload) or leaves nothing behind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::render::backend::{GraphicsBackend, TextureHandle};

use super::catalog::ModelCatalog;
use super::geometry::{LoadOptions, MaterialAsset, MaterialData, ModelAsset};
use super::mtl_parser::MaterialLoader;
use super::obj_loader::GeometryLoader;
use super::{AssetError, AssetLoadError};

/// A resident model and its materials, shared read-only with the renderer
#[derive(Debug, Clone)]
pub struct CachedAsset {
    /// Geometry
    pub model: Arc<ModelAsset>,
    /// Materials, indexed like `model.material_names()`
    pub materials: Arc<Vec<MaterialAsset>>,
}

#[derive(Debug)]
struct CacheEntry {
    asset: CachedAsset,
    textures: Vec<TextureHandle>,
    last_used: u64,
}

/// LRU cache of loaded models keyed by identifier
pub struct AssetCache {
    catalog: ModelCatalog,
    geometry_loader: Box<dyn GeometryLoader>,
    material_loader: Box<dyn MaterialLoader>,
    entries: HashMap<String, CacheEntry>,
    pinned: HashSet<String>,
    capacity: usize,
    tick: u64,
    evicted: Vec<String>,
}

impl AssetCache {
    /// Create an empty cache; a capacity of zero is raised to one
    pub fn new(
        catalog: ModelCatalog,
        geometry_loader: Box<dyn GeometryLoader>,
        material_loader: Box<dyn MaterialLoader>,
        capacity: usize,
    ) -> Self {
        Self {
            catalog,
            geometry_loader,
            material_loader,
            entries: HashMap::new(),
            pinned: HashSet::new(),
            capacity: capacity.max(1),
            tick: 0,
            evicted: Vec::new(),
        }
    }

    /// Catalogue used to resolve identifiers
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Return the resident asset for `identifier`, loading it on a miss
    ///
    /// A failed load caches nothing, uploads nothing that outlives the call
    /// and evicts nothing.
    pub fn get(
        &mut self,
        identifier: &str,
        backend: &mut dyn GraphicsBackend,
    ) -> Result<CachedAsset, AssetLoadError> {
        self.tick += 1;
        if let Some(entry) = self.entries.get_mut(identifier) {
            entry.last_used = self.tick;
            log::trace!("Asset cache hit for '{}'", identifier);
            return Ok(entry.asset.clone());
        }

        log::info!("Loading model '{}'", identifier);
        let entry = self
            .load(identifier, backend)
            .map_err(|cause| AssetLoadError::new(identifier, cause))?;
        let asset = entry.asset.clone();
        self.entries.insert(identifier.to_string(), entry);

        while self.entries.len() > self.capacity {
            match self.lru_victim(Some(identifier)) {
                Some(victim) => self.evict(&victim, backend),
                None => {
                    // Everything else is pinned; undo the insert
                    if let Some(entry) = self.entries.remove(identifier) {
                        release_textures(&entry.textures, backend);
                    }
                    return Err(AssetLoadError::new(
                        identifier,
                        AssetError::CacheFull {
                            capacity: self.capacity,
                        },
                    ));
                }
            }
        }

        log::debug!(
            "Model '{}' resident ({} triangles, {} materials); {}/{} entries",
            identifier,
            asset.model.triangle_count(),
            asset.materials.len(),
            self.entries.len(),
            self.capacity
        );
        Ok(asset)
    }

    /// Change the capacity, evicting unpinned entries that no longer fit
    pub fn configure(&mut self, capacity: usize, backend: &mut dyn GraphicsBackend) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            let Some(victim) = self.lru_victim(None) else {
                log::warn!(
                    "Asset cache holds {} pinned entries, above capacity {}",
                    self.entries.len(),
                    self.capacity
                );
                break;
            };
            self.evict(&victim, backend);
        }
    }

    /// Protect `identifier` from eviction
    pub fn pin(&mut self, identifier: &str) {
        self.pinned.insert(identifier.to_string());
    }

    /// Allow `identifier` to be evicted again
    pub fn unpin(&mut self, identifier: &str) {
        self.pinned.remove(identifier);
    }

    /// Whether `identifier` is pinned
    pub fn is_pinned(&self, identifier: &str) -> bool {
        self.pinned.contains(identifier)
    }

    /// Whether `identifier` is loaded
    pub fn is_resident(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is resident
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of resident entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Identifiers evicted since the last call
    ///
    /// Whoever caches backend state derived from an asset (draw lists) must
    /// drop it for these identifiers.
    pub fn take_evicted(&mut self) -> Vec<String> {
        std::mem::take(&mut self.evicted)
    }

    /// Drop every entry and release its textures
    pub fn release_all(&mut self, backend: &mut dyn GraphicsBackend) {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            release_textures(&entry.textures, backend);
        }
        self.pinned.clear();
        if count > 0 {
            log::info!("Released {} cached models", count);
        }
    }

    fn lru_victim(&self, keep: Option<&str>) -> Option<String> {
        self.entries
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != keep && !self.pinned.contains(id.as_str()))
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(id, _)| id.clone())
    }

    fn evict(&mut self, identifier: &str, backend: &mut dyn GraphicsBackend) {
        if let Some(entry) = self.entries.remove(identifier) {
            release_textures(&entry.textures, backend);
            log::debug!("Evicted model '{}'", identifier);
            self.evicted.push(identifier.to_string());
        }
    }

    fn load(
        &mut self,
        identifier: &str,
        backend: &mut dyn GraphicsBackend,
    ) -> Result<CacheEntry, AssetError> {
        let entry = self.catalog.resolve(identifier)?;
        let options = LoadOptions {
            scale: entry.scale,
            swap_yz: entry.swap_yz,
        };
        let path = entry.path.clone();
        let geometry = self.geometry_loader.load_model(&path, options)?;

        let mut library: HashMap<String, MaterialData> = HashMap::new();
        for mtl_path in &geometry.material_libraries {
            for material in self.material_loader.load_materials(mtl_path)? {
                library.insert(material.name.clone(), material);
            }
        }

        let data: Vec<MaterialData> = geometry
            .material_names
            .iter()
            .map(|name| {
                library.remove(name).unwrap_or_else(|| {
                    log::warn!("Material '{}' not defined for '{}'; using default", name, identifier);
                    MaterialData::fallback(name.clone())
                })
            })
            .collect();

        let mut textures = Vec::new();
        let mut materials = Vec::with_capacity(data.len());
        for material in &data {
            let handle = match &material.texture {
                Some(pixels) => match backend.upload_texture(pixels) {
                    Ok(handle) => {
                        textures.push(handle);
                        Some(handle)
                    }
                    Err(e) => {
                        release_textures(&textures, backend);
                        return Err(AssetError::Upload(e.to_string()));
                    }
                },
                None => None,
            };
            materials.push(MaterialAsset::from_data(material, handle));
        }

        Ok(CacheEntry {
            asset: CachedAsset {
                model: Arc::new(ModelAsset::new(identifier, geometry)),
                materials: Arc::new(materials),
            },
            textures,
            last_used: self.tick,
        })
    }
}

fn release_textures(textures: &[TextureHandle], backend: &mut dyn GraphicsBackend) {
    for &handle in textures {
        backend.release_texture(handle);
    }
}
