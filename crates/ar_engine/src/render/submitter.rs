//! Draw submission
//!
//! Owns the graphics backend and the draw lists compiled on it. A draw list
//! is keyed by model identifier and a fingerprint of the material set, so the
//! same model is compiled once and replayed under a new transform every
//! frame. Lists are dropped when the asset cache evicts their model.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::assets::{MaterialAsset, ModelAsset};
use crate::scene::FinalTransform;

use super::backend::{DrawListHandle, GraphicsBackend};
use super::RenderResult;

/// Identity of a compiled draw list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DrawListKey {
    /// Model identifier
    pub identifier: String,
    /// Hash of the material coefficients and texture handles
    pub materials: u64,
}

impl DrawListKey {
    /// Key for a model drawn with `materials`
    pub fn new(model: &ModelAsset, materials: &[MaterialAsset]) -> Self {
        let mut hasher = DefaultHasher::new();
        for material in materials {
            material.name.hash(&mut hasher);
            for value in material
                .ambient
                .iter()
                .chain(&material.diffuse)
                .chain(&material.specular)
                .chain([&material.shininess, &material.dissolve])
            {
                value.to_bits().hash(&mut hasher);
            }
            material.texture.hash(&mut hasher);
        }
        Self {
            identifier: model.identifier().to_string(),
            materials: hasher.finish(),
        }
    }
}

/// Issues draw calls for resident assets
pub struct RenderSubmitter {
    backend: Box<dyn GraphicsBackend>,
    draw_lists: HashMap<DrawListKey, DrawListHandle>,
}

impl RenderSubmitter {
    /// Take ownership of a backend
    pub fn new(backend: Box<dyn GraphicsBackend>) -> Self {
        Self {
            backend,
            draw_lists: HashMap::new(),
        }
    }

    /// Draw `model` under `transform`
    ///
    /// Lighting is forced to `lighting_enabled` for this draw only; the
    /// backend's previous lighting state is restored before returning, also
    /// when the draw fails.
    pub fn submit(
        &mut self,
        transform: &FinalTransform,
        model: &ModelAsset,
        materials: &[MaterialAsset],
        lighting_enabled: bool,
    ) -> RenderResult<()> {
        let prior = self.backend.lighting_enabled();
        if prior != lighting_enabled {
            self.backend.set_lighting(lighting_enabled);
        }

        let result = self.draw(transform, model, materials);

        if prior != lighting_enabled {
            self.backend.set_lighting(prior);
        }
        result
    }

    fn draw(
        &mut self,
        transform: &FinalTransform,
        model: &ModelAsset,
        materials: &[MaterialAsset],
    ) -> RenderResult<()> {
        if !self.backend.supports_draw_lists() {
            return self
                .backend
                .draw_immediate(model, materials, transform.matrix());
        }

        let key = DrawListKey::new(model, materials);
        let handle = match self.draw_lists.get(&key) {
            Some(&handle) => handle,
            None => {
                let handle = self.backend.compile_draw_list(model, materials)?;
                log::debug!("Compiled draw list for '{}'", key.identifier);
                self.draw_lists.insert(key, handle);
                handle
            }
        };
        self.backend.call_draw_list(handle, transform.matrix())
    }

    /// Drop every draw list compiled for `identifier`
    pub fn invalidate(&mut self, identifier: &str) {
        let backend = &mut self.backend;
        self.draw_lists.retain(|key, handle| {
            if key.identifier == identifier {
                backend.release_draw_list(*handle);
                false
            } else {
                true
            }
        });
    }

    /// Drop every draw list
    pub fn release_all(&mut self) {
        for (_, handle) in self.draw_lists.drain() {
            self.backend.release_draw_list(handle);
        }
    }

    /// Number of cached draw lists
    pub fn cached_draw_lists(&self) -> usize {
        self.draw_lists.len()
    }

    /// The backend
    pub fn backend(&self) -> &dyn GraphicsBackend {
        self.backend.as_ref()
    }

    /// The backend, mutably
    pub fn backend_mut(&mut self) -> &mut dyn GraphicsBackend {
        self.backend.as_mut()
    }
}
