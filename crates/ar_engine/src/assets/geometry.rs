//! Loaded model and material data

use std::path::PathBuf;

use crate::render::backend::TextureHandle;

/// Interleaved vertex as uploaded to the graphics backend
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vertex {
    /// Model-space position
    pub position: [f32; 3],
    /// Unit normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
}

// SAFETY: `Vertex` is `repr(C)`, made only of `f32` arrays, and has no padding.
#[allow(unsafe_code)]
unsafe impl bytemuck::Zeroable for Vertex {}
// SAFETY: as above; every bit pattern is a valid `Vertex`.
#[allow(unsafe_code)]
unsafe impl bytemuck::Pod for Vertex {}

/// Consecutive triangles drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialRange {
    /// Index into the model's material list; `None` draws the default material
    pub material: Option<usize>,
    /// First triangle of the run
    pub first_triangle: usize,
    /// Number of triangles in the run
    pub triangle_count: usize,
}

/// Options applied while parsing geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    /// Uniform scale applied to positions
    pub scale: f32,
    /// Swap Y and Z of positions and normals
    pub swap_yz: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            swap_yz: false,
        }
    }
}

/// Geometry loader output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryData {
    /// Triangles in file order
    pub triangles: Vec<[Vertex; 3]>,
    /// Material runs covering `triangles` in order
    pub ranges: Vec<MaterialRange>,
    /// Referenced material names, in first-use order
    pub material_names: Vec<String>,
    /// Material libraries named by `mtllib`, resolved against the OBJ directory
    pub material_libraries: Vec<PathBuf>,
}

/// A resident model: immutable after load
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    identifier: String,
    triangles: Vec<[Vertex; 3]>,
    ranges: Vec<MaterialRange>,
    material_names: Vec<String>,
}

impl ModelAsset {
    /// Wrap parsed geometry under an identifier
    pub fn new(identifier: impl Into<String>, geometry: GeometryData) -> Self {
        Self {
            identifier: identifier.into(),
            triangles: geometry.triangles,
            ranges: geometry.ranges,
            material_names: geometry.material_names,
        }
    }

    /// Model identifier
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Triangles in file order
    pub fn triangles(&self) -> &[[Vertex; 3]] {
        &self.triangles
    }

    /// Material runs
    pub fn ranges(&self) -> &[MaterialRange] {
        &self.ranges
    }

    /// Material references, matching the cache's material list by index
    pub fn material_names(&self) -> &[String] {
        &self.material_names
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Raw vertex bytes for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.triangles)
    }
}

/// Decoded texture pixels, tightly packed RGBA8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexturePixels {
    /// Source file
    pub path: PathBuf,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// `width * height * 4` bytes
    pub rgba: Vec<u8>,
}

/// Material loader output: coefficients plus an optional decoded texture
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    /// Material name
    pub name: String,
    /// Ambient reflectance (Ka)
    pub ambient: [f32; 3],
    /// Diffuse reflectance (Kd)
    pub diffuse: [f32; 3],
    /// Specular reflectance (Ks)
    pub specular: [f32; 3],
    /// Specular exponent (Ns)
    pub shininess: f32,
    /// Opacity (d)
    pub dissolve: f32,
    /// Diffuse texture (map_Kd)
    pub texture: Option<TexturePixels>,
}

impl MaterialData {
    /// Flat grey used for faces without a resolvable material
    pub fn fallback(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: [1.0, 1.0, 1.0],
            diffuse: [0.8, 0.8, 0.8],
            specular: [0.0, 0.0, 0.0],
            shininess: 0.0,
            dissolve: 1.0,
            texture: None,
        }
    }
}

/// A resident material; its texture lives on the graphics backend
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialAsset {
    /// Material name
    pub name: String,
    /// Ambient reflectance
    pub ambient: [f32; 3],
    /// Diffuse reflectance
    pub diffuse: [f32; 3],
    /// Specular reflectance
    pub specular: [f32; 3],
    /// Specular exponent
    pub shininess: f32,
    /// Opacity
    pub dissolve: f32,
    /// Uploaded diffuse texture
    pub texture: Option<TextureHandle>,
}

impl MaterialAsset {
    /// Combine loaded coefficients with an uploaded texture handle
    pub fn from_data(data: &MaterialData, texture: Option<TextureHandle>) -> Self {
        Self {
            name: data.name.clone(),
            ambient: data.ambient,
            diffuse: data.diffuse,
            specular: data.specular,
            shininess: data.shininess,
            dissolve: data.dissolve,
            texture,
        }
    }
}
