//! OBJ file loader for 3D models

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::geometry::{GeometryData, LoadOptions, MaterialRange, Vertex};
use super::AssetError;

/// Geometry loading seam
pub trait GeometryLoader {
    /// Parse the model at `path` into triangles and material references
    fn load_model(&mut self, path: &Path, options: LoadOptions) -> Result<GeometryData, AssetError>;
}

/// Wavefront OBJ loader
///
/// Handles `v`, `vn`, `vt`, `f`, `usemtl`/`usemat` and `mtllib`. Polygons are
/// fan-triangulated. Faces without normals get their face normal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjLoader;

impl ObjLoader {
    /// Create a loader
    pub fn new() -> Self {
        Self
    }

    /// Parse OBJ text; `path` is used for error messages and `mtllib` resolution
    pub fn parse(
        reader: impl BufRead,
        path: &Path,
        options: LoadOptions,
    ) -> Result<GeometryData, AssetError> {
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut state = ParseState::new(path, options);

        for (line_index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| AssetError::io(path, &e))?;
            state.line = line_index + 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let args: Vec<&str> = parts.collect();

            match keyword {
                "v" => {
                    let position = state.parse_floats::<3>(&args, "vertex")?;
                    let position = state.orient(position).map(|c| c * options.scale);
                    state.positions.push(position);
                }
                "vn" => {
                    let normal = state.parse_floats::<3>(&args, "normal")?;
                    let normal = state.orient(normal);
                    state.normals.push(normal);
                }
                "vt" => {
                    let tex_coord = state.parse_floats::<2>(&args, "texture coordinate")?;
                    state.tex_coords.push(tex_coord);
                }
                "usemtl" | "usemat" => {
                    let name = args
                        .first()
                        .ok_or_else(|| state.error(format!("{keyword} missing material name")))?;
                    state.use_material(name);
                }
                "mtllib" => {
                    // Library names may contain spaces
                    if args.is_empty() {
                        return Err(state.error("mtllib missing file name"));
                    }
                    state.libraries.push(base_dir.join(args.join(" ")));
                }
                "f" => state.parse_face(&args)?,
                _ => {}
            }
        }

        state.finish()
    }
}

impl GeometryLoader for ObjLoader {
    fn load_model(&mut self, path: &Path, options: LoadOptions) -> Result<GeometryData, AssetError> {
        let file = File::open(path).map_err(|e| AssetError::io(path, &e))?;
        let geometry = Self::parse(BufReader::new(file), path, options)?;

        log::info!(
            "Loaded model {:?}: {} triangles, {} materials",
            path,
            geometry.triangles.len(),
            geometry.material_names.len()
        );
        Ok(geometry)
    }
}

struct ParseState<'a> {
    path: &'a Path,
    options: LoadOptions,
    line: usize,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    tex_coords: Vec<[f32; 2]>,
    triangles: Vec<[Vertex; 3]>,
    ranges: Vec<MaterialRange>,
    material_names: Vec<String>,
    libraries: Vec<PathBuf>,
    current_material: Option<usize>,
}

impl<'a> ParseState<'a> {
    fn new(path: &'a Path, options: LoadOptions) -> Self {
        Self {
            path,
            options,
            line: 0,
            positions: Vec::new(),
            normals: Vec::new(),
            tex_coords: Vec::new(),
            triangles: Vec::new(),
            ranges: Vec::new(),
            material_names: Vec::new(),
            libraries: Vec::new(),
            current_material: None,
        }
    }

    fn error(&self, message: impl Into<String>) -> AssetError {
        AssetError::Parse {
            path: self.path.to_path_buf(),
            line: self.line,
            message: message.into(),
        }
    }

    fn orient(&self, v: [f32; 3]) -> [f32; 3] {
        if self.options.swap_yz {
            [v[0], v[2], v[1]]
        } else {
            v
        }
    }

    fn parse_floats<const N: usize>(&self, args: &[&str], what: &str) -> Result<[f32; N], AssetError> {
        if args.len() < N {
            return Err(self.error(format!("{what} needs {N} components, got {}", args.len())));
        }
        let mut out = [0.0; N];
        for (slot, arg) in out.iter_mut().zip(args) {
            *slot = arg
                .parse()
                .map_err(|_| self.error(format!("invalid {what} component '{arg}'")))?;
        }
        Ok(out)
    }

    fn use_material(&mut self, name: &str) {
        let index = match self.material_names.iter().position(|n| n == name) {
            Some(index) => index,
            None => {
                self.material_names.push(name.to_string());
                self.material_names.len() - 1
            }
        };
        self.current_material = Some(index);
    }

    /// Resolve a 1-based (or negative, relative) OBJ index
    fn resolve_index(&self, token: &str, len: usize, what: &str) -> Result<usize, AssetError> {
        let raw: i64 = token
            .parse()
            .map_err(|_| self.error(format!("invalid {what} index '{token}'")))?;
        let len_i = len as i64;
        let resolved = match raw {
            r if r > 0 && r <= len_i => r - 1,
            r if r < 0 && r.unsigned_abs() <= len as u64 => len_i + r,
            _ => {
                return Err(self.error(format!(
                    "{what} index {raw} out of range (have {len})"
                )))
            }
        };
        Ok(resolved as usize)
    }

    fn parse_face(&mut self, args: &[&str]) -> Result<(), AssetError> {
        if args.len() < 3 {
            return Err(self.error(format!("face needs at least 3 vertices, got {}", args.len())));
        }

        let mut corners = Vec::with_capacity(args.len());
        let mut has_normals = true;
        for arg in args {
            let mut fields = arg.split('/');
            let position = fields.next().unwrap_or_default();
            let position = self.resolve_index(position, self.positions.len(), "position")?;

            let tex_coord = match fields.next() {
                Some(t) if !t.is_empty() => {
                    let index = self.resolve_index(t, self.tex_coords.len(), "texture coordinate")?;
                    self.tex_coords[index]
                }
                _ => [0.0, 0.0],
            };
            let normal = match fields.next() {
                Some(n) if !n.is_empty() => {
                    let index = self.resolve_index(n, self.normals.len(), "normal")?;
                    Some(self.normals[index])
                }
                _ => None,
            };
            has_normals &= normal.is_some();

            corners.push(Vertex {
                position: self.positions[position],
                normal: normal.unwrap_or_default(),
                tex_coord,
            });
        }

        if !has_normals {
            let n = face_normal(&corners);
            for corner in &mut corners {
                corner.normal = n;
            }
        }

        for i in 1..corners.len() - 1 {
            self.push_triangle([corners[0], corners[i], corners[i + 1]]);
        }
        Ok(())
    }

    fn push_triangle(&mut self, triangle: [Vertex; 3]) {
        let index = self.triangles.len();
        match self.ranges.last_mut() {
            Some(range) if range.material == self.current_material => range.triangle_count += 1,
            _ => self.ranges.push(MaterialRange {
                material: self.current_material,
                first_triangle: index,
                triangle_count: 1,
            }),
        }
        self.triangles.push(triangle);
    }

    fn finish(self) -> Result<GeometryData, AssetError> {
        if self.triangles.is_empty() {
            return Err(AssetError::Parse {
                path: self.path.to_path_buf(),
                line: self.line,
                message: "no faces found".to_string(),
            });
        }
        Ok(GeometryData {
            triangles: self.triangles,
            ranges: self.ranges,
            material_names: self.material_names,
            material_libraries: self.libraries,
        })
    }
}

/// Newell normal of a polygon; robust for slightly non-planar faces
fn face_normal(corners: &[Vertex]) -> [f32; 3] {
    let mut n = [0.0_f32; 3];
    for (i, a) in corners.iter().enumerate() {
        let b = &corners[(i + 1) % corners.len()];
        let (a, b) = (a.position, b.position);
        n[0] += (a[1] - b[1]) * (a[2] + b[2]);
        n[1] += (a[2] - b[2]) * (a[0] + b[0]);
        n[2] += (a[0] - b[0]) * (a[1] + b[1]);
    }
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > f32::EPSILON {
        n.map(|c| c / len)
    } else {
        [0.0, 1.0, 0.0]
    }
}
