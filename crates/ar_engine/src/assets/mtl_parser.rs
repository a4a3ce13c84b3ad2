//! MTL (Material Template Library) file parser
//!
//! Reads the Phong coefficients the renderer uses and decodes the diffuse
//! texture map into RGBA8 pixels ready for upload.

use std::path::Path;

use super::geometry::{MaterialData, TexturePixels};
use super::AssetError;

/// Material loading seam
pub trait MaterialLoader {
    /// Load every material defined in the library at `path`
    fn load_materials(&mut self, path: &Path) -> Result<Vec<MaterialData>, AssetError>;
}

/// Wavefront MTL loader
#[derive(Debug, Default, Clone, Copy)]
pub struct MtlLoader;

impl MtlLoader {
    /// Create a loader
    pub fn new() -> Self {
        Self
    }

    /// Parse MTL text; texture paths resolve against `path`'s directory
    pub fn parse(contents: &str, path: &Path) -> Result<Vec<MaterialData>, AssetError> {
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut materials: Vec<MaterialData> = Vec::new();

        for (line_index, line) in contents.lines().enumerate() {
            let line_no = line_index + 1;
            let parse_error = |message: String| AssetError::Parse {
                path: path.to_path_buf(),
                line: line_no,
                message,
            };

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let Some(command) = tokens.next() else {
                continue;
            };
            let args: Vec<&str> = tokens.collect();

            if command == "newmtl" {
                let name = args
                    .first()
                    .ok_or_else(|| parse_error("newmtl missing material name".to_string()))?;
                materials.push(MaterialData {
                    name: (*name).to_string(),
                    ambient: [1.0, 1.0, 1.0],
                    diffuse: [0.8, 0.8, 0.8],
                    specular: [0.5, 0.5, 0.5],
                    shininess: 250.0,
                    dissolve: 1.0,
                    texture: None,
                });
                continue;
            }

            let Some(material) = materials.last_mut() else {
                return Err(parse_error(format!("'{command}' before any newmtl")));
            };

            match command {
                "Ka" => material.ambient = parse_rgb(&args).map_err(parse_error)?,
                "Kd" => material.diffuse = parse_rgb(&args).map_err(parse_error)?,
                "Ks" => material.specular = parse_rgb(&args).map_err(parse_error)?,
                "Ns" => material.shininess = parse_scalar(&args).map_err(parse_error)?,
                "d" => material.dissolve = parse_scalar(&args).map_err(parse_error)?,
                "Tr" => material.dissolve = 1.0 - parse_scalar(&args).map_err(parse_error)?,
                "map_Kd" => {
                    // Options such as `-s 1 1 1` precede the file name
                    let file = args
                        .last()
                        .ok_or_else(|| parse_error("map_Kd missing file name".to_string()))?;
                    material.texture = Some(decode_texture(&base_dir.join(file))?);
                }
                _ => log::trace!("Ignoring MTL directive '{}' in {:?}", command, path),
            }
        }

        Ok(materials)
    }
}

impl MaterialLoader for MtlLoader {
    fn load_materials(&mut self, path: &Path) -> Result<Vec<MaterialData>, AssetError> {
        let contents = std::fs::read_to_string(path).map_err(|e| AssetError::io(path, &e))?;
        let materials = Self::parse(&contents, path)?;

        log::debug!("Loaded {} materials from {:?}", materials.len(), path);
        Ok(materials)
    }
}

fn parse_scalar(args: &[&str]) -> Result<f32, String> {
    let arg = args.first().ok_or_else(|| "missing value".to_string())?;
    arg.parse().map_err(|_| format!("invalid number '{arg}'"))
}

fn parse_rgb(args: &[&str]) -> Result<[f32; 3], String> {
    // A single value means grey
    let values: Vec<f32> = args
        .iter()
        .take(3)
        .map(|a| a.parse().map_err(|_| format!("invalid number '{a}'")))
        .collect::<Result<_, _>>()?;
    match values.as_slice() {
        [v] => Ok([*v; 3]),
        [r, g, b] => Ok([*r, *g, *b]),
        _ => Err(format!("expected 1 or 3 colour components, got {}", values.len())),
    }
}

fn decode_texture(path: &Path) -> Result<TexturePixels, AssetError> {
    if !path.is_file() {
        return Err(AssetError::NotFound(path.to_path_buf()));
    }
    let image = image::open(path)
        .map_err(|e| AssetError::Texture {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .to_rgba8();

    log::debug!("Decoded texture {:?} ({}x{})", path, image.width(), image.height());
    Ok(TexturePixels {
        path: path.to_path_buf(),
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}
