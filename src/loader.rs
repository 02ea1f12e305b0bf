//! Importers that turn scene files on disk into an [`ImportedScene`].

mod gltf_loader;
mod obj_loader;
mod scene;
mod smooth_normals;

pub use gltf_loader::*;
pub use obj_loader::*;
pub use scene::*;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported asset format: {0}")]
    UnsupportedFormat(String),
    #[error("Could not import glTF file: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("Could not import OBJ file: {0}")]
    Obj(#[from] tobj::LoadError),
    #[error("Scene has no root node")]
    MissingRootNode,
    #[error("Scene is incomplete: {0}")]
    IncompleteScene(String),
    #[error("Invalid node hierarchy: {0}")]
    InvalidHierarchy(String),
    #[error("Invalid mesh '{mesh}': {reason}")]
    InvalidMesh { mesh: String, reason: String },
}

/// Post-processing applied to every imported scene.
/// Faces are always triangulated.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ImportOptions {
    /// Compute smooth vertex normals for meshes that come without any.
    pub generate_smooth_normals: bool,
    /// Flip the v texture coordinate (v' = 1 - v).
    pub flip_uvs: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            generate_smooth_normals: true,
            flip_uvs: true,
        }
    }
}

pub trait SceneImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, ImportError>;
}

/// Picks an importer based on the file extension.
#[derive(Debug, Clone, Default)]
pub struct AssetImporter {
    pub options: ImportOptions,
}

impl AssetImporter {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }
}

impl SceneImporter for AssetImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, ImportError> {
        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "gltf" | "glb" => GltfLoader::new(self.options).import(path),
            "obj" => ObjLoader::new(self.options).import(path),
            _ => Err(ImportError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Texture paths in material files are relative to the asset.
fn asset_directory(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extensions_are_rejected() {
        let importer = AssetImporter::default();
        let result = importer.import(Path::new("models/teapot.fbx"));
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }

    #[test]
    fn missing_files_are_import_errors() {
        let importer = AssetImporter::default();
        assert!(importer.import(Path::new("does/not/exist.obj")).is_err());
        assert!(importer.import(Path::new("does/not/exist.glb")).is_err());
    }
}
