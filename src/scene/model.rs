use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{FilterMode, Mesh, MeshBuilder, Texture, TextureCache};
use crate::{
    gpu::{GpuDevice, GpuResult},
    loader::{AssetImporter, ImportedScene, SceneImporter},
};

/// Every mesh of an imported asset, in depth-first node order.
///
/// Owns the texture cache that backs the textures of its meshes, so dropping a model
/// releases all of its GPU resources.
#[derive(Debug)]
pub struct Model {
    path: PathBuf,
    meshes: Vec<Mesh>,
    texture_cache: TextureCache,
}

/// Imports `path` with the default importer.
pub fn load_model(
    path: impl AsRef<Path>,
    filter: FilterMode,
    device: &Arc<dyn GpuDevice>,
) -> GpuResult<Model> {
    Model::load(path.as_ref(), filter, &AssetImporter::default(), device)
}

impl Model {
    /// Import failures are logged and produce a model without meshes. Only failing GPU
    /// allocations are errors.
    pub fn load(
        path: &Path,
        filter: FilterMode,
        importer: &dyn SceneImporter,
        device: &Arc<dyn GpuDevice>,
    ) -> GpuResult<Self> {
        match importer.import(path) {
            Ok(scene) => Self::from_scene(path, &scene, filter, device),
            Err(error) => {
                log::error!("Failed to import {}: {}", path.display(), error);
                Ok(Self::empty(path, filter, device))
            }
        }
    }

    pub fn empty(path: &Path, filter: FilterMode, device: &Arc<dyn GpuDevice>) -> Self {
        Self {
            path: path.to_path_buf(),
            meshes: Vec::new(),
            texture_cache: TextureCache::new(device.clone(), filter),
        }
    }

    pub fn from_scene(
        path: &Path,
        scene: &ImportedScene,
        filter: FilterMode,
        device: &Arc<dyn GpuDevice>,
    ) -> GpuResult<Self> {
        let mut model = Self::empty(path, filter, device);
        if let Err(error) = scene.validate() {
            log::error!("Scene {} is invalid: {}", path.display(), error);
            return Ok(model);
        }

        let mut builder = MeshBuilder::new(device, &mut model.texture_cache);
        let mut meshes = Vec::new();

        // Parents before children, and the meshes of a node before its children
        let mut stack = vec![scene.root];
        while let Some(index) = stack.pop() {
            let node = &scene.nodes[index];
            for &mesh_index in &node.meshes {
                let mesh = &scene.meshes[mesh_index];
                meshes.push(builder.build(mesh, &scene.materials[mesh.material])?);
            }
            stack.extend(node.children.iter().rev());
        }
        model.meshes = meshes;

        log::info!(
            "Loaded {}: {} meshes, {} triangles, {} textures",
            path.display(),
            model.meshes.len(),
            model.triangle_count(),
            model.texture_cache.len()
        );
        Ok(model)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(Mesh::triangle_count).sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|mesh| mesh.vertices.len()).sum()
    }

    /// Textures of every mesh in mesh order. Shared textures are listed once per use.
    pub fn textures(&self) -> impl Iterator<Item = &Texture> {
        self.meshes.iter().flat_map(|mesh| mesh.textures.iter())
    }

    pub fn texture_cache(&self) -> &TextureCache {
        &self.texture_cache
    }
}
