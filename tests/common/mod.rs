//! Scenes and devices shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use scene_tracer::{
    gpu::{GpuDevice, HeadlessDevice},
    loader::{
        ImportError, ImportedMaterial, ImportedMesh, ImportedNode, ImportedScene, SceneImporter,
    },
};

/// A headless device, once as itself for inspection and once behind the device seam.
pub fn headless() -> (Arc<HeadlessDevice>, Arc<dyn GpuDevice>) {
    let headless = Arc::new(HeadlessDevice::new());
    let device: Arc<dyn GpuDevice> = headless.clone();
    (headless, device)
}

/// `count` separate triangles. Triangle `i` lies in the plane z = `z_offset + i` and has
/// the non-unit normal (0, 0, 5).
pub fn triangle_mesh(name: &str, count: usize, z_offset: f32) -> ImportedMesh {
    let mut positions = Vec::new();
    let mut faces = Vec::new();
    for i in 0..count {
        let z = z_offset + i as f32;
        let first = positions.len() as u32;
        positions.extend([[0.0, 0.0, z], [1.0, 0.0, z], [0.0, 1.0, z]]);
        faces.push(vec![first, first + 1, first + 2]);
    }

    ImportedMesh {
        name: name.to_string(),
        normals: Some(vec![[0.0, 0.0, 5.0]; positions.len()]),
        positions,
        tex_coords: None,
        faces,
        material: 0,
    }
}

/// A root node with one child node per mesh.
pub fn flat_scene(meshes: Vec<ImportedMesh>) -> ImportedScene {
    let mut nodes = vec![ImportedNode {
        name: "root".to_string(),
        meshes: Vec::new(),
        children: (1..=meshes.len()).collect(),
    }];
    nodes.extend(meshes.iter().enumerate().map(|(index, mesh)| ImportedNode {
        name: mesh.name.clone(),
        meshes: vec![index],
        children: Vec::new(),
    }));

    ImportedScene {
        root: 0,
        nodes,
        meshes,
        materials: vec![ImportedMaterial::missing_material()],
    }
}

/// Serves prepared scenes by path. Every other path fails to import.
#[derive(Default)]
pub struct FixtureImporter {
    scenes: HashMap<PathBuf, ImportedScene>,
}

impl FixtureImporter {
    pub fn with(mut self, path: &str, scene: ImportedScene) -> Self {
        self.scenes.insert(PathBuf::from(path), scene);
        self
    }
}

impl SceneImporter for FixtureImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, ImportError> {
        self.scenes
            .get(path)
            .cloned()
            .ok_or_else(|| ImportError::IncompleteScene(format!("no fixture for {}", path.display())))
    }
}
