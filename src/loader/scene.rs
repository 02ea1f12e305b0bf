use std::sync::Arc;

use super::{smooth_normals, ImportError, ImportOptions};

/// A scene as reported by an importer, before anything is uploaded.
///
/// Nodes live in an arena and refer to each other by index.
#[derive(Clone, Debug, Default)]
pub struct ImportedScene {
    pub root: usize,
    pub nodes: Vec<ImportedNode>,
    pub meshes: Vec<ImportedMesh>,
    pub materials: Vec<ImportedMaterial>,
}

#[derive(Clone, Debug, Default)]
pub struct ImportedNode {
    pub name: String,
    /// Indices into [`ImportedScene::meshes`].
    pub meshes: Vec<usize>,
    /// Indices into [`ImportedScene::nodes`].
    pub children: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct ImportedMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    /// The first texture coordinate channel.
    pub tex_coords: Option<Vec<[f32; 2]>>,
    /// Vertex indices per face. Importers triangulate, so every face has three.
    pub faces: Vec<Vec<u32>>,
    /// Index into [`ImportedScene::materials`].
    pub material: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Diffuse,
    Specular,
    Normal,
    Bump,
}

impl TextureKind {
    /// The order in which a mesh lists its textures.
    pub const ALL: [TextureKind; 4] = [
        TextureKind::Diffuse,
        TextureKind::Specular,
        TextureKind::Normal,
        TextureKind::Bump,
    ];

    /// Name of the shader sampler that a texture of this kind is bound to.
    pub fn sampler_name(&self) -> &'static str {
        match self {
            TextureKind::Diffuse => "diffuseMap",
            TextureKind::Specular => "specularMap",
            TextureKind::Normal => "normalMap",
            TextureKind::Bump => "bumpMap",
        }
    }
}

/// Where the pixels of a texture come from.
///
/// `path` is the key the texture cache deduplicates on. Embedded images carry their
/// encoded bytes and use a synthesized path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureSource {
    pub path: String,
    pub embedded: Option<Arc<[u8]>>,
}

impl TextureSource {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            embedded: None,
        }
    }

    pub fn embedded(path: impl Into<String>, bytes: Arc<[u8]>) -> Self {
        Self {
            path: path.into(),
            embedded: Some(bytes),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ImportedMaterial {
    pub name: String,
    pub diffuse: Vec<TextureSource>,
    pub specular: Vec<TextureSource>,
    pub normal: Vec<TextureSource>,
    pub bump: Vec<TextureSource>,
}

impl ImportedMaterial {
    pub fn missing_material() -> Self {
        Self {
            name: "DefaultMaterial".to_string(),
            ..Default::default()
        }
    }

    pub fn textures(&self, kind: TextureKind) -> &[TextureSource] {
        match kind {
            TextureKind::Diffuse => &self.diffuse,
            TextureKind::Specular => &self.specular,
            TextureKind::Normal => &self.normal,
            TextureKind::Bump => &self.bump,
        }
    }

    pub fn textures_mut(&mut self, kind: TextureKind) -> &mut Vec<TextureSource> {
        match kind {
            TextureKind::Diffuse => &mut self.diffuse,
            TextureKind::Specular => &mut self.specular,
            TextureKind::Normal => &mut self.normal,
            TextureKind::Bump => &mut self.bump,
        }
    }
}

impl ImportedScene {
    pub fn root_node(&self) -> Option<&ImportedNode> {
        self.nodes.get(self.root)
    }

    /// Checks the structure of the scene: the root exists, every index is in range and
    /// every node is reachable from the root exactly once.
    ///
    /// Face arity is not checked here.
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.root_node().is_none() {
            return Err(ImportError::MissingRootNode);
        }

        for mesh in &self.meshes {
            mesh.validate(self.materials.len())?;
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if visited[index] {
                return Err(ImportError::InvalidHierarchy(format!(
                    "node '{}' ({}) is reachable more than once",
                    node.name, index
                )));
            }
            visited[index] = true;

            if let Some(mesh) = node.meshes.iter().find(|&&mesh| mesh >= self.meshes.len()) {
                return Err(ImportError::InvalidHierarchy(format!(
                    "node '{}' references missing mesh {}",
                    node.name, mesh
                )));
            }

            for &child in &node.children {
                if child >= self.nodes.len() {
                    return Err(ImportError::InvalidHierarchy(format!(
                        "node '{}' references missing child {}",
                        node.name, child
                    )));
                }
                stack.push(child);
            }
        }

        Ok(())
    }

    /// Validates the scene and applies the import options to every mesh.
    pub(crate) fn finish(mut self, options: &ImportOptions) -> Result<Self, ImportError> {
        self.validate()?;

        for mesh in &mut self.meshes {
            if mesh.normals.is_none() && options.generate_smooth_normals {
                mesh.normals = Some(smooth_normals::generate(&mesh.positions, &mesh.faces));
            }

            if options.flip_uvs {
                if let Some(tex_coords) = &mut mesh.tex_coords {
                    for [_, v] in tex_coords.iter_mut() {
                        *v = 1.0 - *v;
                    }
                }
            }
        }

        Ok(self)
    }
}

impl ImportedMesh {
    fn validate(&self, material_count: usize) -> Result<(), ImportError> {
        if self.material >= material_count {
            return Err(ImportError::InvalidMesh {
                mesh: self.name.clone(),
                reason: format!("unknown material {}", self.material),
            });
        }
        self.validate_geometry()
    }

    /// Checks that every attribute has one entry per vertex and every index names a vertex.
    pub(crate) fn validate_geometry(&self) -> Result<(), ImportError> {
        let invalid = |reason: String| ImportError::InvalidMesh {
            mesh: self.name.clone(),
            reason,
        };

        let vertex_count = self.positions.len();
        if let Some(normals) = &self.normals {
            if normals.len() != vertex_count {
                return Err(invalid(format!(
                    "{} normals for {} vertices",
                    normals.len(),
                    vertex_count
                )));
            }
        }
        if let Some(tex_coords) = &self.tex_coords {
            if tex_coords.len() != vertex_count {
                return Err(invalid(format!(
                    "{} texture coordinates for {} vertices",
                    tex_coords.len(),
                    vertex_count
                )));
            }
        }
        if let Some(index) = self
            .faces
            .iter()
            .flatten()
            .find(|&&index| index as usize >= vertex_count)
        {
            return Err(invalid(format!(
                "index {} is out of range for {} vertices",
                index, vertex_count
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_mesh() -> ImportedMesh {
        ImportedMesh {
            name: "triangle".to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: None,
            tex_coords: Some(vec![[0.0, 0.25], [1.0, 0.0], [0.0, 1.0]]),
            faces: vec![vec![0, 1, 2]],
            material: 0,
        }
    }

    fn scene_with(nodes: Vec<ImportedNode>) -> ImportedScene {
        ImportedScene {
            root: 0,
            nodes,
            meshes: vec![triangle_mesh()],
            materials: vec![ImportedMaterial::missing_material()],
        }
    }

    fn node(meshes: Vec<usize>, children: Vec<usize>) -> ImportedNode {
        ImportedNode {
            name: "node".to_string(),
            meshes,
            children,
        }
    }

    #[test]
    fn empty_scene_has_no_root() {
        let scene = ImportedScene::default();
        assert!(matches!(scene.validate(), Err(ImportError::MissingRootNode)));
    }

    #[test]
    fn cycles_are_rejected() {
        let scene = scene_with(vec![node(vec![0], vec![1]), node(vec![], vec![0])]);
        assert!(matches!(
            scene.validate(),
            Err(ImportError::InvalidHierarchy(_))
        ));
    }

    #[test]
    fn shared_children_are_rejected() {
        let scene = scene_with(vec![
            node(vec![], vec![1, 2]),
            node(vec![], vec![3]),
            node(vec![], vec![3]),
            node(vec![0], vec![]),
        ]);
        assert!(scene.validate().is_err());
    }

    #[test]
    fn the_same_mesh_may_be_referenced_twice() {
        let scene = scene_with(vec![node(vec![0, 0], vec![1]), node(vec![0], vec![])]);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut scene = scene_with(vec![node(vec![0], vec![])]);
        scene.meshes[0].faces.push(vec![0, 1, 3]);
        assert!(matches!(
            scene.validate(),
            Err(ImportError::InvalidMesh { .. })
        ));

        let scene = scene_with(vec![node(vec![4], vec![])]);
        assert!(scene.validate().is_err());
    }

    #[test]
    fn finishing_generates_normals_and_flips_uvs() {
        let scene = scene_with(vec![node(vec![0], vec![])])
            .finish(&ImportOptions::default())
            .unwrap();

        let mesh = &scene.meshes[0];
        let normals = mesh.normals.as_ref().unwrap();
        assert_eq!(normals.len(), 3);
        for normal in normals {
            assert!((normal[2] - 1.0).abs() < 1e-6);
        }
        assert_eq!(mesh.tex_coords.as_ref().unwrap()[0], [0.0, 0.75]);
    }

    #[test]
    fn finishing_can_keep_meshes_untouched() {
        let options = ImportOptions {
            generate_smooth_normals: false,
            flip_uvs: false,
        };
        let scene = scene_with(vec![node(vec![0], vec![])])
            .finish(&options)
            .unwrap();

        assert!(scene.meshes[0].normals.is_none());
        assert_eq!(scene.meshes[0].tex_coords.as_ref().unwrap()[0], [0.0, 0.25]);
    }
}
