use std::path::{Path, PathBuf};

use super::{
    asset_directory, ImportError, ImportOptions, ImportedMaterial, ImportedMesh, ImportedNode,
    ImportedScene, SceneImporter, TextureKind, TextureSource,
};

/// Imports Wavefront OBJ files together with their MTL material libraries.
///
/// Every object in the file becomes one mesh, attached to its own child of the root node.
#[derive(Debug, Clone, Default)]
pub struct ObjLoader {
    options: ImportOptions,
}

impl ObjLoader {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }
}

impl SceneImporter for ObjLoader {
    fn import(&self, path: &Path) -> Result<ImportedScene, ImportError> {
        let load_options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (mut models, materials) = tobj::load_obj(path, &load_options)?;
        models.retain(|model| !model.mesh.indices.is_empty());
        if models.is_empty() {
            return Err(ImportError::IncompleteScene(format!(
                "{} contains no meshes",
                path.display()
            )));
        }

        let materials = materials.unwrap_or_else(|error| {
            log::warn!(
                "Could not load materials of {}: {}, using the default material",
                path.display(),
                error
            );
            Vec::new()
        });

        let base_directory = asset_directory(path);
        let mut scene = ImportedScene::default();
        scene.materials.push(ImportedMaterial::missing_material());
        scene.materials.extend(
            materials
                .iter()
                .map(|material| load_material(&base_directory, material)),
        );

        let mut root = ImportedNode {
            name: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..Default::default()
        };
        for model in models {
            let mesh = load_mesh(model, scene.materials.len());
            let node = ImportedNode {
                name: mesh.name.clone(),
                meshes: vec![scene.meshes.len()],
                children: Vec::new(),
            };
            scene.meshes.push(mesh);
            // Node 0 is reserved for the root
            root.children.push(scene.nodes.len() + 1);
            scene.nodes.push(node);
        }
        scene.nodes.insert(0, root);
        scene.root = 0;

        scene.finish(&self.options)
    }
}

fn load_material(base_directory: &Path, material: &tobj::Material) -> ImportedMaterial {
    let texture = |name: &str| {
        TextureSource::file(
            base_directory
                .join(PathBuf::from(name.trim()))
                .to_string_lossy()
                .into_owned(),
        )
    };

    let mut loaded = ImportedMaterial {
        name: material.name.clone(),
        ..Default::default()
    };
    let sources = [
        (TextureKind::Diffuse, material.diffuse_texture.as_deref()),
        (TextureKind::Specular, material.specular_texture.as_deref()),
        (
            TextureKind::Normal,
            material.unknown_param.get("norm").map(String::as_str),
        ),
        // tobj reads `map_Bump` and `bump` into the normal texture slot
        (TextureKind::Bump, material.normal_texture.as_deref()),
    ];
    for (kind, name) in sources {
        if let Some(name) = name.filter(|name| !name.trim().is_empty()) {
            loaded.textures_mut(kind).push(texture(name));
        }
    }
    loaded
}

fn load_mesh(model: tobj::Model, material_count: usize) -> ImportedMesh {
    let mesh = model.mesh;

    let positions: Vec<[f32; 3]> = mesh
        .positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    let normals = (!mesh.normals.is_empty()).then(|| {
        mesh.normals
            .chunks_exact(3)
            .map(|n| [n[0], n[1], n[2]])
            .collect()
    });
    let tex_coords = (!mesh.texcoords.is_empty()).then(|| {
        mesh.texcoords
            .chunks_exact(2)
            .map(|uv| [uv[0], uv[1]])
            .collect()
    });
    let faces = mesh
        .indices
        .chunks_exact(3)
        .map(<[u32]>::to_vec)
        .collect();

    let material = match mesh.material_id {
        Some(id) if id + 1 < material_count => id + 1,
        Some(id) => {
            log::warn!(
                "Mesh '{}' uses unknown material {}, using the default material",
                model.name,
                id
            );
            0
        }
        None => 0,
    };

    ImportedMesh {
        name: model.name,
        positions,
        normals,
        tex_coords,
        faces,
        material,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
mtllib quad.mtl
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
usemtl brick
f 1/1 2/2 3/3 4/4
o triangle
v 0 0 1
v 1 0 1
v 0 1 1
f 5 6 7
";

    const MATERIALS: &str = "\
newmtl brick
map_Kd brick.png
map_Ks brick_specular.png
norm brick_normal.png
map_Bump brick_bump.png
";

    #[test]
    fn imports_objects_as_children_of_the_root() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("quad.obj");
        std::fs::write(&path, QUAD).unwrap();
        std::fs::write(directory.path().join("quad.mtl"), MATERIALS).unwrap();

        let scene = ObjLoader::default().import(&path).unwrap();

        assert_eq!(scene.nodes[scene.root].children, vec![1, 2]);
        assert_eq!(scene.meshes.len(), 2);
        assert_eq!(scene.meshes[0].name, "quad");
        assert_eq!(scene.meshes[0].faces.len(), 2);
        assert_eq!(scene.meshes[0].material, 1);
        assert!(scene.meshes[0].tex_coords.is_some());
        assert_eq!(scene.meshes[1].faces.len(), 1);
        assert!(scene.meshes[1].tex_coords.is_none());

        let brick = &scene.materials[1];
        let expected = |name: &str| directory.path().join(name).to_string_lossy().into_owned();
        assert_eq!(brick.diffuse[0].path, expected("brick.png"));
        assert_eq!(brick.specular[0].path, expected("brick_specular.png"));
        assert_eq!(brick.normal[0].path, expected("brick_normal.png"));
        assert_eq!(brick.bump[0].path, expected("brick_bump.png"));
    }

    #[test]
    fn missing_material_libraries_fall_back_to_the_default_material() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("quad.obj");
        std::fs::write(&path, QUAD).unwrap();

        let scene = ObjLoader::default().import(&path).unwrap();
        assert_eq!(scene.materials.len(), 1);
        assert!(scene.meshes.iter().all(|mesh| mesh.material == 0));
    }

    #[test]
    fn files_without_faces_are_incomplete() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("empty.obj");
        std::fs::write(&path, "# nothing here\n").unwrap();

        assert!(matches!(
            ObjLoader::default().import(&path),
            Err(ImportError::IncompleteScene(_))
        ));
    }

    #[test]
    fn objects_without_faces_are_dropped() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("points.obj");
        let obj = "\
o points
v 0 0 0
v 1 0 0
v 0 1 0
o triangle
v 0 0 1
v 1 0 1
v 0 1 1
f 4 5 6
";
        std::fs::write(&path, obj).unwrap();

        let scene = ObjLoader::default().import(&path).unwrap();
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.meshes[0].name, "triangle");
        assert_eq!(scene.meshes[0].faces.len(), 1);
        assert_eq!(scene.nodes[scene.root].children, vec![1]);
    }
}
