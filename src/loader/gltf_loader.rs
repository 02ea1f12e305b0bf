use std::{collections::HashMap, path::Path, path::PathBuf, sync::Arc};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use gltf::{image::Source, mesh::Mode};

use super::{
    asset_directory, ImportError, ImportOptions, ImportedMaterial, ImportedMesh, ImportedNode,
    ImportedScene, SceneImporter, TextureKind, TextureSource,
};

/// Imports glTF 2.0 files (`.gltf` and `.glb`).
///
/// The default scene becomes the children of a synthesized root node. Every glTF node is
/// kept as one node, and every primitive of a glTF mesh becomes one imported mesh.
/// Node transforms are ignored.
#[derive(Debug, Clone, Default)]
pub struct GltfLoader {
    options: ImportOptions,
}

struct SceneLoadingData<'a> {
    scene: ImportedScene,
    asset_path: String,
    base_directory: PathBuf,
    buffers: &'a [gltf::buffer::Data],
    /// glTF mesh index -> imported meshes, one per primitive
    mesh_primitives: Vec<Vec<usize>>,
    image_sources: HashMap<usize, TextureSource>,
}

impl GltfLoader {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }
}

impl SceneImporter for GltfLoader {
    fn import(&self, path: &Path) -> Result<ImportedScene, ImportError> {
        let gltf::Gltf { document, blob } = gltf::Gltf::open(path)?;
        let buffers = gltf::import_buffers(&document, Some(asset_directory(path).as_path()), blob)?;

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or(ImportError::MissingRootNode)?;

        let mut loading_data = SceneLoadingData {
            scene: ImportedScene::default(),
            asset_path: path.to_string_lossy().into_owned(),
            base_directory: asset_directory(path),
            buffers: &buffers,
            mesh_primitives: Vec::new(),
            image_sources: HashMap::new(),
        };

        self.load_materials(&mut loading_data, &document);
        self.load_meshes(&mut loading_data, &document);

        // Node 0 is the synthesized root, glTF node i is stored at i + 1
        let root = ImportedNode {
            name: scene.name().unwrap_or("root").to_string(),
            meshes: Vec::new(),
            children: scene.nodes().map(|node| node.index() + 1).collect(),
        };
        loading_data.scene.nodes.push(root);
        for node in document.nodes() {
            let meshes = node
                .mesh()
                .map(|mesh| loading_data.mesh_primitives[mesh.index()].clone())
                .unwrap_or_default();
            loading_data.scene.nodes.push(ImportedNode {
                name: node.name().unwrap_or_default().to_string(),
                meshes,
                children: node.children().map(|child| child.index() + 1).collect(),
            });
        }

        log::debug!(
            "Imported {}: {} nodes, {} meshes, {} materials",
            loading_data.asset_path,
            loading_data.scene.nodes.len(),
            loading_data.scene.meshes.len(),
            loading_data.scene.materials.len()
        );

        loading_data.scene.finish(&self.options)
    }
}

impl GltfLoader {
    fn load_materials(&self, loading_data: &mut SceneLoadingData, document: &gltf::Document) {
        // Material 0 is used by primitives without a material, glTF material i is stored at i + 1
        loading_data
            .scene
            .materials
            .push(ImportedMaterial::missing_material());

        for material in document.materials() {
            let mut loaded = ImportedMaterial {
                name: material.name().unwrap_or_default().to_string(),
                ..Default::default()
            };

            let specular_glossiness = material.pbr_specular_glossiness();
            let diffuse = material
                .pbr_metallic_roughness()
                .base_color_texture()
                .or_else(|| {
                    specular_glossiness
                        .as_ref()
                        .and_then(|spec_gloss| spec_gloss.diffuse_texture())
                });
            if let Some(info) = diffuse {
                let source = self.load_image(loading_data, info.texture().source());
                loaded.textures_mut(TextureKind::Diffuse).push(source);
            }

            if let Some(info) = specular_glossiness
                .as_ref()
                .and_then(|spec_gloss| spec_gloss.specular_glossiness_texture())
            {
                let source = self.load_image(loading_data, info.texture().source());
                loaded.textures_mut(TextureKind::Specular).push(source);
            }

            if let Some(normal) = material.normal_texture() {
                let source = self.load_image(loading_data, normal.texture().source());
                loaded.textures_mut(TextureKind::Normal).push(source);
            }

            loading_data.scene.materials.push(loaded);
        }
    }

    fn load_image(
        &self,
        loading_data: &mut SceneLoadingData,
        image: gltf::Image<'_>,
    ) -> TextureSource {
        let index = image.index();
        if let Some(source) = loading_data.image_sources.get(&index) {
            return source.clone();
        }

        let source = match image.source() {
            Source::Uri { uri, .. } if uri.starts_with("data:") => {
                let bytes = decode_data_uri(uri).unwrap_or_else(|| {
                    log::warn!(
                        "{}: image {} has a data URI that is not base64 encoded",
                        loading_data.asset_path,
                        index
                    );
                    Vec::new()
                });
                TextureSource::embedded(
                    format!("{}#image{}", loading_data.asset_path, index),
                    Arc::from(bytes),
                )
            }
            Source::Uri { uri, .. } => TextureSource::file(
                loading_data
                    .base_directory
                    .join(uri)
                    .to_string_lossy()
                    .into_owned(),
            ),
            Source::View { view, .. } => {
                let start = view.offset();
                let end = start + view.length();
                let bytes = loading_data
                    .buffers
                    .get(view.buffer().index())
                    .and_then(|buffer| buffer.0.get(start..end))
                    .unwrap_or_default();
                TextureSource::embedded(
                    format!("{}#image{}", loading_data.asset_path, index),
                    Arc::from(bytes),
                )
            }
        };

        loading_data.image_sources.insert(index, source.clone());
        source
    }

    fn load_meshes(&self, loading_data: &mut SceneLoadingData, document: &gltf::Document) {
        for mesh in document.meshes() {
            let mut primitives = Vec::new();
            let primitive_count = mesh.primitives().count();
            let mesh_name = mesh.name().unwrap_or_default();

            for primitive in mesh.primitives() {
                let name = if primitive_count > 1 {
                    format!("{}-{}", mesh_name, primitive.index())
                } else {
                    mesh_name.to_string()
                };

                if let Some(loaded) = self.load_primitive(loading_data, &primitive, name) {
                    primitives.push(loading_data.scene.meshes.len());
                    loading_data.scene.meshes.push(loaded);
                }
            }

            loading_data.mesh_primitives.push(primitives);
        }
    }

    fn load_primitive(
        &self,
        loading_data: &SceneLoadingData,
        primitive: &gltf::Primitive<'_>,
        name: String,
    ) -> Option<ImportedMesh> {
        let buffers = loading_data.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));

        let Some(positions) = reader.read_positions() else {
            log::warn!(
                "{}: primitive '{}' has no positions, skipping it",
                loading_data.asset_path,
                name
            );
            return None;
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        let normals = reader.read_normals().map(|normals| normals.collect());
        let tex_coords = reader
            .read_tex_coords(0)
            .map(|tex_coords| tex_coords.into_f32().collect());
        let indices: Vec<u32> = reader
            .read_indices()
            .map(|indices| indices.into_u32().collect())
            .unwrap_or_else(|| (0..(positions.len() as u32)).collect());

        let faces = match primitive.mode() {
            Mode::Triangles => indices.chunks_exact(3).map(<[u32]>::to_vec).collect(),
            Mode::TriangleStrip => triangulate_strip(&indices),
            Mode::TriangleFan => triangulate_fan(&indices),
            mode => {
                log::warn!(
                    "{}: primitive '{}' uses {:?}, only triangles are imported",
                    loading_data.asset_path,
                    name,
                    mode
                );
                return None;
            }
        };

        Some(ImportedMesh {
            name,
            positions,
            normals,
            tex_coords,
            faces,
            material: primitive.material().index().map_or(0, |index| index + 1),
        })
    }
}

/// The payload of a `data:[<media type>];base64,<data>` URI.
fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let (header, data) = uri.strip_prefix("data:")?.split_once(',')?;
    if !header.ends_with(";base64") {
        return None;
    }
    BASE64.decode(data).ok()
}

/// Keeps the winding of every triangle consistent with the first one.
fn triangulate_strip(indices: &[u32]) -> Vec<Vec<u32>> {
    (0..indices.len().saturating_sub(2))
        .map(|i| {
            if i % 2 == 0 {
                vec![indices[i], indices[i + 1], indices[i + 2]]
            } else {
                vec![indices[i], indices[i + 2], indices[i + 1]]
            }
        })
        .collect()
}

fn triangulate_fan(indices: &[u32]) -> Vec<Vec<u32>> {
    (1..indices.len().saturating_sub(1))
        .map(|i| vec![indices[i], indices[i + 1], indices[0]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_alternate_winding() {
        let faces = triangulate_strip(&[0, 1, 2, 3, 4]);
        assert_eq!(faces, vec![vec![0, 1, 2], vec![1, 3, 2], vec![2, 3, 4]]);
        assert!(triangulate_strip(&[0, 1]).is_empty());
    }

    #[test]
    fn fans_share_the_first_vertex() {
        let faces = triangulate_fan(&[0, 1, 2, 3]);
        assert_eq!(faces, vec![vec![1, 2, 0], vec![2, 3, 0]]);
        assert!(triangulate_fan(&[0]).is_empty());
    }

    #[test]
    fn imports_a_minimal_gltf() {
        let directory = tempfile::tempdir().unwrap();

        // One triangle with positions only, referenced by two nodes
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let bytes: &[u8] = bytemuck::cast_slice(&positions[..]);
        let gltf_json = format!(
            r#"{{
                "asset": {{ "version": "2.0" }},
                "scene": 0,
                "scenes": [{{ "nodes": [0] }}],
                "nodes": [
                    {{ "name": "parent", "children": [1], "mesh": 0 }},
                    {{ "name": "child", "mesh": 0 }}
                ],
                "meshes": [{{ "name": "tri", "primitives": [{{ "attributes": {{ "POSITION": 0 }} }}] }}],
                "accessors": [{{
                    "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                    "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
                }}],
                "bufferViews": [{{ "buffer": 0, "byteLength": 36 }}],
                "buffers": [{{ "byteLength": 36, "uri": "triangle.bin" }}]
            }}"#
        );
        std::fs::write(directory.path().join("triangle.bin"), bytes).unwrap();
        let path = directory.path().join("triangle.gltf");
        std::fs::write(&path, gltf_json).unwrap();

        let scene = GltfLoader::default().import(&path).unwrap();

        assert_eq!(scene.nodes.len(), 3);
        assert_eq!(scene.nodes[scene.root].children, vec![1]);
        assert_eq!(scene.nodes[1].meshes, vec![0]);
        assert_eq!(scene.nodes[1].children, vec![2]);
        assert_eq!(scene.nodes[2].meshes, vec![0]);
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.meshes[0].faces, vec![vec![0, 1, 2]]);
        assert_eq!(scene.meshes[0].material, 0);
        assert!(scene.meshes[0].tex_coords.is_none());
        // generated because the file has none
        assert!(scene.meshes[0].normals.is_some());
    }

    #[test]
    fn data_uris_must_be_base64() {
        assert_eq!(
            decode_data_uri("data:application/octet-stream;base64,AQID"),
            Some(vec![1, 2, 3])
        );
        assert_eq!(decode_data_uri("data:text/plain,hello"), None);
        assert_eq!(decode_data_uri("data:image/png;base64,%%%"), None);
    }

    #[test]
    fn data_uri_images_are_embedded() {
        let directory = tempfile::tempdir().unwrap();

        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image::RgbaImage::new(2, 2))
            .write_to(
                &mut std::io::Cursor::new(&mut png),
                image::ImageOutputFormat::Png,
            )
            .unwrap();

        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let gltf_json = format!(
            r#"{{
                "asset": {{ "version": "2.0" }},
                "scenes": [{{ "nodes": [0] }}],
                "nodes": [{{ "mesh": 0 }}],
                "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "material": 0 }}] }}],
                "materials": [{{ "pbrMetallicRoughness": {{ "baseColorTexture": {{ "index": 0 }} }} }}],
                "textures": [{{ "source": 0 }}],
                "images": [{{ "uri": "data:image/png;base64,{}" }}],
                "accessors": [{{
                    "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                    "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
                }}],
                "bufferViews": [{{ "buffer": 0, "byteLength": 36 }}],
                "buffers": [{{ "byteLength": 36, "uri": "data:application/octet-stream;base64,{}" }}]
            }}"#,
            BASE64.encode(&png),
            BASE64.encode(bytemuck::cast_slice::<[f32; 3], u8>(&positions[..]))
        );
        let path = directory.path().join("textured.gltf");
        std::fs::write(&path, gltf_json).unwrap();

        let scene = GltfLoader::default().import(&path).unwrap();

        assert_eq!(scene.meshes[0].material, 1);
        let diffuse = &scene.materials[1].diffuse[0];
        assert!(diffuse.path.ends_with("#image0"));
        let embedded = diffuse.embedded.as_ref().unwrap();
        let decoded = image::load_from_memory(embedded).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (2, 2));
    }
}
