use std::sync::Arc;

use ultraviolet::{Vec2, Vec3};

use super::{Texture, TextureCache, Vertex};
use crate::{
    gpu::{
        BufferDescriptor, BufferUsage, GpuBuffer, GpuDevice, GpuResult, TextureHandle,
        UpdateFrequency,
    },
    loader::{ImportedMaterial, ImportedMesh, TextureKind},
};

/// An indexed triangle mesh together with its textures and GPU buffers.
#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
    pub textures: Vec<Texture>,
    vertex_buffer: Option<GpuBuffer>,
    index_buffer: Option<GpuBuffer>,
}

/// Which texture unit a shader sampler reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureBinding {
    pub unit: u32,
    pub sampler_name: &'static str,
    pub texture: TextureHandle,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// One binding per texture, in texture order.
    pub fn texture_bindings(&self) -> Vec<TextureBinding> {
        self.textures
            .iter()
            .enumerate()
            .map(|(unit, texture)| TextureBinding {
                unit: unit as u32,
                sampler_name: texture.kind.sampler_name(),
                texture: texture.handle(),
            })
            .collect()
    }

    /// `None` for meshes without vertices.
    pub fn vertex_buffer(&self) -> Option<&GpuBuffer> {
        self.vertex_buffer.as_ref()
    }

    /// `None` for meshes without triangles.
    pub fn index_buffer(&self) -> Option<&GpuBuffer> {
        self.index_buffer.as_ref()
    }
}

/// Turns imported meshes into [`Mesh`]es, loading textures through a [`TextureCache`].
pub struct MeshBuilder<'a> {
    device: &'a Arc<dyn GpuDevice>,
    texture_cache: &'a mut TextureCache,
}

impl<'a> MeshBuilder<'a> {
    pub fn new(device: &'a Arc<dyn GpuDevice>, texture_cache: &'a mut TextureCache) -> Self {
        Self {
            device,
            texture_cache,
        }
    }

    /// # Panics
    ///
    /// If a face of `mesh` is not a triangle, an index is out of range or an attribute
    /// does not have one entry per vertex. Importers only report validated meshes.
    pub fn build(&mut self, mesh: &ImportedMesh, material: &ImportedMaterial) -> GpuResult<Mesh> {
        if let Err(error) = mesh.validate_geometry() {
            panic!("{}", error);
        }
        let vertices = build_vertices(mesh);

        let mut indices = Vec::with_capacity(mesh.faces.len() * 3);
        for face in &mesh.faces {
            assert_eq!(
                face.len(),
                3,
                "mesh '{}' has a face with {} vertices, faces must be triangulated",
                mesh.name,
                face.len()
            );
            indices.extend_from_slice(face);
        }

        let mut textures = Vec::new();
        for kind in TextureKind::ALL {
            for source in material.textures(kind) {
                textures.push(self.texture_cache.resolve(kind, source)?);
            }
        }

        let vertex_buffer = self.upload(
            &format!("{} vertices", mesh.name),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&vertices),
        )?;
        let index_buffer = self.upload(
            &format!("{} indices", mesh.name),
            BufferUsage::Index,
            bytemuck::cast_slice(&indices),
        )?;

        log::debug!(
            "Built mesh '{}': {} vertices, {} triangles, {} textures",
            mesh.name,
            vertices.len(),
            indices.len() / 3,
            textures.len()
        );

        Ok(Mesh {
            name: mesh.name.clone(),
            vertices,
            indices,
            textures,
            vertex_buffer,
            index_buffer,
        })
    }

    fn upload(
        &self,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> GpuResult<Option<GpuBuffer>> {
        if contents.is_empty() {
            return Ok(None);
        }

        let descriptor = BufferDescriptor {
            label,
            usage,
            frequency: UpdateFrequency::Static,
        };
        GpuBuffer::new(self.device, &descriptor, contents).map(Some)
    }
}

/// Missing normals become zero vectors and missing texture coordinates become (0, 0).
fn build_vertices(mesh: &ImportedMesh) -> Vec<Vertex> {
    mesh.positions
        .iter()
        .enumerate()
        .map(|(i, &position)| Vertex {
            position: Vec3::from(position),
            normal: mesh
                .normals
                .as_ref()
                .map_or_else(Vec3::zero, |normals| Vec3::from(normals[i])),
            uv: mesh
                .tex_coords
                .as_ref()
                .map_or_else(Vec2::zero, |tex_coords| Vec2::from(tex_coords[i])),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gpu::HeadlessDevice, loader::TextureSource, scene::FilterMode};

    fn quad() -> ImportedMesh {
        ImportedMesh {
            name: "quad".to_string(),
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            normals: None,
            tex_coords: None,
            faces: vec![vec![0, 1, 2], vec![0, 2, 3]],
            material: 0,
        }
    }

    fn setup() -> (Arc<HeadlessDevice>, Arc<dyn GpuDevice>, TextureCache) {
        let headless = Arc::new(HeadlessDevice::new());
        let device: Arc<dyn GpuDevice> = headless.clone();
        let cache = TextureCache::new(device.clone(), FilterMode::Linear);
        (headless, device, cache)
    }

    #[test]
    fn missing_attributes_are_zeroed() {
        let (_, device, mut cache) = setup();
        let mesh = MeshBuilder::new(&device, &mut cache)
            .build(&quad(), &ImportedMaterial::missing_material())
            .unwrap();

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.triangle_count(), 2);
        for vertex in &mesh.vertices {
            assert_eq!(vertex.uv, Vec2::zero());
            assert_eq!(vertex.normal, Vec3::zero());
        }
        assert!(mesh.textures.is_empty());
    }

    #[test]
    fn buffers_hold_the_mesh_data() {
        let (headless, device, mut cache) = setup();
        let mesh = MeshBuilder::new(&device, &mut cache)
            .build(&quad(), &ImportedMaterial::missing_material())
            .unwrap();

        let indices = headless
            .buffer(mesh.index_buffer().unwrap().handle())
            .unwrap();
        assert_eq!(indices.usage, BufferUsage::Index);
        assert_eq!(indices.frequency, UpdateFrequency::Static);
        assert_eq!(indices.contents, bytemuck::cast_slice::<u32, u8>(&mesh.indices));

        let vertices = headless
            .buffer(mesh.vertex_buffer().unwrap().handle())
            .unwrap();
        assert_eq!(vertices.contents.len(), 4 * std::mem::size_of::<Vertex>());

        drop(mesh);
        assert_eq!(headless.live_buffer_count(), 0);
    }

    #[test]
    fn textures_are_bound_in_kind_order() {
        let (_, device, mut cache) = setup();
        let material = ImportedMaterial {
            name: "brick".to_string(),
            diffuse: vec![TextureSource::file("a.png"), TextureSource::file("b.png")],
            specular: vec![],
            normal: vec![TextureSource::file("n.png")],
            bump: vec![TextureSource::file("a.png")],
        };
        let mesh = MeshBuilder::new(&device, &mut cache)
            .build(&quad(), &material)
            .unwrap();

        let names: Vec<_> = mesh
            .texture_bindings()
            .iter()
            .map(|binding| (binding.unit, binding.sampler_name))
            .collect();
        assert_eq!(
            names,
            vec![
                (0, "diffuseMap"),
                (1, "diffuseMap"),
                (2, "normalMap"),
                // a.png was first loaded as a diffuse texture
                (3, "diffuseMap")
            ]
        );
        assert!(mesh.textures[0].shares_gpu_texture(&mesh.textures[3]));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    #[should_panic(expected = "faces must be triangulated")]
    fn non_triangle_faces_are_rejected() {
        let (_, device, mut cache) = setup();
        let mut mesh = quad();
        mesh.faces = vec![vec![0, 1, 2, 3]];
        let _ = MeshBuilder::new(&device, &mut cache)
            .build(&mesh, &ImportedMaterial::missing_material());
    }

    #[test]
    #[should_panic(expected = "index 7 is out of range for 4 vertices")]
    fn out_of_range_indices_are_rejected() {
        let (_, device, mut cache) = setup();
        let mut mesh = quad();
        mesh.faces = vec![vec![0, 1, 7]];
        let _ = MeshBuilder::new(&device, &mut cache)
            .build(&mesh, &ImportedMaterial::missing_material());
    }

    #[test]
    #[should_panic(expected = "2 normals for 4 vertices")]
    fn attributes_need_one_entry_per_vertex() {
        let (_, device, mut cache) = setup();
        let mut mesh = quad();
        mesh.normals = Some(vec![[0.0, 0.0, 1.0]; 2]);
        let _ = MeshBuilder::new(&device, &mut cache)
            .build(&mesh, &ImportedMaterial::missing_material());
    }

    #[test]
    fn meshes_without_faces_have_no_index_buffer() {
        let (headless, device, mut cache) = setup();
        let mut mesh = quad();
        mesh.faces.clear();
        let mesh = MeshBuilder::new(&device, &mut cache)
            .build(&mesh, &ImportedMaterial::missing_material())
            .unwrap();

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangle_count(), 0);
        assert!(mesh.index_buffer().is_none());
        assert!(mesh.vertex_buffer().is_some());
        assert_eq!(headless.live_buffer_count(), 1);
    }
}
