use bytemuck::{Pod, Zeroable};
use ultraviolet::{Vec3, Vec4};

use crate::scene::{Mesh, Model};

/// One triangle as the shader reads it, std430 compatible.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuTriangle {
    /// w = 1
    pub positions: [Vec4; 3],
    /// Unit length or zero, w = 0
    pub normals: [Vec4; 3],
}

impl GpuTriangle {
    pub const SIZE: usize = std::mem::size_of::<GpuTriangle>();
}

/// The triangles of a model in mesh order, then index order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleBuffer {
    triangles: Vec<GpuTriangle>,
}

impl TriangleBuffer {
    pub fn rebuild(model: &Model) -> Self {
        let mut triangles = Vec::with_capacity(model.triangle_count());
        for mesh in model.meshes() {
            push_mesh(&mut triangles, mesh);
        }
        Self { triangles }
    }

    pub fn records(&self) -> &[GpuTriangle] {
        &self.triangles
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.triangles)
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Free function form of [`TriangleBuffer::rebuild`].
pub fn rebuild_triangle_buffer(model: &Model) -> TriangleBuffer {
    TriangleBuffer::rebuild(model)
}

fn push_mesh(triangles: &mut Vec<GpuTriangle>, mesh: &Mesh) {
    for triangle in mesh.indices.chunks_exact(3) {
        let vertices =
            [triangle[0], triangle[1], triangle[2]].map(|index| mesh.vertices[index as usize]);
        triangles.push(GpuTriangle {
            positions: vertices.map(|vertex| vertex.position.into_homogeneous_point()),
            normals: vertices
                .map(|vertex| normalized_or_zero(vertex.normal).into_homogeneous_vector()),
        });
    }
}

fn normalized_or_zero(normal: Vec3) -> Vec3 {
    let length = normal.mag();
    if length > 0.0 && length.is_finite() {
        normal / length
    } else {
        Vec3::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_96_bytes() {
        assert_eq!(GpuTriangle::SIZE, 96);
        assert_eq!(std::mem::align_of::<GpuTriangle>(), 4);
    }

    #[test]
    fn zero_normals_stay_zero() {
        assert_eq!(normalized_or_zero(Vec3::zero()), Vec3::zero());
        let normal = normalized_or_zero(Vec3::new(0.0, 3.0, 4.0));
        assert!((normal.mag() - 1.0).abs() < 1e-6);
        assert_eq!(normalized_or_zero(Vec3::new(f32::NAN, 0.0, 0.0)), Vec3::zero());
    }
}
