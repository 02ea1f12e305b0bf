use bytemuck::{Pod, Zeroable};
use ultraviolet::{Vec2, Vec3};

#[derive(Clone, Debug, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}
