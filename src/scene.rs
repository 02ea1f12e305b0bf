//! Renderable scenes: meshes with their GPU buffers and textures, grouped into models.

mod mesh;
mod model;
mod texture;
mod vertex;

pub use mesh::*;
pub use model::*;
pub use texture::*;
pub use vertex::*;
