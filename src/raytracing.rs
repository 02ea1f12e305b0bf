//! Geometry for the ray tracing shader: every triangle of the active model flattened into
//! one storage buffer.

mod catalog;
mod primitive_store;
mod triangle_buffer;

pub use catalog::*;
pub use primitive_store::*;
pub use triangle_buffer::*;
