pub mod config_loader;
pub mod gpu;
pub mod loader;
pub mod raytracing;
pub mod scene;
pub mod vulkan;
