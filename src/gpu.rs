//! The device seam every GPU allocation goes through.
//!
//! Resources are identified by opaque handles. [`GpuBuffer`] and [`GpuTexture`] own a handle
//! together with the device that created it and give it back when dropped.

mod headless;

pub use headless::*;

use std::{fmt, ops::BitOr, sync::Arc};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Out of GPU memory while allocating {0} bytes")]
    OutOfMemory(u64),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Device error: {0}")]
    Device(String),
}

pub type GpuResult<T> = Result<T, GpuError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

impl BufferHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Handle to a GPU texture (image, view and sampler)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

impl TextureHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Storage,
}

/// How often the contents of a buffer are expected to be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateFrequency {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDescriptor<'a> {
    pub label: &'a str,
    pub usage: BufferUsage,
    pub frequency: UpdateFrequency,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Single channel. Shaders see it as (r, r, r, 1).
    R8,
    Rgb8,
    Rgba8,
}

impl TextureFormat {
    pub fn channel_count(&self) -> usize {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Rgb8 => 3,
            TextureFormat::Rgba8 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerInfo {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    /// `None` means the texture has a single mip level.
    pub mipmap_mode: Option<MipmapMode>,
    pub address_mode: [AddressMode; 3],
}

impl SamplerInfo {
    pub fn uses_mipmaps(&self) -> bool {
        self.mipmap_mode.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MipmapMode {
    Nearest,
    Linear,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub sampler: SamplerInfo,
}

impl TextureDescriptor {
    pub fn mip_levels(&self) -> u32 {
        if self.sampler.uses_mipmaps() {
            max_mip_levels(self.width, self.height)
        } else {
            1
        }
    }

    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.channel_count() as u64
    }
}

/// The number of levels in a complete mipmap chain is
/// ⌊log2(max(width, height))⌋ + 1
pub fn max_mip_levels(width: u32, height: u32) -> u32 {
    32 - [width, height, 1].into_iter().fold(0, BitOr::bitor).leading_zeros()
}

pub trait GpuDevice {
    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor<'_>,
        contents: &[u8],
    ) -> GpuResult<BufferHandle>;

    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Makes `buffer` the storage buffer that shaders read at `binding`.
    fn bind_storage_buffer(&self, binding: u32, buffer: BufferHandle);

    /// `pixels` are tightly packed rows in `descriptor.format`.
    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        pixels: &[u8],
    ) -> GpuResult<TextureHandle>;

    /// A valid texture handle without meaningful contents.
    fn create_placeholder_texture(&self, label: &str) -> GpuResult<TextureHandle>;

    fn destroy_texture(&self, texture: TextureHandle);
}

pub struct GpuBuffer {
    handle: BufferHandle,
    size: u64,
    device: Arc<dyn GpuDevice>,
}

impl GpuBuffer {
    pub fn new(
        device: &Arc<dyn GpuDevice>,
        descriptor: &BufferDescriptor<'_>,
        contents: &[u8],
    ) -> GpuResult<Self> {
        let handle = device.create_buffer(descriptor, contents)?;
        Ok(Self {
            handle,
            size: contents.len() as u64,
            device: device.clone(),
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.handle);
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .finish()
    }
}

pub struct GpuTexture {
    handle: TextureHandle,
    populated: bool,
    device: Arc<dyn GpuDevice>,
}

impl GpuTexture {
    pub fn new(
        device: &Arc<dyn GpuDevice>,
        descriptor: &TextureDescriptor,
        pixels: &[u8],
    ) -> GpuResult<Self> {
        let handle = device.create_texture(descriptor, pixels)?;
        Ok(Self {
            handle,
            populated: true,
            device: device.clone(),
        })
    }

    pub fn placeholder(device: &Arc<dyn GpuDevice>, label: &str) -> GpuResult<Self> {
        let handle = device.create_placeholder_texture(label)?;
        Ok(Self {
            handle,
            populated: false,
            device: device.clone(),
        })
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    /// False for placeholders created after a failed image load.
    pub fn is_populated(&self) -> bool {
        self.populated
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.device.destroy_texture(self.handle);
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("handle", &self.handle)
            .field("populated", &self.populated)
            .finish()
    }
}
