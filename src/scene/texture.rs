use std::{collections::HashMap, fmt, sync::Arc};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::{
    gpu::{
        AddressMode, Filter, GpuDevice, GpuResult, GpuTexture, MipmapMode, SamplerInfo,
        TextureDescriptor, TextureFormat, TextureHandle,
    },
    loader::{TextureKind, TextureSource},
};

/// Minification filter used for every texture of a model.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Nearest,
    Linear,
    NearestMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapNearest,
    #[default]
    LinearMipmapLinear,
    /// Falls back to linear filtering without mipmaps.
    Unspecified,
}

impl FilterMode {
    pub fn sampler_info(&self) -> SamplerInfo {
        let (min_filter, mipmap_mode) = match self {
            FilterMode::Nearest => (Filter::Nearest, None),
            FilterMode::Linear => (Filter::Linear, None),
            FilterMode::NearestMipmapNearest => (Filter::Nearest, Some(MipmapMode::Nearest)),
            FilterMode::NearestMipmapLinear => (Filter::Nearest, Some(MipmapMode::Linear)),
            FilterMode::LinearMipmapNearest => (Filter::Linear, Some(MipmapMode::Nearest)),
            FilterMode::LinearMipmapLinear => (Filter::Linear, Some(MipmapMode::Linear)),
            FilterMode::Unspecified => (Filter::Linear, None),
        };

        SamplerInfo {
            min_filter,
            mag_filter: Filter::Linear,
            mipmap_mode,
            address_mode: [AddressMode::Repeat; 3],
        }
    }
}

/// A texture referenced by a mesh.
///
/// Clones share the GPU texture, which is destroyed once the last clone is gone.
#[derive(Clone)]
pub struct Texture {
    pub kind: TextureKind,
    pub path: String,
    gpu_texture: Arc<GpuTexture>,
}

impl Texture {
    pub fn handle(&self) -> TextureHandle {
        self.gpu_texture.handle()
    }

    /// False if the image could not be loaded and a placeholder is bound instead.
    pub fn is_populated(&self) -> bool {
        self.gpu_texture.is_populated()
    }

    pub fn shares_gpu_texture(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.gpu_texture, &other.gpu_texture)
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("handle", &self.handle())
            .finish()
    }
}

/// Makes sure every texture path is decoded and uploaded only once.
///
/// The key is the path string exactly as the importer reported it, so two different
/// spellings of the same file are loaded twice. A hit returns the record stored by the
/// first load, including its kind.
pub struct TextureCache {
    device: Arc<dyn GpuDevice>,
    sampler: SamplerInfo,
    textures: HashMap<String, Texture>,
}

impl TextureCache {
    pub fn new(device: Arc<dyn GpuDevice>, filter: FilterMode) -> Self {
        Self {
            device,
            sampler: filter.sampler_info(),
            textures: HashMap::new(),
        }
    }

    /// Returns the cached texture for `source.path`, loading it as `kind` on first use.
    ///
    /// Images that cannot be decoded become placeholder textures, only GPU failures are
    /// returned as errors.
    pub fn resolve(&mut self, kind: TextureKind, source: &TextureSource) -> GpuResult<Texture> {
        if let Some(texture) = self.textures.get(&source.path) {
            if texture.kind != kind {
                log::debug!(
                    "Texture {} is reused as {:?}, it keeps kind {:?}",
                    source.path,
                    kind,
                    texture.kind
                );
            }
            return Ok(texture.clone());
        }

        let texture = Texture {
            kind,
            path: source.path.clone(),
            gpu_texture: Arc::new(self.load(source)?),
        };
        self.textures.insert(source.path.clone(), texture.clone());
        Ok(texture)
    }

    fn load(&self, source: &TextureSource) -> GpuResult<GpuTexture> {
        let image = match &source.embedded {
            Some(bytes) => image::load_from_memory(bytes),
            None => image::open(&source.path),
        };

        let image = match image {
            Ok(image) if image.width() > 0 && image.height() > 0 => image,
            Ok(_) => {
                log::warn!("Texture {} is empty", source.path);
                return GpuTexture::placeholder(&self.device, &source.path);
            }
            Err(error) => {
                log::warn!("Failed to load texture {}: {}", source.path, error);
                return GpuTexture::placeholder(&self.device, &source.path);
            }
        };

        let (width, height) = (image.width(), image.height());
        let (format, pixels) = texture_pixels(image);
        let descriptor = TextureDescriptor {
            label: source.path.clone(),
            width,
            height,
            format,
            sampler: self.sampler,
        };
        log::debug!(
            "Uploading texture {} ({}x{}, {:?}, {} mip levels)",
            source.path,
            width,
            height,
            format,
            descriptor.mip_levels()
        );

        GpuTexture::new(&self.device, &descriptor, &pixels)
    }

    /// Number of distinct paths that were loaded.
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.textures.contains_key(path)
    }

    pub fn sampler(&self) -> SamplerInfo {
        self.sampler
    }
}

impl fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureCache")
            .field("sampler", &self.sampler)
            .field("textures", &self.textures.len())
            .finish()
    }
}

/// Picks the texture format from the channel count of the decoded image.
fn texture_pixels(image: DynamicImage) -> (TextureFormat, Vec<u8>) {
    match image.color().channel_count() {
        1 => (TextureFormat::R8, image.into_luma8().into_raw()),
        4 => (TextureFormat::Rgba8, image.into_rgba8().into_raw()),
        _ => (TextureFormat::Rgb8, image.into_rgb8().into_raw()),
    }
}
