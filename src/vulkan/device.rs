use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use ash::vk;
use gpu_allocator::{
    vulkan::{Allocator, AllocatorCreateDesc},
    MemoryLocation,
};

use super::{
    allocation_error, buffer::Buffer, command_pool::CommandPool, context::Context,
    descriptor_set::StorageBufferSet, device_error, image::texture_image_create_info, image::Image,
    sampler::create_sampler,
};
use crate::gpu::{
    AddressMode, BufferDescriptor, BufferHandle, BufferUsage, Filter, GpuDevice, GpuError,
    GpuResult, SamplerInfo, TextureDescriptor, TextureFormat, TextureHandle,
};

/// Number of storage buffer bindings the ray tracing pass can read.
const STORAGE_BINDING_COUNT: u32 = 1;

/// [`GpuDevice`] on top of a headless Vulkan context.
///
/// Buffers live in host visible memory and are written directly. Textures are staged,
/// get their mip chain blitted on the GPU and are sampled through their own sampler.
pub struct VulkanDevice {
    state: Mutex<VulkanState>,
    // Dropped after the state, which still needs the device
    context: Arc<Context>,
}

struct VulkanState {
    allocator: Allocator,
    next_id: u64,
    buffers: HashMap<u64, Buffer>,
    textures: HashMap<u64, VulkanTexture>,
    storage_set: StorageBufferSet,
    command_pool: CommandPool,
}

struct VulkanTexture {
    image: Image,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl VulkanDevice {
    pub fn new() -> GpuResult<Self> {
        let context = Arc::new(Context::new()?);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: context.instance.clone(),
            device: context.device.clone(),
            physical_device: context.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(allocation_error(0))?;

        let storage_set = StorageBufferSet::new(context.clone(), STORAGE_BINDING_COUNT)?;
        let command_pool = CommandPool::new(context.clone())?;

        Ok(Self {
            state: Mutex::new(VulkanState {
                allocator,
                next_id: 0,
                buffers: HashMap::new(),
                textures: HashMap::new(),
                storage_set,
                command_pool,
            }),
            context,
        })
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Layout and set that hold the storage buffers, for building the ray tracing pipeline.
    pub fn storage_descriptor_set(&self) -> (vk::DescriptorSetLayout, vk::DescriptorSet) {
        let state = self.state();
        (state.storage_set.layout, state.storage_set.inner)
    }

    /// Image view and sampler of a texture.
    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<vk::DescriptorImageInfo> {
        self.state()
            .textures
            .get(&texture.0)
            .map(|texture| vk::DescriptorImageInfo {
                sampler: texture.sampler,
                image_view: texture.view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
    }

    fn state(&self) -> MutexGuard<'_, VulkanState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn upload_texture(
        &self,
        state: &mut VulkanState,
        descriptor: &TextureDescriptor,
        pixels: &[u8],
    ) -> GpuResult<VulkanTexture> {
        let context = &self.context;
        let (format, pixels) = match descriptor.format {
            TextureFormat::R8 => (vk::Format::R8_UNORM, pixels.to_vec()),
            TextureFormat::Rgb8 => (vk::Format::R8G8B8A8_UNORM, rgb_to_rgba(pixels)),
            TextureFormat::Rgba8 => (vk::Format::R8G8B8A8_UNORM, pixels.to_vec()),
        };

        let mut mip_levels = descriptor.mip_levels();
        if mip_levels > 1 && !context.supports_linear_blit(format) {
            log::warn!(
                "{:?} does not support linear blitting, {} gets no mipmaps",
                format,
                descriptor.label
            );
            mip_levels = 1;
        }

        let mut staging = Buffer::new(
            context,
            &mut state.allocator,
            &format!("{} staging", descriptor.label),
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        let image = staging.copy_data(&pixels).and_then(|_| {
            Image::new(
                context,
                &mut state.allocator,
                &descriptor.label,
                &texture_image_create_info(format, descriptor.width, descriptor.height, mip_levels),
            )
        });
        let image = image.and_then(|image| {
            let uploaded = state.command_pool.submit_and_wait(|command_buffer| {
                image.copy_from_buffer_for_texture(context, command_buffer, &staging)
            });
            match uploaded {
                Ok(()) => Ok(image),
                Err(error) => {
                    image.destroy(context, &mut state.allocator);
                    Err(error)
                }
            }
        });
        staging.destroy(context, &mut state.allocator);
        let image = image?;

        let view = match create_image_view(context, &image, descriptor.format) {
            Ok(view) => view,
            Err(error) => {
                image.destroy(context, &mut state.allocator);
                return Err(error);
            }
        };
        let sampler = match create_sampler(context, &descriptor.sampler, mip_levels) {
            Ok(sampler) => sampler,
            Err(error) => {
                unsafe { context.device.destroy_image_view(view, None) };
                image.destroy(context, &mut state.allocator);
                return Err(error);
            }
        };

        Ok(VulkanTexture {
            image,
            view,
            sampler,
        })
    }

    fn insert_texture(
        &self,
        descriptor: &TextureDescriptor,
        pixels: &[u8],
    ) -> GpuResult<TextureHandle> {
        let mut state = self.state();
        let texture = self.upload_texture(&mut state, descriptor, pixels)?;
        let id = state.next_id();
        state.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }
}

impl VulkanState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl VulkanTexture {
    fn destroy(self, context: &Context, allocator: &mut Allocator) {
        unsafe { context.device.destroy_sampler(self.sampler, None) };
        unsafe { context.device.destroy_image_view(self.view, None) };
        self.image.destroy(context, allocator);
    }
}

impl GpuDevice for VulkanDevice {
    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor<'_>,
        contents: &[u8],
    ) -> GpuResult<BufferHandle> {
        if contents.is_empty() {
            return Err(GpuError::BufferCreationFailed(format!(
                "{}: buffers must not be empty",
                descriptor.label
            )));
        }

        let usage = match descriptor.usage {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
        };

        let mut state = self.state();
        let mut buffer = Buffer::new(
            &self.context,
            &mut state.allocator,
            descriptor.label,
            contents.len() as vk::DeviceSize,
            usage,
            MemoryLocation::CpuToGpu,
        )?;
        if let Err(error) = buffer.copy_data(contents) {
            buffer.destroy(&self.context, &mut state.allocator);
            return Err(error);
        }

        let id = state.next_id();
        state.buffers.insert(id, buffer);
        log::debug!(
            "Created {:?} buffer '{}' ({} bytes, {:?})",
            descriptor.usage,
            descriptor.label,
            contents.len(),
            descriptor.frequency
        );
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state();
        if let Some(removed) = state.buffers.remove(&buffer.0) {
            // The buffer may still be read by submitted work
            if let Err(error) = unsafe { self.context.device.device_wait_idle() } {
                log::error!("Could not wait for the device: {}", error);
            }
            removed.destroy(&self.context, &mut state.allocator);
        }
    }

    fn bind_storage_buffer(&self, binding: u32, buffer: BufferHandle) {
        let state = self.state();
        match state.buffers.get(&buffer.0) {
            Some(bound) if bound.usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER) => {
                state.storage_set.write(binding, bound)
            }
            Some(_) => log::warn!("Buffer {} is not a storage buffer", buffer.0),
            None => log::warn!("Cannot bind unknown buffer {}", buffer.0),
        }
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        pixels: &[u8],
    ) -> GpuResult<TextureHandle> {
        if pixels.len() as u64 != descriptor.byte_size() || pixels.is_empty() {
            return Err(GpuError::TextureCreationFailed(format!(
                "{}: expected {} bytes of pixel data, got {}",
                descriptor.label,
                descriptor.byte_size(),
                pixels.len()
            )));
        }

        self.insert_texture(descriptor, pixels)
    }

    fn create_placeholder_texture(&self, label: &str) -> GpuResult<TextureHandle> {
        let descriptor = TextureDescriptor {
            label: label.to_string(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8,
            sampler: SamplerInfo {
                min_filter: Filter::Linear,
                mag_filter: Filter::Linear,
                mipmap_mode: None,
                address_mode: [AddressMode::Repeat; 3],
            },
        };
        self.insert_texture(&descriptor, &[0; 4])
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let mut state = self.state();
        if let Some(removed) = state.textures.remove(&texture.0) {
            if let Err(error) = unsafe { self.context.device.device_wait_idle() } {
                log::error!("Could not wait for the device: {}", error);
            }
            removed.destroy(&self.context, &mut state.allocator);
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        unsafe { self.context.device.device_wait_idle() }.ok();

        for (_, buffer) in state.buffers.drain() {
            buffer.destroy(&self.context, &mut state.allocator);
        }
        for (_, texture) in state.textures.drain() {
            texture.destroy(&self.context, &mut state.allocator);
        }
    }
}

fn create_image_view(
    context: &Context,
    image: &Image,
    format: TextureFormat,
) -> GpuResult<vk::ImageView> {
    let components = match format {
        TextureFormat::R8 => vk::ComponentMapping {
            r: vk::ComponentSwizzle::R,
            g: vk::ComponentSwizzle::R,
            b: vk::ComponentSwizzle::R,
            a: vk::ComponentSwizzle::ONE,
        },
        TextureFormat::Rgb8 | TextureFormat::Rgba8 => vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        },
    };

    let create_info = vk::ImageViewCreateInfo::builder()
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(image.format)
        .components(components)
        .subresource_range(image.full_subresource_range(vk::ImageAspectFlags::COLOR))
        .image(image.inner);

    unsafe { context.device.create_image_view(&create_info, None) }
        .map_err(device_error("Could not create image view"))
}

/// Few devices can sample three channel formats, so RGB gets an opaque alpha channel.
fn rgb_to_rgba(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(3)
        .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], u8::MAX])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_gets_an_opaque_alpha_channel() {
        assert_eq!(
            rgb_to_rgba(&[1, 2, 3, 4, 5, 6]),
            vec![1, 2, 3, 255, 4, 5, 6, 255]
        );
    }
}
