use ash::vk::{
    self, AccessFlags2, Extent3D, ImageMemoryBarrier2, ImageSubresourceRange, PipelineStageFlags2,
};
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};

use super::{allocation_error, buffer::Buffer, context::Context, device_error};
use crate::gpu::GpuResult;

const SHADER_STAGES: PipelineStageFlags2 = PipelineStageFlags2::from_raw(
    PipelineStageFlags2::FRAGMENT_SHADER.as_raw() | PipelineStageFlags2::COMPUTE_SHADER.as_raw(),
);

pub struct Image {
    pub inner: vk::Image,

    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    allocation: Allocation,
}

impl Image {
    pub fn new(
        context: &Context,
        allocator: &mut Allocator,
        name: &str,
        create_info: &vk::ImageCreateInfo,
    ) -> GpuResult<Image> {
        let device = &context.device;

        let image = unsafe { device.create_image(create_info, None) }
            .map_err(device_error("Could not create image"))?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let allocation = match allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(error) => {
                unsafe { device.destroy_image(image, None) };
                return Err(allocation_error(requirements.size)(error));
            }
        };

        let bound =
            unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) };
        let image = Self {
            inner: image,
            format: create_info.format,
            extent: create_info.extent,
            mip_levels: create_info.mip_levels,
            allocation,
        };
        if let Err(error) = bound {
            image.destroy(context, allocator);
            return Err(device_error("Could not bind image memory")(error));
        }

        Ok(image)
    }

    /// Records the copy of `buffer` into level 0 and blits every further mip level from
    /// the one above it. Leaves all levels in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn copy_from_buffer_for_texture(
        &self,
        context: &Context,
        command_buffer: vk::CommandBuffer,
        buffer: &Buffer,
    ) {
        let num_levels = self.mip_levels;
        let device = &context.device;

        // prepare copying base image to level 0
        // we use a full subresource range to transition the imagelayout of all mipmapping levels to TRANSFER_DST_OPTIMAL
        self.insert_image_memory_barrier(
            context,
            command_buffer,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            PipelineStageFlags2::NONE,
            PipelineStageFlags2::COPY,
            AccessFlags2::empty(),
            AccessFlags2::TRANSFER_WRITE,
            self.full_subresource_range(vk::ImageAspectFlags::COLOR),
        );

        let buffer_image_copy = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: self.extent,
        };

        unsafe {
            device.cmd_copy_buffer_to_image(
                command_buffer,
                buffer.inner,
                self.inner,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&buffer_image_copy),
            )
        };

        for level in 1..num_levels {
            let src_size = Self::extent_to_offset(Self::mip_level(self.extent, level - 1));
            let dst_size = Self::extent_to_offset(Self::mip_level(self.extent, level));

            // transition image layout src level from TRANSFER_DST_OPTIMAL to TRANSFER_SRC_OPTIMAL
            self.insert_image_memory_barrier(
                context,
                command_buffer,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                PipelineStageFlags2::TRANSFER,
                PipelineStageFlags2::BLIT,
                AccessFlags2::TRANSFER_WRITE,
                AccessFlags2::TRANSFER_READ,
                Self::level_range(level - 1),
            );

            let blit = vk::ImageBlit::builder()
                .src_offsets([vk::Offset3D::default(), src_size])
                .src_subresource(Self::level_layers(level - 1))
                .dst_offsets([vk::Offset3D::default(), dst_size])
                .dst_subresource(Self::level_layers(level))
                .build();

            unsafe {
                device.cmd_blit_image(
                    command_buffer,
                    self.inner,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.inner,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&blit),
                    vk::Filter::LINEAR,
                )
            }

            // transition image layout of previous mipmapping level from TRANSFER_SRC_OPTIMAL to SHADER_READ_ONLY_OPTIMAL
            self.insert_image_memory_barrier(
                context,
                command_buffer,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                PipelineStageFlags2::BLIT,
                SHADER_STAGES,
                AccessFlags2::TRANSFER_READ,
                AccessFlags2::SHADER_READ,
                Self::level_range(level - 1),
            );
        }

        // transition image layout of last mipmapping level from TRANSFER_DST_OPTIMAL to SHADER_READ_ONLY_OPTIMAL
        self.insert_image_memory_barrier(
            context,
            command_buffer,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            PipelineStageFlags2::TRANSFER,
            SHADER_STAGES,
            AccessFlags2::TRANSFER_WRITE,
            AccessFlags2::SHADER_READ,
            Self::level_range(num_levels - 1),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_image_memory_barrier(
        &self,
        context: &Context,
        command_buffer: vk::CommandBuffer,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_stage_mask: PipelineStageFlags2,
        dst_stage_mask: PipelineStageFlags2,
        src_access_mask: vk::AccessFlags2,
        dst_access_mask: vk::AccessFlags2,
        subresource_range: ImageSubresourceRange,
    ) {
        let barrier = vk::ImageMemoryBarrier2 {
            old_layout,
            new_layout,
            src_stage_mask,
            dst_stage_mask,
            src_access_mask,
            dst_access_mask,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: self.inner,
            subresource_range,
            ..ImageMemoryBarrier2::default()
        };

        let dependency_info =
            vk::DependencyInfo::builder().image_memory_barriers(std::slice::from_ref(&barrier));

        unsafe {
            context
                .device
                .cmd_pipeline_barrier2(command_buffer, &dependency_info)
        };
    }

    pub fn mip_level(base_extent: vk::Extent3D, level: u32) -> vk::Extent3D {
        Extent3D {
            width: (base_extent.width >> level).max(1),
            height: (base_extent.height >> level).max(1),
            depth: (base_extent.depth >> level).max(1),
        }
    }

    pub fn extent_to_offset(extent: vk::Extent3D) -> vk::Offset3D {
        vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: extent.depth as i32,
        }
    }

    fn level_range(level: u32) -> ImageSubresourceRange {
        ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    fn level_layers(level: u32) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: level,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    pub fn full_subresource_range(
        &self,
        aspect_mask: vk::ImageAspectFlags,
    ) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    pub fn destroy(self, context: &Context, allocator: &mut Allocator) {
        if let Err(error) = allocator.free(self.allocation) {
            log::error!("Could not free image memory: {}", error);
        }
        unsafe { context.device.destroy_image(self.inner, None) };
    }
}

pub fn texture_image_create_info(
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> vk::ImageCreateInfo {
    vk::ImageCreateInfo {
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: Extent3D {
            width,
            height,
            depth: 1,
        },
        mip_levels,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::TRANSFER_SRC,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    }
}
