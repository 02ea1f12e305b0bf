use ash::vk;

use super::{context::Context, device_error};
use crate::gpu::{AddressMode, Filter, GpuResult, MipmapMode, SamplerInfo};

pub fn create_sampler(
    context: &Context,
    sampler_info: &SamplerInfo,
    mip_levels: u32,
) -> GpuResult<vk::Sampler> {
    fn convert_filter(filter: &Filter) -> vk::Filter {
        match filter {
            Filter::Nearest => vk::Filter::NEAREST,
            Filter::Linear => vk::Filter::LINEAR,
        }
    }
    fn convert_address_mode(address_mode: &AddressMode) -> vk::SamplerAddressMode {
        match address_mode {
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }

    // Without mipmaps only level 0 may be sampled
    let (mipmap_mode, max_lod) = match &sampler_info.mipmap_mode {
        Some(MipmapMode::Nearest) => (vk::SamplerMipmapMode::NEAREST, mip_levels as f32),
        Some(MipmapMode::Linear) => (vk::SamplerMipmapMode::LINEAR, mip_levels as f32),
        None => (vk::SamplerMipmapMode::NEAREST, 0.0),
    };

    let create_info = vk::SamplerCreateInfo::builder()
        .flags(vk::SamplerCreateFlags::empty())
        .mag_filter(convert_filter(&sampler_info.mag_filter))
        .min_filter(convert_filter(&sampler_info.min_filter))
        .mipmap_mode(mipmap_mode)
        .address_mode_u(convert_address_mode(&sampler_info.address_mode[0]))
        .address_mode_v(convert_address_mode(&sampler_info.address_mode[1]))
        .address_mode_w(convert_address_mode(&sampler_info.address_mode[2]))
        .min_lod(0.0)
        .max_lod(max_lod);

    unsafe { context.device.create_sampler(&create_info, None) }
        .map_err(device_error("Could not create sampler"))
}
