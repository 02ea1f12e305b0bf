use std::ffi::CStr;

use ash::vk::{self, ApplicationInfo, DeviceCreateInfo, DeviceQueueCreateInfo, InstanceCreateInfo};

use super::device_error;
use crate::gpu::{GpuError, GpuResult};

/// Instance, device and queue without a surface. Nothing is presented, the ray tracing
/// pass reads the uploaded buffers.
pub struct Context {
    _entry: ash::Entry,
    pub instance: ash::Instance,

    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,

    pub device: ash::Device,
    pub queue: vk::Queue,
}

impl Context {
    pub fn new() -> GpuResult<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|error| {
            GpuError::Device(format!("Could not load vulkan library: {}", error))
        })?;

        let instance = {
            let app_info = ApplicationInfo::builder().api_version(vk::API_VERSION_1_3);
            let create_info = InstanceCreateInfo::builder().application_info(&app_info);
            unsafe { entry.create_instance(&create_info, None) }
                .map_err(device_error("Could not create instance"))?
        };

        let (physical_device, queue_family_index, device) = match create_device(&instance) {
            Ok(device) => device,
            Err(error) => {
                unsafe { instance.destroy_instance(None) };
                return Err(error);
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        let device_name = device_name.to_string_lossy();
        log::info!("Using Vulkan device {}", device_name);

        Ok(Self {
            _entry: entry,
            instance,

            physical_device,
            queue_family_index,

            device,
            queue,
        })
    }

    pub fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let format_properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };

        format_properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { self.device.destroy_device(None) };

        unsafe { self.instance.destroy_instance(None) };
    }
}

fn find_physical_device(instance: &ash::Instance) -> GpuResult<(vk::PhysicalDevice, u32)> {
    let physical_devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(device_error("Could not enumerate physical devices"))?;

    physical_devices
        .into_iter()
        .filter(|pd| {
            let properties = unsafe { instance.get_physical_device_properties(*pd) };
            properties.api_version >= vk::API_VERSION_1_3
        })
        .filter_map(|pd| {
            // Blitting mip levels needs a graphics queue
            unsafe { instance.get_physical_device_queue_family_properties(pd) }
                .iter()
                .position(|info| info.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|i| (pd, i as u32))
        })
        .min_by_key(|(pd, _)| {
            let device_type = unsafe { instance.get_physical_device_properties(*pd) }.device_type;

            match device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                vk::PhysicalDeviceType::CPU => 3,
                vk::PhysicalDeviceType::OTHER => 4,
                _ => 5,
            }
        })
        .ok_or_else(|| {
            GpuError::Device("Couldn't find a suitable Vulkan 1.3 device".to_string())
        })
}

fn create_device(instance: &ash::Instance) -> GpuResult<(vk::PhysicalDevice, u32, ash::Device)> {
    let (physical_device, queue_family_index) = find_physical_device(instance)?;
    let device = create_logical_device(instance, physical_device, queue_family_index)?;
    Ok((physical_device, queue_family_index, device))
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
) -> GpuResult<ash::Device> {
    let queue_priorities = [1.0];
    let queue_create_info = DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family_index)
        .queue_priorities(&queue_priorities)
        .build();

    let mut physical_device_vulkan13_features = vk::PhysicalDeviceVulkan13Features {
        synchronization2: vk::TRUE,
        ..vk::PhysicalDeviceVulkan13Features::default()
    };

    let create_info = DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .push_next(&mut physical_device_vulkan13_features);

    unsafe { instance.create_device(physical_device, &create_info, None) }
        .map_err(device_error("Could not create logical device"))
}
