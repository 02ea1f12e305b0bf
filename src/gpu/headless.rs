use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use super::{
    BufferDescriptor, BufferHandle, BufferUsage, GpuDevice, GpuError, GpuResult,
    TextureDescriptor, TextureHandle, UpdateFrequency,
};

/// A device that keeps every resource in host memory.
///
/// Used when no Vulkan device is available and by the tests, which inspect what was
/// uploaded. A memory budget can be set to make allocations fail.
pub struct HeadlessDevice {
    state: Mutex<HeadlessState>,
}

#[derive(Default)]
struct HeadlessState {
    next_id: u64,
    memory_budget: Option<u64>,
    allocated_bytes: u64,
    buffers: HashMap<u64, HeadlessBuffer>,
    textures: HashMap<u64, HeadlessTexture>,
    storage_bindings: HashMap<u32, BufferHandle>,
    buffers_created: usize,
    textures_created: usize,
}

#[derive(Clone, Debug)]
pub struct HeadlessBuffer {
    pub label: String,
    pub usage: BufferUsage,
    pub frequency: UpdateFrequency,
    pub contents: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct HeadlessTexture {
    pub label: String,
    /// `None` for placeholder textures.
    pub descriptor: Option<TextureDescriptor>,
    pub mip_levels: u32,
    pub pixels: Vec<u8>,
}

impl HeadlessState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn reserve(&mut self, size: u64) -> GpuResult<()> {
        if let Some(budget) = self.memory_budget {
            if self.allocated_bytes + size > budget {
                return Err(GpuError::OutOfMemory(size));
            }
        }
        self.allocated_bytes += size;
        Ok(())
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeadlessState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Limits the total number of bytes that can be alive at the same time.
    pub fn set_memory_budget(&self, budget: Option<u64>) {
        self.state().memory_budget = budget;
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.state().allocated_bytes
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.state().textures.len()
    }

    /// Number of buffers created over the lifetime of the device.
    pub fn buffers_created(&self) -> usize {
        self.state().buffers_created
    }

    pub fn textures_created(&self) -> usize {
        self.state().textures_created
    }

    pub fn buffer(&self, buffer: BufferHandle) -> Option<HeadlessBuffer> {
        self.state().buffers.get(&buffer.0).cloned()
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<HeadlessTexture> {
        self.state().textures.get(&texture.0).cloned()
    }

    pub fn bound_storage_buffer(&self, binding: u32) -> Option<BufferHandle> {
        self.state().storage_bindings.get(&binding).copied()
    }

    /// Contents of the storage buffer currently bound at `binding`.
    pub fn storage_contents(&self, binding: u32) -> Option<Vec<u8>> {
        let state = self.state();
        let handle = state.storage_bindings.get(&binding)?;
        state
            .buffers
            .get(&handle.0)
            .map(|buffer| buffer.contents.clone())
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
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

        let mut state = self.state();
        state.reserve(contents.len() as u64)?;
        let id = state.next_id();
        state.buffers.insert(
            id,
            HeadlessBuffer {
                label: descriptor.label.to_string(),
                usage: descriptor.usage,
                frequency: descriptor.frequency,
                contents: contents.to_vec(),
            },
        );
        state.buffers_created += 1;
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state();
        if let Some(removed) = state.buffers.remove(&buffer.0) {
            state.allocated_bytes -= removed.contents.len() as u64;
        }
        state.storage_bindings.retain(|_, bound| *bound != buffer);
    }

    fn bind_storage_buffer(&self, binding: u32, buffer: BufferHandle) {
        let mut state = self.state();
        match state.buffers.get(&buffer.0) {
            Some(bound) if bound.usage == BufferUsage::Storage => {
                state.storage_bindings.insert(binding, buffer);
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
        if pixels.len() as u64 != descriptor.byte_size() {
            return Err(GpuError::TextureCreationFailed(format!(
                "{}: expected {} bytes of pixel data, got {}",
                descriptor.label,
                descriptor.byte_size(),
                pixels.len()
            )));
        }

        let mut state = self.state();
        state.reserve(pixels.len() as u64)?;
        let id = state.next_id();
        state.textures.insert(
            id,
            HeadlessTexture {
                label: descriptor.label.clone(),
                descriptor: Some(descriptor.clone()),
                mip_levels: descriptor.mip_levels(),
                pixels: pixels.to_vec(),
            },
        );
        state.textures_created += 1;
        Ok(TextureHandle(id))
    }

    fn create_placeholder_texture(&self, label: &str) -> GpuResult<TextureHandle> {
        let mut state = self.state();
        let id = state.next_id();
        state.textures.insert(
            id,
            HeadlessTexture {
                label: label.to_string(),
                descriptor: None,
                mip_levels: 1,
                pixels: Vec::new(),
            },
        );
        state.textures_created += 1;
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let mut state = self.state();
        if let Some(removed) = state.textures.remove(&texture.0) {
            state.allocated_bytes -= removed.pixels.len() as u64;
        }
    }
}
