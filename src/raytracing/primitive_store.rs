use std::sync::Arc;

use bytemuck::Zeroable;

use super::{GpuTriangle, TriangleBuffer};
use crate::gpu::{
    BufferDescriptor, BufferHandle, BufferUsage, GpuBuffer, GpuDevice, GpuResult,
    UpdateFrequency,
};

/// Storage buffer binding that the ray tracing shader reads triangles from.
pub const PRIMITIVE_BINDING: u32 = 0;

/// Owns the storage buffer holding the triangles of the active model.
pub struct PrimitiveStore {
    device: Arc<dyn GpuDevice>,
    buffer: Option<GpuBuffer>,
    triangle_count: usize,
    upload_count: usize,
}

impl PrimitiveStore {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            buffer: None,
            triangle_count: 0,
            upload_count: 0,
        }
    }

    /// Replaces the bound triangles with `triangles`.
    ///
    /// The new buffer is created before the old one is released, so a failed upload
    /// leaves the previous triangles bound. An empty buffer still binds a single zeroed
    /// record because buffers cannot be empty.
    pub fn upload(&mut self, triangles: &TriangleBuffer) -> GpuResult<()> {
        let zeroed = [GpuTriangle::zeroed()];
        let contents = if triangles.is_empty() {
            bytemuck::cast_slice(&zeroed[..])
        } else {
            triangles.as_bytes()
        };

        let buffer = GpuBuffer::new(
            &self.device,
            &BufferDescriptor {
                label: "primitives",
                usage: BufferUsage::Storage,
                frequency: UpdateFrequency::Dynamic,
            },
            contents,
        )?;
        self.device
            .bind_storage_buffer(PRIMITIVE_BINDING, buffer.handle());

        // Dropping the previous buffer releases it
        self.buffer = Some(buffer);
        self.triangle_count = triangles.len();
        self.upload_count += 1;

        log::info!(
            "Uploaded {} triangles ({} bytes)",
            self.triangle_count,
            contents.len()
        );
        Ok(())
    }

    /// Frees the storage buffer. Does nothing if nothing is uploaded.
    pub fn release(&mut self) {
        if self.buffer.take().is_some() {
            log::debug!("Released primitive buffer");
        }
        self.triangle_count = 0;
    }

    /// Triangles the shader should read. Zero for empty scenes even though one record
    /// is bound.
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffer_handle(&self) -> Option<BufferHandle> {
        self.buffer.as_ref().map(GpuBuffer::handle)
    }

    /// Number of successful uploads so far.
    pub fn upload_count(&self) -> usize {
        self.upload_count
    }
}

impl Drop for PrimitiveStore {
    fn drop(&mut self) {
        self.release();
    }
}

/// Uploads `triangles` to `store`.
pub fn upload_triangle_buffer(
    store: &mut PrimitiveStore,
    triangles: &TriangleBuffer,
) -> GpuResult<()> {
    store.upload(triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuError, HeadlessDevice};

    fn store() -> (Arc<HeadlessDevice>, PrimitiveStore) {
        let headless = Arc::new(HeadlessDevice::new());
        let store = PrimitiveStore::new(headless.clone());
        (headless, store)
    }

    #[test]
    fn empty_buffers_bind_one_zeroed_record() {
        let (headless, mut store) = store();
        store.upload(&TriangleBuffer::default()).unwrap();

        assert!(store.is_allocated());
        assert_eq!(store.triangle_count(), 0);
        assert_eq!(
            headless.storage_contents(PRIMITIVE_BINDING),
            Some(vec![0; GpuTriangle::SIZE])
        );
    }

    #[test]
    fn uploads_replace_the_previous_buffer() {
        let (headless, mut store) = store();
        store.upload(&TriangleBuffer::default()).unwrap();
        let first = store.buffer_handle();
        store.upload(&TriangleBuffer::default()).unwrap();

        assert_ne!(store.buffer_handle(), first);
        assert_eq!(
            headless.bound_storage_buffer(PRIMITIVE_BINDING),
            store.buffer_handle()
        );
        assert_eq!(headless.live_buffer_count(), 1);
        assert_eq!(store.upload_count(), 2);
    }

    #[test]
    fn failed_uploads_keep_the_previous_buffer() {
        let (headless, mut store) = store();
        store.upload(&TriangleBuffer::default()).unwrap();
        let previous = store.buffer_handle();

        headless.set_memory_budget(Some(GpuTriangle::SIZE as u64));
        assert!(matches!(
            store.upload(&TriangleBuffer::default()),
            Err(GpuError::OutOfMemory(_))
        ));
        assert_eq!(store.buffer_handle(), previous);
        assert_eq!(headless.bound_storage_buffer(PRIMITIVE_BINDING), previous);
        assert_eq!(store.upload_count(), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let (headless, mut store) = store();
        store.upload(&TriangleBuffer::default()).unwrap();

        store.release();
        store.release();
        assert!(!store.is_allocated());
        assert_eq!(headless.live_buffer_count(), 0);
        assert_eq!(headless.bound_storage_buffer(PRIMITIVE_BINDING), None);
    }
}
