//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out unique
//! fake handles, keeps mappable buffer contents in host memory and records
//! every native command and descriptor write it is given, so the output of
//! context replay can be inspected without GPU hardware.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use ash::vk;
use ash::vk::Handle;
use parking_lot::Mutex;

use crate::cache::{FramebufferKey, GraphicsPipelineKey, RenderPassKey};
use crate::error::GraphicsError;
use crate::resources::{Shader, ShaderDescriptor};
use crate::types::{BufferDescriptor, Extent3d, TextureDescriptor};

use super::{DescriptorWrite, GpuBackend, GpuBuffer, GpuCommand, GpuQueryPool, GpuShader, GpuTexture};

/// Object counts of a [`DummyBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    pub buffers: usize,
    pub staging_buffers: usize,
    pub textures: usize,
    pub texture_uploads: usize,
    pub shaders: usize,
    pub render_passes: usize,
    pub framebuffers: usize,
    pub pipelines: usize,
    pub descriptor_sets: usize,
    pub destroyed_objects: usize,
    pub frames_submitted: usize,
}

#[derive(Debug, Default)]
struct Counters {
    buffers: AtomicUsize,
    staging_buffers: AtomicUsize,
    textures: AtomicUsize,
    texture_uploads: AtomicUsize,
    shaders: AtomicUsize,
    render_passes: AtomicUsize,
    framebuffers: AtomicUsize,
    pipelines: AtomicUsize,
    descriptor_sets: AtomicUsize,
    destroyed_objects: AtomicUsize,
    frames_submitted: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    next_handle: AtomicU64,
    counters: Counters,
    frame_active: AtomicBool,
    fail_pipelines: AtomicBool,
    recorded: Mutex<Vec<GpuCommand>>,
    descriptor_writes: Mutex<Vec<DescriptorWrite>>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            counters: Counters::default(),
            frame_active: AtomicBool::new(false),
            fail_pipelines: AtomicBool::new(false),
            recorded: Mutex::new(Vec::new()),
            descriptor_writes: Mutex::new(Vec::new()),
        }
    }

    fn handle<H: Handle>(&self) -> H {
        H::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Snapshot of the object counters.
    pub fn stats(&self) -> DummyStats {
        let c = &self.counters;
        let load = |a: &AtomicUsize| a.load(Ordering::Relaxed);
        DummyStats {
            buffers: load(&c.buffers),
            staging_buffers: load(&c.staging_buffers),
            textures: load(&c.textures),
            texture_uploads: load(&c.texture_uploads),
            shaders: load(&c.shaders),
            render_passes: load(&c.render_passes),
            framebuffers: load(&c.framebuffers),
            pipelines: load(&c.pipelines),
            descriptor_sets: load(&c.descriptor_sets),
            destroyed_objects: load(&c.destroyed_objects),
            frames_submitted: load(&c.frames_submitted),
        }
    }

    /// Make every later pipeline creation fail until switched back off.
    pub fn set_fail_pipelines(&self, fail: bool) {
        self.fail_pipelines.store(fail, Ordering::Relaxed);
    }

    fn check_pipeline_creation(&self) -> Result<(), GraphicsError> {
        if self.fail_pipelines.load(Ordering::Relaxed) {
            return Err(GraphicsError::ResourceCreationFailed(
                "pipeline creation disabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Every command recorded so far.
    pub fn recorded(&self) -> Vec<GpuCommand> {
        self.recorded.lock().clone()
    }

    /// Remove and return every recorded command.
    pub fn take_recorded(&self) -> Vec<GpuCommand> {
        std::mem::take(&mut *self.recorded.lock())
    }

    /// Every descriptor write performed so far.
    pub fn descriptor_writes(&self) -> Vec<DescriptorWrite> {
        self.descriptor_writes.lock().clone()
    }

    /// Remove and return every descriptor write.
    pub fn take_descriptor_writes(&self) -> Vec<DescriptorWrite> {
        std::mem::take(&mut *self.descriptor_writes.lock())
    }

    fn mapped<'a>(
        buffer: &'a GpuBuffer,
        offset: u64,
        len: usize,
    ) -> Result<(&'a Mutex<Vec<u8>>, std::ops::Range<usize>), GraphicsError> {
        let GpuBuffer::Dummy {
            memory: Some(memory),
            ..
        } = buffer
        else {
            return Err(GraphicsError::InvalidParameter(
                "buffer is not mapped for CPU access".to_string(),
            ));
        };
        let start = offset as usize;
        let end = start + len;
        if end > memory.lock().len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "range {}..{} is out of bounds",
                start, end
            )));
        }
        Ok((memory, start..end))
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        bump(&self.counters.buffers);
        let memory = descriptor
            .is_mappable()
            .then(|| Mutex::new(vec![0; descriptor.size as usize]));
        Ok(GpuBuffer::Dummy {
            buffer: self.handle(),
            memory,
        })
    }

    fn create_staging_buffer(&self, data: &[u8]) -> Result<GpuBuffer, GraphicsError> {
        log::trace!("DummyBackend: creating staging buffer ({} bytes)", data.len());
        bump(&self.counters.staging_buffers);
        Ok(GpuBuffer::Dummy {
            buffer: self.handle(),
            memory: Some(Mutex::new(data.to_vec())),
        })
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        format: vk::Format,
    ) -> Result<GpuTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {:?})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            format
        );
        bump(&self.counters.textures);
        Ok(GpuTexture::Dummy {
            image: self.handle(),
            view: self.handle(),
            sampler: self.handle(),
        })
    }

    fn upload_texture(
        &self,
        _texture: &GpuTexture,
        _aspect: vk::ImageAspectFlags,
        extent: Extent3d,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: uploading {} bytes to {}x{} texture",
            data.len(),
            extent.width,
            extent.height
        );
        bump(&self.counters.texture_uploads);
        Ok(())
    }

    fn create_shader(&self, descriptor: &ShaderDescriptor) -> Result<GpuShader, GraphicsError> {
        log::trace!("DummyBackend: creating shader {:?}", descriptor.label);
        bump(&self.counters.shaders);
        let set_layouts = (0..descriptor.reflection.set_count())
            .map(|_| self.handle())
            .collect();
        Ok(GpuShader::Dummy {
            pipeline_layout: self.handle(),
            set_layouts,
        })
    }

    fn create_query_pool(&self, count: u32) -> Result<GpuQueryPool, GraphicsError> {
        Ok(GpuQueryPool::Dummy {
            pool: self.handle(),
            count,
        })
    }

    fn create_render_pass(&self, key: &RenderPassKey) -> Result<vk::RenderPass, GraphicsError> {
        log::trace!(
            "DummyBackend: creating render pass with {} attachments",
            key.attachment_count()
        );
        bump(&self.counters.render_passes);
        Ok(self.handle())
    }

    fn create_framebuffer(&self, key: &FramebufferKey) -> Result<vk::Framebuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating {}x{} framebuffer",
            key.width,
            key.height
        );
        bump(&self.counters.framebuffers);
        Ok(self.handle())
    }

    fn create_graphics_pipeline(
        &self,
        shader: &Shader,
        _key: &GraphicsPipelineKey,
    ) -> Result<vk::Pipeline, GraphicsError> {
        log::trace!("DummyBackend: creating graphics pipeline for {:?}", shader.label());
        self.check_pipeline_creation()?;
        bump(&self.counters.pipelines);
        Ok(self.handle())
    }

    fn create_compute_pipeline(&self, shader: &Shader) -> Result<vk::Pipeline, GraphicsError> {
        log::trace!("DummyBackend: creating compute pipeline for {:?}", shader.label());
        self.check_pipeline_creation()?;
        bump(&self.counters.pipelines);
        Ok(self.handle())
    }

    fn allocate_descriptor_set(
        &self,
        _layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, GraphicsError> {
        bump(&self.counters.descriptor_sets);
        Ok(self.handle())
    }

    fn write_descriptor_set(&self, writes: &[DescriptorWrite]) {
        self.descriptor_writes.lock().extend_from_slice(writes);
    }

    fn destroy_render_pass(&self, _render_pass: vk::RenderPass) {
        bump(&self.counters.destroyed_objects);
    }

    fn destroy_framebuffer(&self, _framebuffer: vk::Framebuffer) {
        bump(&self.counters.destroyed_objects);
    }

    fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {
        bump(&self.counters.destroyed_objects);
    }

    fn free_descriptor_set(&self, _set: vk::DescriptorSet) {
        bump(&self.counters.destroyed_objects);
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let (memory, range) = Self::mapped(buffer, offset, data.len())?;
        memory.lock()[range].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &mut [u8],
    ) -> Result<(), GraphicsError> {
        let (memory, range) = Self::mapped(buffer, offset, data.len())?;
        data.copy_from_slice(&memory.lock()[range]);
        Ok(())
    }

    fn read_timestamps(
        &self,
        _pool: &GpuQueryPool,
        first: u32,
        count: u32,
    ) -> Result<Vec<u64>, GraphicsError> {
        // One microsecond between consecutive queries.
        Ok((first..first + count).map(|q| u64::from(q) * 1000).collect())
    }

    fn timestamp_period(&self) -> f32 {
        1.0
    }

    fn supports_debug_labels(&self) -> bool {
        true
    }

    fn record(&self, commands: &[GpuCommand]) -> Result<(), GraphicsError> {
        if !self.frame_active.load(Ordering::Acquire) {
            return Err(GraphicsError::Internal(
                "commands recorded outside of a frame".to_string(),
            ));
        }
        for command in commands {
            log::trace!("DummyBackend: {:?}", command);
        }
        self.recorded.lock().extend_from_slice(commands);
        Ok(())
    }

    fn begin_frame(&self, frame_slot: usize) -> Result<(), GraphicsError> {
        log::trace!("DummyBackend: begin frame slot {}", frame_slot);
        self.frame_active.store(true, Ordering::Release);
        Ok(())
    }

    fn end_frame(&self) -> Result<(), GraphicsError> {
        self.frame_active.store(false, Ordering::Release);
        bump(&self.counters.frames_submitted);
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    #[test]
    fn test_dummy_backend_handles_are_unique() {
        let backend = DummyBackend::new();
        let a = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();
        let b = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();
        assert_ne!(a.raw(), b.raw());
        assert_eq!(backend.stats().buffers, 2);
    }

    #[test]
    fn test_mappable_buffer_round_trip() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(
                8,
                BufferUsage::MAP_READ | BufferUsage::MAP_WRITE,
            ))
            .unwrap();
        backend.write_buffer(&buffer, 4, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 8];
        backend.read_buffer(&buffer, 0, &mut out).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_write_to_device_local_buffer_fails() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(8, BufferUsage::VERTEX))
            .unwrap();
        assert!(backend.write_buffer(&buffer, 0, &[1]).is_err());
    }

    #[test]
    fn test_record_requires_frame() {
        let backend = DummyBackend::new();
        assert!(backend.record(&[GpuCommand::EndLabel]).is_err());
        backend.begin_frame(0).unwrap();
        backend.record(&[GpuCommand::EndLabel]).unwrap();
        backend.end_frame().unwrap();
        assert_eq!(backend.recorded().len(), 1);
        assert_eq!(backend.stats().frames_submitted, 1);
    }
}
