//! Graphics device.
//!
//! The [`GraphicsDevice`] owns everything contexts share: the backend, the
//! native object caches, the resource state tracker and the placeholder
//! resources substituted for unbound shader slots.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use ash::vk;
use parking_lot::Mutex;

use crate::backend::conversion::get_vk_format;
use crate::backend::{self, DescriptorResource, DescriptorWrite, GpuBackend, GpuTexture};
use crate::cache::{
    ComputePipelineKey, DescriptorKey, DescriptorSetKey, FramebufferKey, GraphicsPipelineKey,
    ObjectCache, RenderPassKey,
};
use crate::context::GraphicsContext;
use crate::error::GraphicsError;
use crate::profiling::GpuTimer;
use crate::resources::{Buffer, RetiredResources, Shader, ShaderDescriptor, ShaderStage, Texture};
use crate::sync::{AccessState, ResourceStateTracker, TextureLayout};
use crate::types::{
    BufferDescriptor, BufferUsage, SamplerDescriptor, TextureDescriptor, TextureFormat,
    TextureUsage,
};

/// Upper bound for [`DeviceParameters::frames_in_flight`].
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Size of the zeroed buffer bound to unbound buffer slots.
const MISSING_BUFFER_SIZE: u64 = 256;

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Vulkan if a device can be created, dummy otherwise.
    #[default]
    Auto,
    Vulkan,
    Dummy,
}

/// Parameters for creating a [`GraphicsDevice`].
///
/// # Example
///
/// ```ignore
/// let params = DeviceParameters::new()
///     .with_backend(BackendType::Vulkan)
///     .with_frames_in_flight(3)
///     .with_validation(true);
/// let device = GraphicsDevice::new(params)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParameters {
    pub backend: BackendType,
    /// Enable the Khronos validation layer and debug labels.
    pub validation: bool,
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    pub application_name: String,
    /// Capacity of the descriptor pool, in sets and per descriptor type.
    pub descriptor_pool_size: u32,
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self {
            backend: BackendType::Auto,
            validation: cfg!(debug_assertions),
            frames_in_flight: 2,
            application_name: "Ember".to_string(),
            descriptor_pool_size: 1000,
        }
    }
}

impl DeviceParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// # Panics
    ///
    /// Panics if `frames` is zero or greater than [`MAX_FRAMES_IN_FLIGHT`].
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        assert!(
            (1..=MAX_FRAMES_IN_FLIGHT).contains(&frames),
            "frames in flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {frames}"
        );
        self.frames_in_flight = frames;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn with_descriptor_pool_size(mut self, size: u32) -> Self {
        self.descriptor_pool_size = size;
        self
    }
}

/// Number of live entries in each device cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub render_passes: usize,
    pub framebuffers: usize,
    pub graphics_pipelines: usize,
    pub compute_pipelines: usize,
    pub descriptor_sets: usize,
}

/// A graphics device for creating GPU resources and recording contexts.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync`. Cache lookups may run concurrently;
/// replay locks the state tracker, so contexts ending on different threads
/// are serialized rather than racing on resource state.
///
/// # Example
///
/// ```ignore
/// let device = GraphicsDevice::new(DeviceParameters::new())?;
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
///
/// device.begin_frame()?;
/// let mut context = device.create_context();
/// context.begin();
/// // ...
/// context.end()?;
/// device.end_frame()?;
/// ```
pub struct GraphicsDevice {
    backend: Arc<dyn GpuBackend>,
    frames_in_flight: usize,
    frame_index: AtomicUsize,
    frame_active: AtomicBool,
    retired: Arc<RetiredResources>,
    tracker: Mutex<ResourceStateTracker>,
    render_passes: ObjectCache<RenderPassKey, vk::RenderPass>,
    framebuffers: ObjectCache<FramebufferKey, vk::Framebuffer>,
    graphics_pipelines: ObjectCache<GraphicsPipelineKey, vk::Pipeline>,
    compute_pipelines: ObjectCache<ComputePipelineKey, vk::Pipeline>,
    descriptor_sets: ObjectCache<DescriptorSetKey, vk::DescriptorSet>,
    missing_texture: Option<Arc<Texture>>,
    missing_buffer: Option<Arc<Buffer>>,
}

impl GraphicsDevice {
    /// Create a device with the backend selected by `params`.
    pub fn new(params: DeviceParameters) -> Result<Arc<Self>, GraphicsError> {
        let backend = backend::create_backend(&params)?;
        Self::with_backend(backend, params)
    }

    /// Create a device on top of an existing backend.
    pub fn with_backend(
        backend: Arc<dyn GpuBackend>,
        params: DeviceParameters,
    ) -> Result<Arc<Self>, GraphicsError> {
        log::info!(
            "Creating GraphicsDevice on {} ({} frames in flight)",
            backend.name(),
            params.frames_in_flight
        );

        let mut device = Self {
            backend,
            frames_in_flight: params.frames_in_flight,
            frame_index: AtomicUsize::new(0),
            frame_active: AtomicBool::new(false),
            retired: Arc::new(RetiredResources::default()),
            tracker: Mutex::new(ResourceStateTracker::new()),
            render_passes: ObjectCache::new("render pass"),
            framebuffers: ObjectCache::new("framebuffer"),
            graphics_pipelines: ObjectCache::new("graphics pipeline"),
            compute_pipelines: ObjectCache::new("compute pipeline"),
            descriptor_sets: ObjectCache::new("descriptor set"),
            missing_texture: None,
            missing_buffer: None,
        };

        let missing_texture = device.create_texture_with_data(
            &TextureDescriptor::new_2d(
                1,
                1,
                TextureFormat::RGBA8_UNORM,
                TextureUsage::TEXTURE_BINDING | TextureUsage::STORAGE_BINDING | TextureUsage::COPY_DST,
            )
            .with_label("missing_texture")
            .with_sampler(SamplerDescriptor::nearest()),
            &[255, 0, 255, 255],
        )?;

        let missing_buffer = device.create_buffer(
            &BufferDescriptor::new(
                MISSING_BUFFER_SIZE,
                BufferUsage::UNIFORM | BufferUsage::STORAGE | BufferUsage::MAP_WRITE,
            )
            .with_label("missing_buffer"),
        )?;
        device.backend.write_buffer(
            missing_buffer.slot(0).gpu(),
            0,
            &[0; MISSING_BUFFER_SIZE as usize],
        )?;

        device.missing_texture = Some(missing_texture);
        device.missing_buffer = Some(missing_buffer);
        Ok(Arc::new(device))
    }

    /// The backend this device records into.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Index of the frame being recorded. Selects the slot of multi-frame buffers.
    pub fn frame_index(&self) -> usize {
        self.frame_index.load(Ordering::Acquire)
    }

    pub fn is_frame_active(&self) -> bool {
        self.frame_active.load(Ordering::Acquire)
    }

    /// The 1x1 magenta texture bound to texture slots nobody bound.
    pub fn missing_texture(&self) -> &Arc<Texture> {
        self.missing_texture
            .as_ref()
            .unwrap_or_else(|| unreachable!("missing texture is created with the device"))
    }

    /// The zeroed buffer bound to buffer slots nobody bound.
    pub fn missing_buffer(&self) -> &Arc<Buffer> {
        self.missing_buffer
            .as_ref()
            .unwrap_or_else(|| unreachable!("missing buffer is created with the device"))
    }

    /// The resource state tracker shared by every context.
    pub fn state_tracker(&self) -> &Mutex<ResourceStateTracker> {
        &self.tracker
    }

    /// Create a recording context.
    pub fn create_context(self: &Arc<Self>) -> GraphicsContext {
        GraphicsContext::new(Arc::clone(self))
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    /// Create a GPU buffer.
    ///
    /// Multi-frame buffers get one allocation per frame in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or allocation fails.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Arc<Buffer>, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let slot_count = if descriptor.multi_frame {
            self.frames_in_flight
        } else {
            1
        };
        let allocations = (0..slot_count)
            .map(|_| self.backend.create_buffer(descriptor))
            .collect::<Result<Vec<_>, _>>()?;

        log::trace!(
            "GraphicsDevice: created buffer {:?}, size={}, slots={}",
            descriptor.label,
            descriptor.size,
            slot_count
        );

        Ok(Arc::new(Buffer::new(
            descriptor.clone(),
            allocations,
            Arc::clone(&self.retired),
        )))
    }

    /// Create a GPU texture.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero, the format has no native
    /// equivalent, or allocation fails.
    pub fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        if descriptor.size.width == 0 || descriptor.size.height == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }

        let format = get_vk_format(descriptor.format)?;
        let gpu = self.backend.create_texture(descriptor, format)?;

        log::trace!(
            "GraphicsDevice: created texture {:?}, {}x{}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );

        Ok(Arc::new(Texture::new(
            descriptor.clone(),
            format,
            gpu,
            Arc::clone(&self.retired),
        )))
    }

    /// Create a sampled texture and upload its contents immediately.
    ///
    /// This blocks until the upload has finished. The texture is left in the
    /// shader-read-only layout.
    pub fn create_texture_with_data(
        &self,
        descriptor: &TextureDescriptor,
        data: &[u8],
    ) -> Result<Arc<Texture>, GraphicsError> {
        if !descriptor
            .usage
            .contains(TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST)
        {
            return Err(GraphicsError::InvalidParameter(
                "texture with initial data needs TEXTURE_BINDING | COPY_DST usage".to_string(),
            ));
        }
        let expected = descriptor.size.width as usize
            * descriptor.size.height as usize
            * descriptor.format.bytes_per_texel() as usize;
        if data.len() != expected {
            return Err(GraphicsError::InvalidParameter(format!(
                "expected {} bytes of texture data, got {}",
                expected,
                data.len()
            )));
        }

        let texture = self.create_texture(descriptor)?;
        {
            ember_core::profile_scope!("texture_upload");
            self.backend.upload_texture(
                texture.gpu(),
                texture.aspect_mask(),
                descriptor.size,
                data,
            )?;
        }
        self.tracker.lock().set_state(
            texture.id(),
            AccessState::resting(TextureLayout::ShaderReadOnly),
        );
        Ok(texture)
    }

    /// Wrap an image owned by integration code, such as a swap-chain image.
    ///
    /// `layout` is the layout the image is currently in. The image and view
    /// are never destroyed by this crate.
    pub fn wrap_external_texture(
        &self,
        descriptor: &TextureDescriptor,
        image: vk::Image,
        view: vk::ImageView,
        layout: TextureLayout,
    ) -> Result<Arc<Texture>, GraphicsError> {
        let format = get_vk_format(descriptor.format)?;
        let texture = Arc::new(Texture::new(
            descriptor.clone(),
            format,
            GpuTexture::External { image, view },
            Arc::clone(&self.retired),
        ));
        self.tracker
            .lock()
            .set_state(texture.id(), AccessState::resting(layout));
        Ok(texture)
    }

    /// Create a shader program from SPIR-V stages and reflection data.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage combination is neither a compute
    /// program nor a vertex (+ fragment) program.
    pub fn create_shader(&self, descriptor: &ShaderDescriptor) -> Result<Arc<Shader>, GraphicsError> {
        let has = |stage| descriptor.stages.iter().any(|s| s.stage == stage);
        let valid = if descriptor.is_compute() {
            descriptor.stages.len() == 1
        } else {
            has(ShaderStage::Vertex)
        };
        if !valid {
            return Err(GraphicsError::InvalidParameter(format!(
                "shader {:?} must have one compute stage or a vertex stage",
                descriptor.label
            )));
        }

        let gpu = self.backend.create_shader(descriptor)?;
        Ok(Arc::new(Shader::new(
            descriptor,
            gpu,
            Arc::clone(&self.retired),
        )))
    }

    /// Create a GPU timer for [`GraphicsContext::set_gpu_timer`].
    pub fn create_gpu_timer(&self) -> Result<Arc<GpuTimer>, GraphicsError> {
        let pool = self.backend.create_query_pool(GpuTimer::QUERY_COUNT)?;
        Ok(Arc::new(GpuTimer::new(pool)))
    }

    /// GPU time between the begin and end timestamps of the last replay
    /// that used `timer`. The frame containing it must have completed.
    pub fn read_gpu_timer(&self, timer: &GpuTimer) -> Result<Duration, GraphicsError> {
        let ticks = self
            .backend
            .read_timestamps(timer.pool(), GpuTimer::BEGIN_QUERY, GpuTimer::QUERY_COUNT)?;
        let [begin, end] = ticks[..] else {
            return Err(GraphicsError::Internal(format!(
                "expected {} timestamps, got {}",
                GpuTimer::QUERY_COUNT,
                ticks.len()
            )));
        };
        let nanos = end.saturating_sub(begin) as f64 * f64::from(self.backend.timestamp_period());
        Ok(Duration::from_nanos(nanos as u64))
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    /// Start recording a frame.
    ///
    /// Waits until the GPU has finished the frame that last used this frame
    /// slot, then releases state and cached objects of dropped resources.
    pub fn begin_frame(&self) -> Result<(), GraphicsError> {
        ember_core::profile_scope!("begin_frame");
        assert!(!self.is_frame_active(), "begin_frame called twice");

        let slot = self.frame_index() % self.frames_in_flight;
        self.backend.begin_frame(slot)?;
        self.collect_retired();
        self.frame_active.store(true, Ordering::Release);
        Ok(())
    }

    /// Submit the frame and advance the frame index.
    pub fn end_frame(&self) -> Result<(), GraphicsError> {
        assert!(self.is_frame_active(), "end_frame called without begin_frame");
        self.frame_active.store(false, Ordering::Release);
        self.backend.end_frame()?;
        self.frame_index.fetch_add(1, Ordering::AcqRel);
        ember_core::frame_mark!();
        Ok(())
    }

    /// Block until the GPU is idle.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.backend.wait_idle()
    }

    /// Forget tracker state of dropped resources and evict cache entries
    /// that reference them.
    fn collect_retired(&self) {
        let ids = self.retired.drain();
        if ids.is_empty() {
            return;
        }

        let mut tracker = self.tracker.lock();
        for id in &ids {
            tracker.forget(*id);
        }
        drop(tracker);

        let dead = |id| ids.contains(&id);

        for set in self
            .descriptor_sets
            .evict(|key| !ids.iter().any(|id| key.references(*id)))
        {
            self.backend.free_descriptor_set(set);
        }
        for framebuffer in self
            .framebuffers
            .evict(|key| !ids.iter().any(|id| key.references(*id)))
        {
            self.backend.destroy_framebuffer(framebuffer);
        }
        let dead_passes = self
            .render_passes
            .evict(|key| !ids.iter().any(|id| key.references(*id)));
        for framebuffer in self
            .framebuffers
            .evict(|key| !dead_passes.contains(&key.render_pass))
        {
            self.backend.destroy_framebuffer(framebuffer);
        }
        for pipeline in self
            .graphics_pipelines
            .evict(|key| !dead(key.shader) && !dead_passes.contains(&key.render_pass))
        {
            self.backend.destroy_pipeline(pipeline);
        }
        for pipeline in self.compute_pipelines.evict(|key| !dead(key.shader)) {
            self.backend.destroy_pipeline(pipeline);
        }
        for render_pass in dead_passes {
            self.backend.destroy_render_pass(render_pass);
        }

        log::debug!("Released {} dropped resources", ids.len());
    }

    // ------------------------------------------------------------------
    // Caches
    // ------------------------------------------------------------------

    pub fn get_or_create_render_pass(
        &self,
        key: &RenderPassKey,
    ) -> Result<vk::RenderPass, GraphicsError> {
        self.render_passes
            .get_or_create(key, || self.backend.create_render_pass(key))
    }

    pub fn get_or_create_framebuffer(
        &self,
        key: &FramebufferKey,
    ) -> Result<vk::Framebuffer, GraphicsError> {
        self.framebuffers
            .get_or_create(key, || self.backend.create_framebuffer(key))
    }

    pub fn get_or_create_graphics_pipeline(
        &self,
        shader: &Shader,
        key: &GraphicsPipelineKey,
    ) -> Result<vk::Pipeline, GraphicsError> {
        debug_assert_eq!(shader.id(), key.shader);
        self.graphics_pipelines
            .get_or_create(key, || self.backend.create_graphics_pipeline(shader, key))
    }

    pub fn get_or_create_compute_pipeline(
        &self,
        shader: &Shader,
    ) -> Result<vk::Pipeline, GraphicsError> {
        let key = ComputePipelineKey {
            shader: shader.id(),
        };
        self.compute_pipelines
            .get_or_create(&key, || self.backend.create_compute_pipeline(shader))
    }

    /// Return a descriptor set populated with the resources in `key`.
    ///
    /// Descriptor writes happen only when the set is first allocated.
    pub fn get_or_create_descriptor_set(
        &self,
        key: &DescriptorSetKey,
    ) -> Result<vk::DescriptorSet, GraphicsError> {
        self.descriptor_sets.get_or_create(key, || {
            let set = self.backend.allocate_descriptor_set(key.layout)?;
            let writes: Vec<DescriptorWrite> = key
                .entries
                .iter()
                .map(|(binding, kind, resource)| DescriptorWrite {
                    set,
                    binding: *binding,
                    kind: *kind,
                    resource: match *resource {
                        DescriptorKey::Buffer { buffer, range, .. } => DescriptorResource::Buffer {
                            buffer,
                            offset: 0,
                            range,
                        },
                        DescriptorKey::Image {
                            view,
                            sampler,
                            layout,
                            ..
                        } => DescriptorResource::Image {
                            view,
                            sampler,
                            layout: layout.to_vk(),
                        },
                    },
                })
                .collect();
            self.backend.write_descriptor_set(&writes);
            Ok(set)
        })
    }

    pub fn erase_render_pass(&self, key: &RenderPassKey) -> Result<(), GraphicsError> {
        let render_pass = self.render_passes.erase(key)?;
        self.backend.destroy_render_pass(render_pass);
        Ok(())
    }

    pub fn erase_framebuffer(&self, key: &FramebufferKey) -> Result<(), GraphicsError> {
        let framebuffer = self.framebuffers.erase(key)?;
        self.backend.destroy_framebuffer(framebuffer);
        Ok(())
    }

    pub fn erase_graphics_pipeline(&self, key: &GraphicsPipelineKey) -> Result<(), GraphicsError> {
        let pipeline = self.graphics_pipelines.erase(key)?;
        self.backend.destroy_pipeline(pipeline);
        Ok(())
    }

    pub fn erase_compute_pipeline(&self, shader: &Shader) -> Result<(), GraphicsError> {
        let pipeline = self.compute_pipelines.erase(&ComputePipelineKey {
            shader: shader.id(),
        })?;
        self.backend.destroy_pipeline(pipeline);
        Ok(())
    }

    pub fn erase_descriptor_set(&self, key: &DescriptorSetKey) -> Result<(), GraphicsError> {
        let set = self.descriptor_sets.erase(key)?;
        self.backend.free_descriptor_set(set);
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            render_passes: self.render_passes.len(),
            framebuffers: self.framebuffers.len(),
            graphics_pipelines: self.graphics_pipelines.len(),
            compute_pipelines: self.compute_pipelines.len(),
            descriptor_sets: self.descriptor_sets.len(),
        }
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }
        for set in self.descriptor_sets.drain() {
            self.backend.free_descriptor_set(set);
        }
        for framebuffer in self.framebuffers.drain() {
            self.backend.destroy_framebuffer(framebuffer);
        }
        for pipeline in self
            .graphics_pipelines
            .drain()
            .into_iter()
            .chain(self.compute_pipelines.drain())
        {
            self.backend.destroy_pipeline(pipeline);
        }
        for render_pass in self.render_passes.drain() {
            self.backend.destroy_render_pass(render_pass);
        }
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.name())
            .field("frames_in_flight", &self.frames_in_flight)
            .field("frame_index", &self.frame_index())
            .field("caches", &self.cache_stats())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    fn device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::with_backend(backend.clone(), DeviceParameters::new())
            .expect("dummy device");
        (backend, device)
    }

    #[test]
    fn test_parameters_builder() {
        let params = DeviceParameters::new()
            .with_backend(BackendType::Dummy)
            .with_frames_in_flight(3)
            .with_validation(false)
            .with_descriptor_pool_size(64);
        assert_eq!(params.backend, BackendType::Dummy);
        assert_eq!(params.frames_in_flight, 3);
        assert!(!params.validation);
        assert_eq!(params.descriptor_pool_size, 64);
    }

    #[test]
    #[should_panic(expected = "frames in flight")]
    fn test_zero_frames_in_flight_panics() {
        let _ = DeviceParameters::new().with_frames_in_flight(0);
    }

    #[test]
    fn test_missing_resources_are_created() {
        let (backend, device) = device();
        assert_eq!(device.missing_texture().width(), 1);
        assert_eq!(backend.stats().texture_uploads, 1);
        assert_eq!(
            device.state_tracker().lock().state(device.missing_texture().id()).layout,
            TextureLayout::ShaderReadOnly
        );
    }

    #[test]
    fn test_multi_frame_buffer_gets_slot_per_frame() {
        let (_, device) = device();
        let single = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        let multi = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM).with_multi_frame())
            .unwrap();
        assert_eq!(single.slot_count(), 1);
        assert_eq!(multi.slot_count(), device.frames_in_flight());
    }

    #[test]
    fn test_zero_sized_buffer_rejected() {
        let (_, device) = device();
        let result = device.create_buffer(&BufferDescriptor::new(0, BufferUsage::VERTEX));
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_texture_data_size_checked() {
        let (_, device) = device();
        let desc = TextureDescriptor::new_2d(
            2,
            2,
            TextureFormat::RGBA8_UNORM,
            TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        );
        assert!(device.create_texture_with_data(&desc, &[0; 4]).is_err());
        assert!(device.create_texture_with_data(&desc, &[0; 16]).is_ok());
    }

    #[test]
    fn test_frame_index_advances() {
        let (backend, device) = device();
        assert_eq!(device.frame_index(), 0);
        device.begin_frame().unwrap();
        assert!(device.is_frame_active());
        device.end_frame().unwrap();
        assert_eq!(device.frame_index(), 1);
        assert_eq!(backend.stats().frames_submitted, 1);
    }

    #[test]
    fn test_dropped_texture_is_forgotten_at_frame_start() {
        let (_, device) = device();
        let texture = device
            .create_texture(&TextureDescriptor::new_2d(
                4,
                4,
                TextureFormat::RGBA8_UNORM,
                TextureUsage::RENDER_ATTACHMENT,
            ))
            .unwrap();
        let id = texture.id();
        device
            .state_tracker()
            .lock()
            .set_state(id, AccessState::resting(TextureLayout::ColorAttachment));
        drop(texture);

        device.begin_frame().unwrap();
        assert_eq!(device.state_tracker().lock().state(id), AccessState::INITIAL);
        device.end_frame().unwrap();
    }

    #[test]
    fn test_gpu_timer_reads_elapsed_time() {
        let (_, device) = device();
        let timer = device.create_gpu_timer().unwrap();
        let elapsed = device.read_gpu_timer(&timer).unwrap();
        assert_eq!(elapsed, Duration::from_nanos(1000));
    }
}
