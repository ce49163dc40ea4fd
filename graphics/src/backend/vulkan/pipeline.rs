//! Shader modules, layouts, render passes, framebuffers and pipelines.
//!
//! Everything here is created on a device cache miss; the caches own the
//! handles and hand them back through `destroy_*` when they are evicted.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::backend::conversion::{
    convert_binding_kind, convert_blend_state, convert_compare_function, convert_cull_mode,
    convert_fill_mode, convert_front_face, convert_primitive_type, convert_shader_stages,
    convert_stencil_state, convert_vertex_format, decompose_vk_format,
};
use crate::backend::{GpuShader, GpuShaderModule};
use crate::cache::{AttachmentKey, FramebufferKey, GraphicsPipelineKey, RenderPassKey};
use crate::error::GraphicsError;
use crate::resources::{Shader, ShaderDescriptor, ShaderStage};

use super::deferred::{DeferredDestructor, DeferredResource};

/// The descriptor pool every cached descriptor set is allocated from.
///
/// Sets are freed one by one when their cache entry is evicted, so the pool is
/// created with `FREE_DESCRIPTOR_SET` and never reset.
pub struct DescriptorPool {
    device: ash::Device,
    pool: Mutex<vk::DescriptorPool>,
}

impl DescriptorPool {
    /// A pool for `size` sets. Storage descriptors get a tenth of the
    /// sampled and uniform capacity.
    pub fn new(device: ash::Device, size: u32) -> Result<Self, GraphicsError> {
        let size = size.max(1);
        let storage = (size / 10).max(1);
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: size,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: size,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: storage,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: storage,
            },
        ];

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(size)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "Failed to create descriptor pool: {:?}",
                e
            ))
        })?;

        Ok(Self {
            device,
            pool: Mutex::new(pool),
        })
    }

    pub fn raw(&self) -> vk::DescriptorPool {
        *self.pool.lock()
    }

    pub fn allocate(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, GraphicsError> {
        let layouts = [layout];
        let pool = self.pool.lock();
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(*pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(|e| {
            match e {
                vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                    GraphicsError::ResourceCreationFailed(
                        "Descriptor pool exhausted; raise DeviceParameters::descriptor_pool_size"
                            .to_string(),
                    )
                }
                other => GraphicsError::ResourceCreationFailed(format!(
                    "Failed to allocate descriptor set: {:?}",
                    other
                )),
            }
        })?;

        sets.into_iter().next().ok_or_else(|| {
            GraphicsError::Internal("Descriptor set allocation returned nothing".to_string())
        })
    }

    /// # Safety
    ///
    /// The device must be idle and no set from this pool may be used again.
    pub unsafe fn destroy(&self) {
        let mut pool = self.pool.lock();
        unsafe { self.device.destroy_descriptor_pool(*pool, None) };
        *pool = vk::DescriptorPool::null();
    }
}

/// Create the shader modules, one descriptor set layout per set index used by
/// the reflection, and the pipeline layout over them.
pub fn create_shader(
    device: &ash::Device,
    descriptor: &ShaderDescriptor,
    deferred: &Arc<DeferredDestructor>,
) -> Result<GpuShader, GraphicsError> {
    let mut modules: Vec<GpuShaderModule> = Vec::with_capacity(descriptor.stages.len());
    let mut set_layouts = Vec::new();

    let result = (|| {
        for stage in &descriptor.stages {
            let entry_point = CString::new(stage.entry_point.as_str()).map_err(|e| {
                GraphicsError::InvalidParameter(format!(
                    "Invalid entry point name (contains null byte): {}",
                    e
                ))
            })?;
            let create_info = vk::ShaderModuleCreateInfo::default().code(&stage.spirv);
            let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create {:?} shader module: {:?}",
                    stage.stage, e
                ))
            })?;
            modules.push(GpuShaderModule {
                stage: stage.stage,
                module,
                entry_point,
            });
        }

        let resources = descriptor.reflection.resources();
        for set in 0..descriptor.reflection.set_count() {
            let bindings: Vec<_> = resources
                .iter()
                .filter(|r| r.set == set)
                .map(|r| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(r.binding)
                        .descriptor_type(convert_binding_kind(r.kind))
                        .descriptor_count(1)
                        .stage_flags(convert_shader_stages(r.stages))
                })
                .collect();
            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            let layout = unsafe { device.create_descriptor_set_layout(&create_info, None) }
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "Failed to create descriptor set layout: {:?}",
                        e
                    ))
                })?;
            set_layouts.push(layout);
        }

        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        unsafe { device.create_pipeline_layout(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "Failed to create pipeline layout: {:?}",
                e
            ))
        })
    })();

    match result {
        Ok(pipeline_layout) => Ok(GpuShader::Vulkan {
            device: device.clone(),
            pipeline_layout,
            set_layouts,
            modules,
            deferred: Arc::clone(deferred),
        }),
        Err(e) => {
            // Nothing has been handed out yet.
            unsafe {
                DeferredResource::Shader {
                    device: device.clone(),
                    pipeline_layout: vk::PipelineLayout::null(),
                    set_layouts,
                    modules: modules.into_iter().map(|m| m.module).collect(),
                }
                .destroy(None)
            };
            Err(e)
        }
    }
}

fn attachment_description(key: &AttachmentKey) -> vk::AttachmentDescription {
    let has_stencil = decompose_vk_format(key.format).is_ok_and(|f| f.has_stencil());
    let layout = key.layout.to_vk();
    vk::AttachmentDescription::default()
        .format(key.format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(key.load_op)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(if has_stencil {
            key.stencil_load_op
        } else {
            vk::AttachmentLoadOp::DONT_CARE
        })
        .stencil_store_op(if has_stencil {
            vk::AttachmentStoreOp::STORE
        } else {
            vk::AttachmentStoreOp::DONT_CARE
        })
        // Replay moves attachments into their pass layout beforehand.
        .initial_layout(layout)
        .final_layout(layout)
}

pub fn create_render_pass(
    device: &ash::Device,
    key: &RenderPassKey,
) -> Result<vk::RenderPass, GraphicsError> {
    let attachments: Vec<_> = key
        .colors
        .iter()
        .chain(key.depth_stencil.iter())
        .map(attachment_description)
        .collect();

    let color_refs: Vec<_> = key
        .colors
        .iter()
        .enumerate()
        .map(|(i, a)| vk::AttachmentReference {
            attachment: i as u32,
            layout: a.layout.to_vk(),
        })
        .collect();
    let depth_ref = key.depth_stencil.map(|a| vk::AttachmentReference {
        attachment: key.colors.len() as u32,
        layout: a.layout.to_vk(),
    });

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(depth_ref) = depth_ref.as_ref() {
        subpass = subpass.depth_stencil_attachment(depth_ref);
    }
    let subpasses = [subpass];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses);

    unsafe { device.create_render_pass(&create_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create render pass: {:?}", e))
    })
}

pub fn create_framebuffer(
    device: &ash::Device,
    key: &FramebufferKey,
) -> Result<vk::Framebuffer, GraphicsError> {
    let views: Vec<_> = key.attachments.iter().map(|(_, view)| *view).collect();
    let create_info = vk::FramebufferCreateInfo::default()
        .render_pass(key.render_pass)
        .attachments(&views)
        .width(key.width)
        .height(key.height)
        .layers(1);

    unsafe { device.create_framebuffer(&create_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create framebuffer: {:?}", e))
    })
}

fn stage_info(module: &GpuShaderModule) -> vk::PipelineShaderStageCreateInfo<'_> {
    let stage = match module.stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    };
    vk::PipelineShaderStageCreateInfo::default()
        .stage(stage)
        .module(module.module)
        .name(&module.entry_point)
}

/// Build a graphics pipeline for `shader` with the fixed-function state in
/// `key`. Viewport, scissor and stencil reference are dynamic.
pub fn create_graphics_pipeline(
    device: &ash::Device,
    shader: &Shader,
    key: &GraphicsPipelineKey,
) -> Result<vk::Pipeline, GraphicsError> {
    let gpu = shader.gpu();
    let reflection = shader.reflection();
    let state = &key.state;

    let stages: Vec<_> = gpu.modules().iter().map(stage_info).collect();

    let bindings: Vec<_> = reflection
        .vertex_buffers()
        .iter()
        .enumerate()
        .map(|(i, layout)| {
            vk::VertexInputBindingDescription::default()
                .binding(i as u32)
                .stride(layout.stride)
                .input_rate(if layout.per_instance {
                    vk::VertexInputRate::INSTANCE
                } else {
                    vk::VertexInputRate::VERTEX
                })
        })
        .collect();
    let attributes: Vec<_> = reflection
        .vertex_attributes()
        .iter()
        .map(|attr| {
            vk::VertexInputAttributeDescription::default()
                .location(attr.location)
                .binding(attr.buffer)
                .format(convert_vertex_format(attr.format))
                .offset(attr.offset)
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(convert_primitive_type(state.primitive))
        .primitive_restart_enable(false);

    let viewport = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(convert_fill_mode(state.fill_mode))
        .line_width(1.0)
        .cull_mode(convert_cull_mode(state.cull_mode))
        .front_face(convert_front_face(state.front_face))
        .depth_bias_enable(false);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let stencil = convert_stencil_state(&state.stencil);
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(state.depth.test_enabled)
        .depth_write_enable(state.depth.write_enabled)
        .depth_compare_op(convert_compare_function(state.depth.compare))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(state.stencil.enabled)
        .front(stencil)
        .back(stencil);

    let blend = convert_blend_state(&state.blend, state.color_writes)?;
    let blend_attachments = vec![blend; key.color_count as usize];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    let dynamic_states = [
        vk::DynamicState::VIEWPORT,
        vk::DynamicState::SCISSOR,
        vk::DynamicState::STENCIL_REFERENCE,
    ];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(gpu.pipeline_layout())
        .render_pass(key.render_pass)
        .subpass(0);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| {
        GraphicsError::ResourceCreationFailed(format!(
            "Failed to create graphics pipeline for {:?}: {:?}",
            shader.label(),
            e
        ))
    })?;

    pipelines.into_iter().next().ok_or_else(|| {
        GraphicsError::Internal("Graphics pipeline creation returned nothing".to_string())
    })
}

pub fn create_compute_pipeline(
    device: &ash::Device,
    shader: &Shader,
) -> Result<vk::Pipeline, GraphicsError> {
    let gpu = shader.gpu();
    let Some(module) = gpu
        .modules()
        .iter()
        .find(|m| m.stage == ShaderStage::Compute)
    else {
        return Err(GraphicsError::InvalidParameter(format!(
            "Shader {:?} has no compute stage",
            shader.label()
        )));
    };

    let pipeline_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage_info(module))
        .layout(gpu.pipeline_layout());

    let pipelines = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| {
        GraphicsError::ResourceCreationFailed(format!(
            "Failed to create compute pipeline for {:?}: {:?}",
            shader.label(),
            e
        ))
    })?;

    pipelines.into_iter().next().ok_or_else(|| {
        GraphicsError::Internal("Compute pipeline creation returned nothing".to_string())
    })
}
