use anyhow::{anyhow, Context, Result};

use crate::compile::{compile_fragment_shader, compile_vertex_shader};
use crate::environment::Environment;
use crate::CHANNEL_COUNT;

use super::channels::ChannelResources;

pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub channel_layout: wgpu::BindGroupLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let channel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("channel layout"),
            entries: &build_channel_layout_entries(),
        });

        Self {
            uniform_layout,
            channel_layout,
        }
    }
}

/// Compiles the wrapped fragment shader into a pipeline drawing into `target_format`.
pub(crate) fn create_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    target_format: wgpu::TextureFormat,
    source: &str,
    environment: Environment,
) -> Result<wgpu::RenderPipeline> {
    let vertex_module = compile_vertex_shader(device)?;
    let fragment_module = compile_fragment_shader(device, source, environment)
        .context("failed to compile shader")?;

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("shader pipeline layout"),
        bind_group_layouts: &[&layouts.uniform_layout, &layouts.channel_layout],
        push_constant_ranges: &[],
    });

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("shader pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_module,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(anyhow!("failed to link shader pipeline: {error}"));
    }
    Ok(pipeline)
}

pub(crate) fn build_channel_entries<'a>(
    resources: &[&'a ChannelResources; CHANNEL_COUNT],
) -> Vec<wgpu::BindGroupEntry<'a>> {
    let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
    for (index, resource) in resources.iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: (index as u32) * 2,
            resource: wgpu::BindingResource::TextureView(&resource.view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: (index as u32) * 2 + 1,
            resource: wgpu::BindingResource::Sampler(&resource.sampler),
        });
    }
    entries
}

fn build_channel_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
    for index in 0..CHANNEL_COUNT as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}
