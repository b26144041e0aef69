use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use tracing::{debug, trace};

use crate::environment::Environment;
use crate::program::{PreRender, RenderState, ShaderProgram};

use super::context::GpuContext;
use super::pipeline::{create_pipeline, PipelineLayouts};
use super::program::WgpuProgram;
use super::uniforms::UniformBlock;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const BYTES_PER_PIXEL: u32 = 4;

/// Everything needed to compile a shader for offscreen rendering.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub environment: Environment,
    pub source: String,
}

/// Renders a fragment shader into an offscreen texture and reads the pixels back.
///
/// Owns the GPU device, so it must stay on the thread that created it.
pub struct HeadlessRenderer {
    context: GpuContext,
    layouts: PipelineLayouts,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    program: WgpuProgram,
    target_view: wgpu::TextureView,
    target: wgpu::Texture,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
    width: u32,
    height: u32,
    environment: Environment,
    hooks: Vec<Box<dyn PreRender>>,
}

impl HeadlessRenderer {
    pub fn new(config: RendererConfig) -> Result<Self> {
        let RendererConfig {
            width,
            height,
            environment,
            source,
        } = config;
        if width == 0 || height == 0 {
            anyhow::bail!("image dimensions must be non-zero, got {width}x{height}");
        }

        let context = GpuContext::new(width, height)?;
        let device = &context.device;
        let layouts = PipelineLayouts::new(device);
        let pipeline = create_pipeline(device, &layouts, TARGET_FORMAT, &source, environment)?;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform buffer"),
            size: UniformBlock::size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_bytes_per_row =
            align_to(width * BYTES_PER_PIXEL, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let program = WgpuProgram::new(
            device,
            &context.queue,
            &layouts.channel_layout,
            environment,
            source,
            width,
            height,
        );

        debug!(width, height, %environment, "headless renderer ready");

        Ok(Self {
            context,
            layouts,
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            program,
            target_view,
            target,
            readback,
            padded_bytes_per_row,
            width,
            height,
            environment,
            hooks: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Access for bindings that need to look up uniforms or create textures
    /// before the first frame.
    pub fn program_mut(&mut self) -> &mut dyn ShaderProgram {
        &mut self.program
    }

    /// Registers a hook that runs before every draw, in registration order.
    pub fn add_pre_render(&mut self, hook: impl PreRender + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn render(&mut self, state: &RenderState) -> Result<RgbaImage> {
        self.program.uniforms.begin_frame(state);
        for hook in &mut self.hooks {
            hook.pre_render(&mut self.program, state)
                .context("pre-render hook failed")?;
        }

        let queue = &self.context.queue;
        queue.write_buffer(&self.uniform_buffer, 0, self.program.uniforms.bytes());
        let channel_bind_group = self.program.channel_bind_group(&self.layouts.channel_layout);

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, channel_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let image = self.read_back()?;
        trace!(frame = state.frame, "frame read back");
        Ok(image)
    }

    fn read_back(&self) -> Result<RgbaImage> {
        let slice = self.readback.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.context
            .device
            .poll(wgpu::PollType::Wait)
            .context("failed to wait for the GPU")?;
        rx.recv()
            .map_err(|_| anyhow!("readback channel closed"))?
            .context("failed to map readback buffer")?;

        let row_bytes = (self.width * BYTES_PER_PIXEL) as usize;
        let padded_row_bytes = self.padded_bytes_per_row as usize;
        let mut pixels = Vec::with_capacity(row_bytes * self.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_row_bytes).take(self.height as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        self.readback.unmap();

        RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| anyhow!("readback produced a truncated image"))
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(100 * 4, 256), 512);
    }
}
