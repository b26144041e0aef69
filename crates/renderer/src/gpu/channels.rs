use anyhow::{bail, Result};
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::program::{TexelFormat, TextureFilter, TextureSpec, TextureUnit};

/// GPU storage behind one texture unit.
pub(crate) struct ChannelResources {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub spec: TextureSpec,
}

impl ChannelResources {
    pub(crate) fn write(&self, queue: &wgpu::Queue, data: &[u8]) -> Result<()> {
        let expected_len = self.spec.byte_len();
        if data.len() != expected_len {
            bail!(
                "texture update of {} bytes does not match {}x{} {:?} ({} bytes)",
                data.len(),
                self.spec.width,
                self.spec.height,
                self.spec.format,
                expected_len
            );
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.spec.width * self.spec.format.bytes_per_texel()),
                rows_per_image: Some(self.spec.height),
            },
            extent(&self.spec),
        );
        Ok(())
    }
}

fn extent(spec: &TextureSpec) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: spec.width,
        height: spec.height,
        depth_or_array_layers: 1,
    }
}

fn texture_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::Luminance8 => wgpu::TextureFormat::R8Unorm,
        TexelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn create_sampler(device: &wgpu::Device, filter: TextureFilter) -> wgpu::Sampler {
    let mode = match filter {
        TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear => wgpu::FilterMode::Linear,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: mode,
        min_filter: mode,
        mipmap_filter: mode,
        ..Default::default()
    })
}

/// Creates zero-initialised storage for a texture unit.
pub(crate) fn create_unit_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    unit: TextureUnit,
    spec: TextureSpec,
) -> Result<ChannelResources> {
    if spec.width == 0 || spec.height == 0 {
        bail!(
            "texture unit {} cannot be {}x{}",
            unit.index(),
            spec.width,
            spec.height
        );
    }
    let data = vec![0u8; spec.byte_len()];
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("texture unit #{}", unit.index())),
            size: extent(&spec),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(spec.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = create_sampler(device, spec.filter);

    Ok(ChannelResources {
        texture,
        view,
        sampler,
        spec,
    })
}

/// 1x1 texture bound to channels that have no texture unit attached.
pub(crate) fn create_placeholder_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> ChannelResources {
    let spec = TextureSpec {
        width: 1,
        height: 1,
        format: TexelFormat::Rgba8,
        filter: TextureFilter::Linear,
    };
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("placeholder channel texture"),
            size: extent(&spec),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(spec.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &[0u8, 0, 0, 255],
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = create_sampler(device, spec.filter);

    ChannelResources {
        texture,
        view,
        sampler,
        spec,
    }
}
