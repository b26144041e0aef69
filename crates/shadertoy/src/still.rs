use std::path::Path;

use anyhow::{bail, Context, Result};
use image::imageops::flip_vertical_in_place;
use image::RgbaImage;
use renderer::{
    PreRender, RenderState, ShaderProgram, TexelFormat, TextureFilter, TextureSpec, TextureUnit,
    UniformLocation, UniformValue,
};
use tracing::{debug, warn};

/// A still image uploaded once into its own texture unit.
pub struct ImageTexture {
    unit: TextureUnit,
    size: (u32, u32),
    sampler: Option<UniformLocation>,
    channel_time: Option<UniformLocation>,
    channel_resolution: Option<UniformLocation>,
}

impl ImageTexture {
    /// Loads `path` and binds it to the sampler uniform `name`.
    ///
    /// An unreadable image is replaced by a 1x1 white placeholder.
    pub fn new(
        name: &str,
        path: &Path,
        unit: TextureUnit,
        program: &mut dyn ShaderProgram,
    ) -> Result<Self> {
        let sampler = program.uniform_location(name);
        let mut size = (1, 1);
        if sampler.is_some() {
            let pixels = match load(path) {
                Ok(pixels) => pixels,
                Err(err) => {
                    warn!(
                        uniform = name,
                        path = %path.display(),
                        error = %err,
                        "failed to load texture; using placeholder"
                    );
                    RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]))
                }
            };
            size = pixels.dimensions();
            let spec = TextureSpec {
                width: size.0,
                height: size.1,
                format: TexelFormat::Rgba8,
                filter: TextureFilter::Linear,
            };
            program
                .create_texture(unit, spec)
                .and_then(|()| program.update_texture(unit, pixels.as_raw()))
                .with_context(|| format!("failed to upload texture for {name}"))?;
            debug!(
                uniform = name,
                path = %path.display(),
                width = size.0,
                height = size.1,
                unit = unit.index(),
                "uploaded image texture"
            );
        } else {
            debug!(uniform = name, "shader does not reference image input; not loading");
        }

        let channel = crate::mapping::channel_index(name);
        let indexed = |base: &str| {
            channel.and_then(|n| program.uniform_location(&format!("{base}[{n}]")))
        };
        let channel_time = indexed("iChannelTime");
        let channel_resolution = indexed("iChannelResolution");

        Ok(Self {
            unit,
            size,
            sampler,
            channel_time,
            channel_resolution,
        })
    }
}

impl PreRender for ImageTexture {
    fn pre_render(&mut self, program: &mut dyn ShaderProgram, state: &RenderState) -> Result<()> {
        if let Some(location) = self.sampler {
            program.bind_sampler(location, self.unit);
        }
        if let Some(location) = self.channel_resolution {
            let (w, h) = self.size;
            program.set_uniform(location, UniformValue::Vec3([w as f32, h as f32, 1.0]));
        }
        if let Some(location) = self.channel_time {
            program.set_uniform(location, UniformValue::Float(state.time.as_secs_f32()));
        }
        Ok(())
    }
}

/// Decodes an image into GL row order (bottom row first).
fn load(path: &Path) -> Result<RgbaImage> {
    let decoded = image::open(path)
        .with_context(|| format!("failed to open texture at {}", path.display()))?;
    let mut rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        bail!(
            "texture at {} has zero extent ({}x{})",
            path.display(),
            width,
            height
        );
    }
    flip_vertical_in_place(&mut rgba);
    Ok(rgba)
}
