use std::time::Duration;

use anyhow::Result;

/// Opaque handle to a uniform the compiled shader actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(u32);

impl UniformLocation {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// Texture unit index handed out by a per-session allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureUnit(u32);

impl TextureUnit {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

/// Texel layout of a host-supplied texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexelFormat {
    /// One byte per texel, sampled as `(v, 0, 0, 1)`.
    Luminance8,
    Rgba8,
}

impl TexelFormat {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TexelFormat::Luminance8 => 1,
            TexelFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSpec {
    pub width: u32,
    pub height: u32,
    pub format: TexelFormat,
    pub filter: TextureFilter,
}

impl TextureSpec {
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_texel() as usize
    }
}

/// The slice of a compiled shader program that input bindings may touch.
///
/// Lookups return `None` when the shader never references the name, which is
/// how optional bindings detect that they have nothing to do.
pub trait ShaderProgram {
    fn uniform_location(&self, name: &str) -> Option<UniformLocation>;

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Allocates storage for `unit`, replacing any texture previously held there.
    fn create_texture(&mut self, unit: TextureUnit, spec: TextureSpec) -> Result<()>;

    /// Overwrites the full contents of the texture on `unit`.
    fn update_texture(&mut self, unit: TextureUnit, data: &[u8]) -> Result<()>;

    /// Points the sampler uniform at `location` to the texture on `unit`.
    fn bind_sampler(&mut self, location: UniformLocation, unit: TextureUnit);
}

/// Per-frame values handed to pre-render hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    /// Virtual timestamp of the frame.
    pub time: Duration,
    /// Virtual time covered by one frame; zero for still images.
    pub interval: Duration,
    pub frame: u64,
}

/// Work that must run on the render thread right before each draw call.
pub trait PreRender {
    fn pre_render(&mut self, program: &mut dyn ShaderProgram, state: &RenderState) -> Result<()>;
}

impl<T: PreRender + ?Sized> PreRender for Box<T> {
    fn pre_render(&mut self, program: &mut dyn ShaderProgram, state: &RenderState) -> Result<()> {
        (**self).pre_render(program, state)
    }
}
