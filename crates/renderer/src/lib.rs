//! Offscreen fragment-shader renderer.
//!
//! ```text
//!   shader source ──▶ compile (environment wrapper) ──▶ wgpu pipeline
//!                                                          │
//!   RenderState ──▶ built-in uniforms ──▶ PreRender hooks ─┴─▶ draw ──▶ RgbaImage
//! ```
//!
//! [`ShaderProgram`] is the narrow surface that input bindings (audio and
//! image channels) program against; [`HeadlessRenderer`] implements it with
//! wgpu and is the only owner of GPU state.

mod compile;
mod environment;
mod gpu;
mod program;

pub use environment::{Environment, UnknownEnvironment};
pub use gpu::{HeadlessRenderer, RendererConfig};
pub use program::{
    PreRender, RenderState, ShaderProgram, TexelFormat, TextureFilter, TextureSpec, TextureUnit,
    UniformLocation, UniformValue,
};

/// ShaderToy exposes four optional input channels (`iChannel0-3`).
pub const CHANNEL_COUNT: usize = 4;
