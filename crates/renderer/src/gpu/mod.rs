//! Headless wgpu backend.
//!
//! - `context` requests an adapter and device without a surface.
//! - `channels` owns the textures behind each texture unit.
//! - `pipeline` compiles wrapped GLSL into a render pipeline with one
//!   uniform group and one channel group.
//! - `uniforms` mirrors the injected uniform blocks of each environment.
//! - `program` implements [`ShaderProgram`](crate::ShaderProgram) on top of
//!   the above.
//! - `state` draws into an offscreen texture and reads it back.

mod channels;
mod context;
mod pipeline;
mod program;
mod state;
mod uniforms;

pub use state::{HeadlessRenderer, RendererConfig};
