//! Shader inputs for the ShaderToy environment.
//!
//! Inputs are declared as [`Mapping`]s (`iChannel0=audio:song.mp3`), turned
//! into texture-backed pre-render hooks by [`ShadertoyInputs::build`] and then
//! refreshed once per frame, right before the draw call.

mod allocator;
pub mod audio;
mod inputs;
mod mapping;
mod still;
#[cfg(test)]
mod testing;

pub use allocator::TextureUnitAllocator;
pub use audio::{AudioError, AudioSource, AudioTexture, RawSource, TranscodedStream};
pub use inputs::{BindingError, ShadertoyInputs};
pub use mapping::{
    dedup_by_name, AudioMapping, Endian, Mapping, MappingError, MappingKind, SampleFormat,
};
pub use still::ImageTexture;
