use std::error::Error as StdError;

use anyhow::Result;
use renderer::{PreRender, RenderState, ShaderProgram};
use tracing::info;

use crate::allocator::TextureUnitAllocator;
use crate::audio::{self, AudioError, AudioSource, AudioTexture};
use crate::mapping::{AudioMapping, Mapping, MappingKind};
use crate::still::ImageTexture;

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("no texture unit left for {name}; at most {limit} texture inputs are supported")]
    UnitsExhausted { name: String, limit: usize },
    #[error("could not open audio input for {name}")]
    Audio {
        name: String,
        #[source]
        source: AudioError,
    },
    #[error("could not set up texture input for {name}")]
    Texture {
        name: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Every mapped input of one shader, run as a single pre-render hook.
#[derive(Default)]
pub struct ShadertoyInputs {
    hooks: Vec<Box<dyn PreRender>>,
    names: Vec<String>,
}

impl ShadertoyInputs {
    pub fn build(
        mappings: &[Mapping],
        program: &mut dyn ShaderProgram,
    ) -> Result<Self, BindingError> {
        Self::build_with(mappings, program, audio::open_source)
    }

    /// Like [`ShadertoyInputs::build`] with a custom way of opening audio.
    pub fn build_with<F>(
        mappings: &[Mapping],
        program: &mut dyn ShaderProgram,
        mut open_audio: F,
    ) -> Result<Self, BindingError>
    where
        F: FnMut(&AudioMapping) -> Result<Box<dyn AudioSource>, AudioError>,
    {
        let mut allocator = TextureUnitAllocator::default();
        let mut inputs = Self::default();

        for mapping in mappings {
            let name = mapping.name.as_str();
            let unit = allocator
                .allocate()
                .ok_or_else(|| BindingError::UnitsExhausted {
                    name: name.to_string(),
                    limit: allocator.limit(),
                })?;
            let texture_error = |err: anyhow::Error| BindingError::Texture {
                name: name.to_string(),
                source: err.into(),
            };

            let hook: Box<dyn PreRender> = match &mapping.kind {
                MappingKind::Audio(audio) => {
                    let source = open_audio(audio).map_err(|source| BindingError::Audio {
                        name: name.to_string(),
                        source,
                    })?;
                    info!(
                        uniform = name,
                        path = %audio.path().display(),
                        unit = unit.index(),
                        rate = source.sample_rate(),
                        "bound audio input"
                    );
                    Box::new(AudioTexture::new(name, unit, source, program).map_err(texture_error)?)
                }
                MappingKind::Image(path) => {
                    info!(
                        uniform = name,
                        path = %path.display(),
                        unit = unit.index(),
                        "bound image input"
                    );
                    Box::new(ImageTexture::new(name, path, unit, program).map_err(texture_error)?)
                }
            };
            inputs.hooks.push(hook);
            inputs.names.push(name.to_string());
        }

        Ok(inputs)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl PreRender for ShadertoyInputs {
    fn pre_render(&mut self, program: &mut dyn ShaderProgram, state: &RenderState) -> Result<()> {
        for hook in &mut self.hooks {
            hook.pre_render(program, state)?;
        }
        Ok(())
    }
}
