//! A [`ShaderProgram`] that records calls instead of touching a GPU.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use renderer::{ShaderProgram, TextureSpec, TextureUnit, UniformLocation, UniformValue};

#[derive(Default)]
pub(crate) struct RecordingProgram {
    declared: Vec<String>,
    pub uniforms: Vec<(String, UniformValue)>,
    pub textures: BTreeMap<TextureUnit, (TextureSpec, Vec<Vec<u8>>)>,
    pub samplers: Vec<(String, TextureUnit)>,
}

impl RecordingProgram {
    /// A program whose source references exactly `names`.
    pub fn declaring(names: &[&str]) -> Self {
        Self {
            declared: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    fn name_of(&self, location: UniformLocation) -> String {
        self.declared[location.index() as usize].clone()
    }

    pub fn last_uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn uploads(&self, unit: TextureUnit) -> &[Vec<u8>] {
        self.textures
            .get(&unit)
            .map(|(_, uploads)| uploads.as_slice())
            .unwrap_or(&[])
    }
}

impl ShaderProgram for RecordingProgram {
    fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.declared
            .iter()
            .position(|declared| declared == name)
            .map(|index| UniformLocation::new(index as u32))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let name = self.name_of(location);
        self.uniforms.push((name, value));
    }

    fn create_texture(&mut self, unit: TextureUnit, spec: TextureSpec) -> Result<()> {
        self.textures.insert(unit, (spec, Vec::new()));
        Ok(())
    }

    fn update_texture(&mut self, unit: TextureUnit, data: &[u8]) -> Result<()> {
        let (spec, uploads) = self
            .textures
            .get_mut(&unit)
            .ok_or_else(|| anyhow!("texture unit {} has no texture", unit.index()))?;
        if data.len() != spec.byte_len() {
            return Err(anyhow!(
                "expected {} bytes, got {}",
                spec.byte_len(),
                data.len()
            ));
        }
        uploads.push(data.to_vec());
        Ok(())
    }

    fn bind_sampler(&mut self, location: UniformLocation, unit: TextureUnit) {
        let name = self.name_of(location);
        self.samplers.push((name, unit));
    }
}
